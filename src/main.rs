use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use std::sync::Arc;

use pow_ledger::api;
use pow_ledger::blockchain::{self, Blockchain, TransactionMiner, TransactionPool, Wallet};
use pow_ledger::config::ServerConfig;

// Chain, pool and node wallet shared by every request handler
fn initialize_node() -> TransactionMiner {
    let blockchain = Arc::new(Blockchain::new());
    let pool = Arc::new(TransactionPool::new());
    let wallet = Arc::new(Wallet::new());

    info!("Node wallet address: {}", wallet.address());

    TransactionMiner::new(blockchain, pool, wallet)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_blocks,
        api::handlers::sync_blocks,
        api::handlers::validate_chain,
        api::handlers::transact,
        api::handlers::get_transaction_pool,
        api::handlers::mine_transactions,
        api::handlers::wallet_info,
        api::handlers::get_wallet_balance
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::TransactionInput,
            blockchain::Address,
            blockchain::DigitalSignature,
            api::handlers::SyncResponse,
            api::handlers::TransactRequest,
            api::handlers::PoolResponse,
            api::handlers::MineResponse,
            api::handlers::BalanceResponse
        )
    ),
    tags(
        (name = "ledger", description = "Proof-of-work ledger API endpoints")
    ),
    info(
        title = "Proof-of-work Ledger API",
        version = "0.1.0",
        description = "Mine blocks, send coins and query balances",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = ServerConfig::from_env();
    let node = web::Data::new(initialize_node());

    info!("Starting HTTP server at http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(node.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
