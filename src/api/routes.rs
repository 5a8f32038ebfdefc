use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/blocks", web::get().to(handlers::get_blocks))
            .route("/blocks/sync", web::post().to(handlers::sync_blocks))
            .route("/validate", web::get().to(handlers::validate_chain))
            .route("/transact", web::post().to(handlers::transact))
            .route("/transaction-pool", web::get().to(handlers::get_transaction_pool))
            .route("/mine-transactions", web::post().to(handlers::mine_transactions))
            .route("/wallet-info", web::get().to(handlers::wallet_info))
            .route("/wallet/balance/{address}", web::get().to(handlers::get_wallet_balance))
    );
}
