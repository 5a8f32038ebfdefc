use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{Address, Block, Blockchain, Transaction, TransactionMap, TransactionMiner, Wallet};

/// Shared node state: chain, pool and node wallet behind the miner
pub type NodeData = web::Data<TransactionMiner>;

/// Response for the chain sync endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SyncResponse {
    /// The message
    pub message: String,

    /// Length of the local chain after the sync
    pub length: usize,
}

/// Request for the transact endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactRequest {
    /// The recipient's address
    pub recipient: String,

    /// The amount to transfer
    pub amount: u64,
}

/// Response for the transaction pool endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct PoolResponse {
    /// Number of pending transactions
    pub length: usize,

    /// Pending transactions keyed by id
    #[schema(value_type = Object)]
    pub transaction_map: TransactionMap,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// The newly mined block
    pub block: Block,
}

/// Response for the balance endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    /// The address
    pub address: String,

    /// Balance derived from the local chain
    pub balance: u64,
}

/// Get the full blockchain
#[utoipa::path(
    get,
    path = "/api/v1/blocks",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = Vec<Block>)
    )
)]
pub async fn get_blocks(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.blockchain().chain())
}

/// Offer a chain received from a peer
///
/// The local chain is replaced if the candidate is longer and valid
#[utoipa::path(
    post,
    path = "/api/v1/blocks/sync",
    request_body = Vec<Block>,
    responses(
        (status = 200, description = "Chain replaced", body = SyncResponse),
        (status = 400, description = "Chain rejected")
    )
)]
pub async fn sync_blocks(node: NodeData, candidate: web::Json<Vec<Block>>) -> impl Responder {
    match node.sync_chain(candidate.into_inner()) {
        Ok(()) => HttpResponse::Ok().json(SyncResponse {
            message: "Chain replaced".to_string(),
            length: node.blockchain().len(),
        }),
        Err(err) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("Chain rejected: {}", err)
        })),
    }
}

/// Check if the local blockchain is valid
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = bool)
    )
)]
pub async fn validate_chain(node: NodeData) -> impl Responder {
    let chain = node.blockchain().chain();
    HttpResponse::Ok().json(Blockchain::is_valid_chain(&chain))
}

/// Send coins from the node wallet
///
/// Extends the node wallet's pending transaction if there is one
#[utoipa::path(
    post,
    path = "/api/v1/transact",
    request_body = TransactRequest,
    responses(
        (status = 201, description = "Transaction added to the pool", body = Transaction),
        (status = 400, description = "Invalid transaction data")
    )
)]
pub async fn transact(node: NodeData, request: web::Json<TransactRequest>) -> impl Responder {
    let TransactRequest { recipient, amount } = request.into_inner();

    match node.transact(Address(recipient), amount) {
        Ok(transaction) => HttpResponse::Created().json(transaction),
        Err(err) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("Failed to create transaction: {}", err)
        })),
    }
}

/// Get all pending transactions
#[utoipa::path(
    get,
    path = "/api/v1/transaction-pool",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = PoolResponse)
    )
)]
pub async fn get_transaction_pool(node: NodeData) -> impl Responder {
    let transaction_map = node.pool().transaction_map();

    HttpResponse::Ok().json(PoolResponse {
        length: transaction_map.len(),
        transaction_map,
    })
}

/// Mine the valid pending transactions into a new block
#[utoipa::path(
    post,
    path = "/api/v1/mine-transactions",
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 409, description = "Mining abandoned after a chain replacement"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mine_transactions(node: NodeData) -> impl Responder {
    match node.mine_transactions().await {
        Ok(Some(block)) => HttpResponse::Ok().json(MineResponse {
            message: "New Block Mined".to_string(),
            block,
        }),
        Ok(None) => HttpResponse::Conflict().json(serde_json::json!({
            "error": "Mining abandoned: the chain changed during the search"
        })),
        Err(err) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Failed to mine block: {}", err)
        })),
    }
}

/// Get the node wallet's address and balance
#[utoipa::path(
    get,
    path = "/api/v1/wallet-info",
    responses(
        (status = 200, description = "Wallet info retrieved successfully", body = BalanceResponse)
    )
)]
pub async fn wallet_info(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(BalanceResponse {
        address: node.wallet().address().0.clone(),
        balance: node.wallet_balance(),
    })
}

/// Get the balance of any address
#[utoipa::path(
    get,
    path = "/api/v1/wallet/balance/{address}",
    params(
        ("address" = String, Path, description = "Address to look up")
    ),
    responses(
        (status = 200, description = "Balance retrieved successfully", body = BalanceResponse)
    )
)]
pub async fn get_wallet_balance(node: NodeData, address: web::Path<String>) -> impl Responder {
    let address = Address(address.into_inner());
    let balance = Wallet::calculate_balance(&node.blockchain().chain(), &address);

    HttpResponse::Ok().json(BalanceResponse {
        address: address.0,
        balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use crate::blockchain::TransactionPool;
    use crate::config::{MINING_REWARD, STARTING_BALANCE};
    use actix_web::{test, App};
    use std::sync::Arc;

    fn node() -> NodeData {
        web::Data::new(TransactionMiner::new(
            Arc::new(Blockchain::new()),
            Arc::new(TransactionPool::new()),
            Arc::new(Wallet::new()),
        ))
    }

    #[actix_web::test]
    async fn test_transact_mine_and_balance() {
        let node = node();
        let app = test::init_service(App::new().app_data(node.clone()).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/transact")
            .set_json(TransactRequest {
                recipient: "R".to_string(),
                amount: 50,
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);

        let req = test::TestRequest::get().uri("/api/v1/transaction-pool").to_request();
        let pool: PoolResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(pool.length, 1);

        let req = test::TestRequest::post().uri("/api/v1/mine-transactions").to_request();
        let mined: MineResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(mined.block.data.len(), 2);

        let req = test::TestRequest::get().uri("/api/v1/wallet-info").to_request();
        let info: BalanceResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(info.balance, 950 + MINING_REWARD);

        let req = test::TestRequest::get().uri("/api/v1/wallet/balance/R").to_request();
        let recipient: BalanceResponse = test::call_and_read_body_json(&app, req).await;
        // R starts from STARTING_BALANCE like every address: 1050 rather than 50
        assert_eq!(recipient.balance, STARTING_BALANCE + 50);

        let req = test::TestRequest::get().uri("/api/v1/validate").to_request();
        let valid: bool = test::call_and_read_body_json(&app, req).await;
        assert!(valid);
    }

    #[actix_web::test]
    async fn test_transact_exceeding_balance() {
        let app = test::init_service(App::new().app_data(node()).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/transact")
            .set_json(TransactRequest {
                recipient: "R".to_string(),
                amount: STARTING_BALANCE + 1,
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn test_sync_blocks() {
        let node = node();
        let app = test::init_service(App::new().app_data(node.clone()).configure(configure_routes)).await;

        let peer = Blockchain::new();
        peer.add_block(Vec::new()).unwrap();

        let req = test::TestRequest::post()
            .uri("/api/v1/blocks/sync")
            .set_json(peer.chain())
            .to_request();
        let resp: SyncResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.length, 2);

        // Same length again is rejected
        let req = test::TestRequest::post()
            .uri("/api/v1/blocks/sync")
            .set_json(peer.chain())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let req = test::TestRequest::get().uri("/api/v1/blocks").to_request();
        let chain: Vec<Block> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(chain, peer.chain());
    }
}
