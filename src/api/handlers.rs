use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder};
use log::{info, warn};
use serde_json::Value;

use super::schema::{
    BalanceResponse, ChainResponse, MempoolResponse, MessageResponse, MineResponse, NodesResponse,
    RegisterNodesRequest, ResolveResponse, TransactionAccepted,
};
use crate::blockchain::{Address, Block, BlockchainError, MempoolError, Transaction};
use crate::node::{decode_block, decode_transaction, peers, Node};

/// Shared node state
pub type NodeData = web::Data<Node>;

fn error_status(err: &BlockchainError) -> StatusCode {
    match err {
        BlockchainError::InvalidBlockLinkage { .. }
        | BlockchainError::MiningInProgress
        | BlockchainError::MiningCancelled => StatusCode::CONFLICT,
        BlockchainError::SystemError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn gossip_block(node: &Node, block: Block) {
    let targets = node.peers().list();
    if targets.is_empty() {
        return;
    }

    let timeout = node.network_timeout();
    actix_web::rt::spawn(async move {
        let delivered = peers::broadcast_block(&targets, &block, timeout).await;
        info!("Block {} delivered to {}/{} peers", block.index, delivered, targets.len());
    });
}

fn gossip_transaction(node: &Node, transaction: Transaction) {
    let targets = node.peers().list();
    if targets.is_empty() {
        return;
    }

    let timeout = node.network_timeout();
    actix_web::rt::spawn(async move {
        let delivered = peers::broadcast_transaction(&targets, &transaction, timeout).await;
        info!(
            "Transaction {} delivered to {}/{} peers",
            transaction.id,
            delivered,
            targets.len()
        );
    });
}

/// Get the full chain
#[utoipa::path(
    get,
    path = "/blocks",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(node: NodeData) -> impl Responder {
    let chain = node.chain();

    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        chain,
    })
}

/// Submit a signed transaction
///
/// The sender must be able to cover the amount with their balance net of
/// their other pending transactions. Accepted transactions are relayed to peers.
#[utoipa::path(
    post,
    path = "/transactions/new",
    request_body = Transaction,
    responses(
        (status = 201, description = "Transaction added to mempool", body = TransactionAccepted),
        (status = 400, description = "Malformed, invalid, duplicate or unfunded transaction", body = MessageResponse)
    )
)]
pub async fn new_transaction(node: NodeData, payload: web::Json<Value>) -> impl Responder {
    let transaction = match decode_transaction(payload.into_inner()) {
        Ok(transaction) => transaction,
        Err(err) => {
            return HttpResponse::BadRequest().json(MessageResponse::error("Invalid transaction format", err));
        }
    };

    let tx_id = transaction.id.clone();
    match node.submit_transaction(transaction.clone(), true) {
        Ok(()) => {
            gossip_transaction(&node, transaction);
            HttpResponse::Created().json(TransactionAccepted {
                message: "Transaction added to mempool".to_string(),
                tx_id,
            })
        }
        Err(err) => HttpResponse::BadRequest().json(MessageResponse::error("Transaction rejected", err)),
    }
}

/// Get all pending transactions
#[utoipa::path(
    get,
    path = "/mempool",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = MempoolResponse)
    )
)]
pub async fn get_mempool(node: NodeData) -> impl Responder {
    let mempool = node.pending_transactions();

    HttpResponse::Ok().json(MempoolResponse {
        count: mempool.len(),
        mempool,
    })
}

/// Mine a new block
///
/// Packs the admissible pending transactions behind a coinbase reward to this
/// node's miner address. The search runs off the request thread and can be
/// cancelled through `/mine/cancel`.
#[utoipa::path(
    post,
    path = "/mine",
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 400, description = "Nothing to mine", body = MessageResponse),
        (status = 409, description = "Mining already running, cancelled, or outpaced by another block", body = MessageResponse)
    )
)]
pub async fn mine_block(node: NodeData) -> impl Responder {
    match node.mine().await {
        Ok(block) => {
            gossip_block(&node, block.clone());
            HttpResponse::Ok().json(MineResponse {
                message: "New block forged".to_string(),
                block,
            })
        }
        Err(err) => {
            warn!("Mining failed: {}", err);
            HttpResponse::build(error_status(&err)).json(MessageResponse::error("Mining failed", err))
        }
    }
}

/// Cancel the running block search
#[utoipa::path(
    post,
    path = "/mine/cancel",
    responses(
        (status = 200, description = "Cancellation result", body = MessageResponse)
    )
)]
pub async fn cancel_mining(node: NodeData) -> impl Responder {
    let message = if node.cancel_mining() {
        "Mining cancelled"
    } else {
        "No mining in progress"
    };

    HttpResponse::Ok().json(MessageResponse::new(message))
}

/// Register peers
#[utoipa::path(
    post,
    path = "/nodes/register",
    request_body = RegisterNodesRequest,
    responses(
        (status = 200, description = "Nodes registered", body = NodesResponse),
        (status = 400, description = "No nodes provided", body = MessageResponse)
    )
)]
pub async fn register_nodes(node: NodeData, request: web::Json<RegisterNodesRequest>) -> impl Responder {
    if request.nodes.is_empty() {
        return HttpResponse::BadRequest().json(MessageResponse::new("No nodes provided"));
    }

    let added = node.peers().register(&request.nodes);
    info!("Registered {} new peers", added);

    HttpResponse::Ok().json(NodesResponse {
        nodes: node.peers().list(),
    })
}

/// List known peers
#[utoipa::path(
    get,
    path = "/nodes",
    responses(
        (status = 200, description = "Known peers", body = NodesResponse)
    )
)]
pub async fn get_nodes(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(NodesResponse {
        nodes: node.peers().list(),
    })
}

/// Receive a block mined by a peer
#[utoipa::path(
    post,
    path = "/nodes/receive_block",
    request_body = Block,
    responses(
        (status = 200, description = "Block added", body = MessageResponse),
        (status = 400, description = "Malformed or invalid block", body = MessageResponse),
        (status = 409, description = "Block does not link to the chain tip", body = MessageResponse)
    )
)]
pub async fn receive_block(node: NodeData, payload: web::Json<Value>) -> impl Responder {
    let block = match decode_block(payload.into_inner()) {
        Ok(block) => block,
        Err(err) => {
            return HttpResponse::BadRequest().json(MessageResponse::error("Invalid block payload", err));
        }
    };

    match node.import_block(block) {
        Ok(()) => HttpResponse::Ok().json(MessageResponse::new("Block added")),
        Err(err @ BlockchainError::InvalidBlockLinkage { .. }) => HttpResponse::Conflict().json(
            MessageResponse::error("Block does not link to current chain tip, consider resolving conflicts", err),
        ),
        Err(err) => HttpResponse::BadRequest().json(MessageResponse::error("Invalid block", err)),
    }
}

/// Receive a transaction relayed by a peer
#[utoipa::path(
    post,
    path = "/nodes/receive_tx",
    request_body = Transaction,
    responses(
        (status = 200, description = "Transaction accepted", body = MessageResponse),
        (status = 400, description = "Malformed, invalid, duplicate or unfunded transaction", body = MessageResponse)
    )
)]
pub async fn receive_transaction(node: NodeData, payload: web::Json<Value>) -> impl Responder {
    let transaction = match decode_transaction(payload.into_inner()) {
        Ok(transaction) => transaction,
        Err(err) => {
            return HttpResponse::BadRequest().json(MessageResponse::error("Invalid tx payload", err));
        }
    };

    match node.submit_transaction(transaction, true) {
        Ok(()) => HttpResponse::Ok().json(MessageResponse::new("Tx accepted")),
        Err(err @ MempoolError::DuplicateTransaction(_)) => {
            HttpResponse::BadRequest().json(MessageResponse::error("Tx duplicate", err))
        }
        Err(err) => HttpResponse::BadRequest().json(MessageResponse::error("Tx rejected", err)),
    }
}

/// Resolve conflicts against every peer
///
/// Fetches each peer's chain and adopts the first strictly longer valid one.
#[utoipa::path(
    post,
    path = "/nodes/resolve",
    responses(
        (status = 200, description = "Resolution result", body = ResolveResponse)
    )
)]
pub async fn resolve_conflicts(node: NodeData) -> impl Responder {
    let chains = peers::fetch_chains(&node.peers().list(), node.network_timeout()).await;
    let replaced = node.import_chain(chains);

    let message = if replaced {
        "Our chain was replaced"
    } else {
        "Our chain is authoritative"
    };

    HttpResponse::Ok().json(ResolveResponse {
        message: message.to_string(),
        replaced,
    })
}

/// Get an address's balance
///
/// Derived by replaying every transaction in the chain.
#[utoipa::path(
    get,
    path = "/balance/{address}",
    params(
        ("address" = String, Path, description = "Hex public key, or any miner address")
    ),
    responses(
        (status = 200, description = "Balance retrieved successfully", body = BalanceResponse)
    )
)]
pub async fn get_balance(node: NodeData, address: web::Path<String>) -> impl Responder {
    let address = Address(address.into_inner());
    let balance = node.balance_of(&address);

    HttpResponse::Ok().json(BalanceResponse {
        address: address.0,
        balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use crate::blockchain::{Blockchain, Wallet};
    use crate::config::NodeConfig;
    use actix_web::{test, App};

    fn node_data(allow_empty_blocks: bool, miner: &str) -> NodeData {
        web::Data::new(Node::new(&NodeConfig {
            difficulty: 1,
            miner_address: Some(miner.to_string()),
            allow_empty_blocks,
            ..NodeConfig::default()
        }))
    }

    #[actix_web::test]
    async fn test_get_chain() {
        let app = test::init_service(App::new().app_data(node_data(false, "miner")).configure(configure_routes)).await;

        let request = test::TestRequest::get().uri("/blocks").to_request();
        let response: ChainResponse = test::call_and_read_body_json(&app, request).await;

        assert_eq!(response.length, 1);
        assert_eq!(response.chain[0].previous_hash, "1");
    }

    #[actix_web::test]
    async fn test_mine_empty_mempool_is_bad_request() {
        let app = test::init_service(App::new().app_data(node_data(false, "miner")).configure(configure_routes)).await;

        let request = test::TestRequest::post().uri("/mine").to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_mine_and_query_balance() {
        let app = test::init_service(App::new().app_data(node_data(true, "miner-1")).configure(configure_routes)).await;

        let request = test::TestRequest::post().uri("/mine").to_request();
        let mined: MineResponse = test::call_and_read_body_json(&app, request).await;
        assert_eq!(mined.block.index, 2);

        let request = test::TestRequest::get().uri("/balance/miner-1").to_request();
        let balance: BalanceResponse = test::call_and_read_body_json(&app, request).await;
        assert_eq!(balance.balance, 50.0);
    }

    #[actix_web::test]
    async fn test_submit_transaction() {
        let alice = Wallet::new();
        let data = node_data(true, &alice.address().0);
        data.mine().await.unwrap();
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure_routes)).await;

        let mut transaction = Transaction::new(alice.address().clone(), Address::from("bob"), 10.0);
        transaction.sign(&alice).unwrap();

        let request = test::TestRequest::post()
            .uri("/transactions/new")
            .set_json(&transaction)
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let request = test::TestRequest::post()
            .uri("/nodes/receive_tx")
            .set_json(&transaction)
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = test::TestRequest::get().uri("/mempool").to_request();
        let mempool: MempoolResponse = test::call_and_read_body_json(&app, request).await;
        assert_eq!(mempool.count, 1);
        assert_eq!(mempool.mempool[0].id, transaction.id);
    }

    #[actix_web::test]
    async fn test_malformed_transaction_is_rejected() {
        let app = test::init_service(App::new().app_data(node_data(false, "miner")).configure(configure_routes)).await;

        let request = test::TestRequest::post()
            .uri("/transactions/new")
            .set_json(serde_json::json!({ "sender": "a", "amount": "ten" }))
            .to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_receive_block() {
        let peer = node_data(true, "peer-miner");
        let block = peer.mine().await.unwrap();
        let app = test::init_service(App::new().app_data(node_data(false, "miner")).configure(configure_routes)).await;

        let mut forged = block.clone();
        forged.transactions[0].amount = 1_000.0;
        let request = test::TestRequest::post()
            .uri("/nodes/receive_block")
            .set_json(&forged)
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::BAD_REQUEST);

        let request = test::TestRequest::post()
            .uri("/nodes/receive_block")
            .set_json(&block)
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::OK);

        let mut orphan = Blockchain::genesis_block(1);
        orphan.previous_hash = "unknown".to_string();
        orphan.proof_of_work(None);
        let request = test::TestRequest::post()
            .uri("/nodes/receive_block")
            .set_json(&orphan)
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn test_register_and_list_nodes() {
        let app = test::init_service(App::new().app_data(node_data(false, "miner")).configure(configure_routes)).await;

        let request = test::TestRequest::post()
            .uri("/nodes/register")
            .set_json(RegisterNodesRequest { nodes: Vec::new() })
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::BAD_REQUEST);

        let request = test::TestRequest::post()
            .uri("/nodes/register")
            .set_json(RegisterNodesRequest {
                nodes: vec!["node1:8000".to_string(), "http://node2:8000/".to_string()],
            })
            .to_request();
        let registered: NodesResponse = test::call_and_read_body_json(&app, request).await;
        assert_eq!(registered.nodes, vec!["http://node1:8000", "http://node2:8000"]);

        let request = test::TestRequest::get().uri("/nodes").to_request();
        let listed: NodesResponse = test::call_and_read_body_json(&app, request).await;
        assert_eq!(listed.nodes, registered.nodes);
    }

    #[actix_web::test]
    async fn test_resolve_without_peers_keeps_chain() {
        let app = test::init_service(App::new().app_data(node_data(false, "miner")).configure(configure_routes)).await;

        let request = test::TestRequest::post().uri("/nodes/resolve").to_request();
        let response: ResolveResponse = test::call_and_read_body_json(&app, request).await;

        assert!(!response.replaced);
    }
}
