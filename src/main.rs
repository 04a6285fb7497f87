use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use powledger::api::{self, handlers, schema};
use powledger::blockchain;
use powledger::config::NodeConfig;
use powledger::node::Node;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_chain,
        handlers::new_transaction,
        handlers::get_mempool,
        handlers::mine_block,
        handlers::cancel_mining,
        handlers::register_nodes,
        handlers::get_nodes,
        handlers::receive_block,
        handlers::receive_transaction,
        handlers::resolve_conflicts,
        handlers::get_balance
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::Address,
            blockchain::DigitalSignature,
            schema::ChainResponse,
            schema::MempoolResponse,
            schema::TransactionAccepted,
            schema::MineResponse,
            schema::RegisterNodesRequest,
            schema::NodesResponse,
            schema::ResolveResponse,
            schema::BalanceResponse,
            schema::MessageResponse
        )
    ),
    tags(
        (name = "ledger", description = "Proof-of-work ledger node endpoints")
    ),
    info(
        title = "Ledger Node API",
        version = "1.0.0",
        description = "A minimal proof-of-work ledger node",
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

    let config = NodeConfig::parse();

    info!(
        "Creating genesis block at difficulty {} (reward {})",
        config.difficulty, config.mining_reward
    );
    let node = web::Data::new(Node::new(&config));

    info!("Node {} mining to {}", config.self_url(), node.miner_address());
    info!("Peers: {:?}", node.peers().list());
    info!("Starting HTTP server at http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Configure OpenAPI documentation
        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(node.clone())
            .app_data(web::JsonConfig::default().limit(16 * 1024 * 1024))
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()))
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?
    .run()
    .await
    .context("HTTP server failed")
}
