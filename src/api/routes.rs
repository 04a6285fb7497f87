use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/blocks", web::get().to(handlers::get_chain))
        .route("/transactions/new", web::post().to(handlers::new_transaction))
        .route("/mempool", web::get().to(handlers::get_mempool))
        .route("/mine", web::post().to(handlers::mine_block))
        .route("/mine/cancel", web::post().to(handlers::cancel_mining))
        .route("/nodes/register", web::post().to(handlers::register_nodes))
        .route("/nodes", web::get().to(handlers::get_nodes))
        .route("/nodes/receive_block", web::post().to(handlers::receive_block))
        .route("/nodes/receive_tx", web::post().to(handlers::receive_transaction))
        .route("/nodes/resolve", web::post().to(handlers::resolve_conflicts))
        .route("/balance/{address}", web::get().to(handlers::get_balance));
}
