use actix_web::web;

use crate::metrics;

pub mod health;
pub mod wsroute;

/// Mount every HTTP route. Shared by the binary and the end-to-end tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(wsroute::ws_handler)
        .service(health::health)
        .route("/metrics", web::get().to(metrics::serve_metrics));
}
