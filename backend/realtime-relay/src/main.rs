use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use realtime_relay::{config, error, logging, routes, server, state::AppState};
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

fn cors(origin: Option<&str>) -> Cors {
    let cors = match origin {
        Some(origin) => Cors::default().allowed_origin(origin),
        None => Cors::default().allow_any_origin(),
    };
    cors.allow_any_method().allow_any_header().max_age(3600)
}

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let state = AppState::from_config(cfg.clone()).await?;
    let registry = state.registry.clone();

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting realtime-relay");

    let http_state = state.clone();
    let cors_origin = cfg.cors_origin.clone();
    let http_server = HttpServer::new(move || {
        App::new()
            .wrap(cors(cors_origin.as_deref()))
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(http_state.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind: {e}")))?
    .disable_signals()
    .run();

    server::run_until(http_server, registry, server::shutdown_signal())
        .await
        .map_err(|e| error::AppError::StartServer(format!("server: {e}")))
}
