use actix_web::{get, http::header, web, Error, HttpRequest, HttpResponse, ResponseError};
use actix_web_actors::ws;
use serde::Deserialize;

use crate::error::AppError;
use crate::metrics;
use crate::models::UserId;
use crate::state::AppState;
use crate::websocket::session::WsSession;
use crate::websocket::Session;

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Credential from `?token=` or, failing that, `Authorization: Bearer`
fn extract_token(params: &WsParams, req: &HttpRequest) -> Option<String> {
    params
        .token
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| {
            req.headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
                .map(|s| s.trim().to_string())
        })
}

async fn authenticate(
    state: &AppState,
    params: &WsParams,
    req: &HttpRequest,
) -> Result<UserId, AppError> {
    let Some(token) = extract_token(params, req) else {
        tracing::warn!("WebSocket connection rejected: no credential provided");
        metrics::record_handshake_rejection("missing_token");
        return Err(AppError::Unauthorized);
    };

    state.verifier.verify(&token).await.map_err(|e| {
        tracing::warn!(error = %e, "WebSocket connection rejected: invalid credential");
        metrics::record_handshake_rejection("invalid_token");
        e
    })
}

/// Upgrade to a relay session. Unauthenticated upgrades get a 401 and no
/// socket; no session state is ever created for them. An unparseable query
/// string counts as carrying no token.
#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: Option<web::Query<WsParams>>,
) -> Result<HttpResponse, Error> {
    let params = query.map(web::Query::into_inner).unwrap_or_default();

    let user_id = match authenticate(&state, &params, &req).await {
        Ok(user_id) => user_id,
        Err(e) => return Ok(e.error_response()),
    };

    let (connection_id, outbound) = state.registry.join(user_id.clone());
    let session = Session {
        connection_id,
        user_id,
    };

    let actor = WsSession::new(
        session,
        outbound,
        state.registry.clone(),
        state.relay.clone(),
        state.config.heartbeat_interval,
        state.config.client_timeout,
    );

    ws::start(actor, &req, stream).map_err(|e| {
        // Upgrade never happened; undo the join
        state.registry.leave(connection_id);
        e
    })
}
