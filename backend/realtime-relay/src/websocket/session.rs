use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::message_types::{Intent, OutboundEvent};
use super::relay::{deliver, Emission, Relay, Session};
use super::SessionRegistry;
use crate::error::AppError;
use crate::metrics;

/// Frame accepted from the socket, waiting its turn in the intent queue
type Queued = Result<Intent, AppError>;

/// WebSocket actor for one authenticated connection.
///
/// The connection has already joined its user's room when the actor is
/// created. Inbound frames are queued and handled strictly one at a time
/// by a worker task, so replies come back in the order intents arrived.
/// Outbound events arrive as serialized text on the room receiver.
pub struct WsSession {
    session: Session,
    registry: SessionRegistry,
    relay: Arc<Relay>,
    outbound: Option<UnboundedReceiver<String>>,
    intents: Option<UnboundedSender<Queued>>,
    hb: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl WsSession {
    pub fn new(
        session: Session,
        outbound: UnboundedReceiver<String>,
        registry: SessionRegistry,
        relay: Arc<Relay>,
        heartbeat_interval: Duration,
        client_timeout: Duration,
    ) -> Self {
        Self {
            session,
            registry,
            relay,
            outbound: Some(outbound),
            intents: None,
            hb: Instant::now(),
            heartbeat_interval,
            client_timeout,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.client_timeout;
        ctx.run_interval(self.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                tracing::warn!(
                    user_id = %act.session.user_id,
                    connection_id = %act.session.connection_id,
                    "WebSocket heartbeat failed, disconnecting"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Spawn the FIFO worker draining this connection's intents.
    ///
    /// The worker outlives the actor: intents queued before a disconnect are
    /// still handled (a send is persisted), their emissions simply find no
    /// live connection.
    fn spawn_intent_worker(&mut self) {
        let (tx, mut rx) = unbounded_channel::<Queued>();
        self.intents = Some(tx);

        let session = self.session.clone();
        let registry = self.registry.clone();
        let relay = self.relay.clone();

        actix::spawn(async move {
            while let Some(queued) = rx.recv().await {
                let emissions = match queued {
                    Ok(intent) => relay.handle(&session, intent).await,
                    Err(err) => {
                        metrics::record_intent("unknown", err.kind());
                        vec![Emission::Reply(OutboundEvent::error(&err))]
                    }
                };
                deliver(&registry, &session, emissions);
            }
            tracing::debug!(
                connection_id = %session.connection_id,
                "intent queue drained"
            );
        });
    }

    fn enqueue(&mut self, queued: Queued, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(intents) = &self.intents else {
            return;
        };
        if intents.send(queued).is_err() {
            tracing::error!(
                connection_id = %self.session.connection_id,
                "intent worker gone, closing connection"
            );
            ctx.stop();
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            user_id = %self.session.user_id,
            connection_id = %self.session.connection_id,
            "WebSocket session started"
        );

        if let Some(outbound) = self.outbound.take() {
            ctx.add_stream(UnboundedReceiverStream::new(outbound));
        }
        self.spawn_intent_worker();
        self.hb(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.registry.leave(self.session.connection_id);
        // Closing the queue lets the worker finish what is already queued
        self.intents.take();

        tracing::info!(
            user_id = %self.session.user_id,
            connection_id = %self.session.connection_id,
            "WebSocket session stopped"
        );
    }
}

// Events routed to this connection by the registry
impl StreamHandler<String> for WsSession {
    fn handle(&mut self, payload: String, ctx: &mut Self::Context) {
        ctx.text(payload);
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        // Registry dropped this connection (shutdown or pruned)
        ctx.close(Some(ws::CloseCode::Away.into()));
        ctx.stop();
    }
}

// Frames from the client
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                let queued = Intent::parse(&text);
                if let Err(e) = &queued {
                    tracing::warn!(
                        connection_id = %self.session.connection_id,
                        error = %e,
                        "rejecting malformed frame"
                    );
                }
                self.enqueue(queued, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("Binary WebSocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(?reason, "WebSocket close message received");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                tracing::warn!("Fragmented WebSocket messages not supported");
                ctx.stop();
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}
