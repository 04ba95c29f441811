use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};

pub static CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "realtime_relay_connections_active",
        "Live WebSocket connections joined to a user room",
    )
    .expect("failed to create realtime_relay_connections_active");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register realtime_relay_connections_active");
    gauge
});

pub static HANDSHAKE_REJECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_relay_handshake_rejections_total",
            "WebSocket upgrades refused during authentication",
        ),
        &["reason"],
    )
    .expect("failed to create realtime_relay_handshake_rejections_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_relay_handshake_rejections_total");
    counter
});

static INTENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_relay_intents_total",
            "Client intents handled, by intent and outcome",
        ),
        &["intent", "outcome"],
    )
    .expect("failed to create realtime_relay_intents_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_relay_intents_total");
    counter
});

pub static EVENTS_DELIVERED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "realtime_relay_events_delivered_total",
        "Outbound events handed to a live connection",
    )
    .expect("failed to create realtime_relay_events_delivered_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_relay_events_delivered_total");
    counter
});

pub fn record_intent(intent: &str, outcome: &str) {
    INTENTS_TOTAL.with_label_values(&[intent, outcome]).inc();
}

pub fn record_handshake_rejection(reason: &str) {
    HANDSHAKE_REJECTIONS_TOTAL
        .with_label_values(&[reason])
        .inc();
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
