use std::time::Duration;

use salvo::prelude::*;
use serde_json::{Value, json};
use tracing::warn;

use crate::web::metrics::MetricsSnapshot;
use crate::web::web_state;

#[handler]
pub async fn health_check(res: &mut Response) {
    let state = web_state();
    let counts = match state.db_manager.counts().await {
        Ok(counts) => Some(counts),
        Err(e) => {
            warn!("health check could not read the store: {}", e);
            None
        }
    };

    let payload = health_payload(state.started_at.elapsed(), state.metrics.snapshot(), counts);
    if counts.is_none() {
        res.status_code(StatusCode::SERVICE_UNAVAILABLE);
    }
    res.render(Json(payload));
}

fn health_payload(
    uptime: Duration,
    snapshot: MetricsSnapshot,
    counts: Option<(i64, i64)>,
) -> Value {
    let last_cycle = match snapshot.last_cycle_success {
        Some(true) => "ok",
        Some(false) => "failed",
        None => "pending",
    };
    let status = if counts.is_some() { "running" } else { "degraded" };
    let store = counts.map(|(channels, messages)| {
        json!({
            "channels": channels,
            "messages": messages,
        })
    });

    json!({
        "status": status,
        "uptime_seconds": uptime.as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "last_cycle": last_cycle,
        "cycles_total": snapshot.cycles_total,
        "store": store,
    })
}
