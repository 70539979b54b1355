use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::api::{CycleLatency, MonitorStats};
use crate::error::Result;

#[derive(Clone)]
pub struct ApiState {
    pub stats: Arc<MonitorStats>,
    pub latency: Arc<CycleLatency>,
    pub collection_url: String,
    pub threshold: f64,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/stats/summary", get(get_stats_summary))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub running: bool,
    pub last_cycle_at_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub collection_url: String,
    pub threshold: f64,
    pub cycles: u64,
    pub empty_cycles: u64,
    pub void_cycles: u64,
    pub items_seen: u64,
    pub items_dropped: u64,
    pub alerts_sent: u64,
    pub alerts_failed: u64,
    pub publishes_ok: u64,
    pub publishes_failed: u64,
    pub last_balance: u64,
}

#[derive(Debug, Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
    pub max_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let last = MonitorStats::get(&state.stats.last_cycle_at_secs);
    Json(HealthResponse {
        running: state.stats.is_running(),
        last_cycle_at_secs: (last > 0).then_some(last),
    })
}

async fn get_stats_summary(State(state): State<ApiState>) -> Json<SummaryResponse> {
    let s = &state.stats;
    Json(SummaryResponse {
        collection_url: state.collection_url.clone(),
        threshold: state.threshold,
        cycles: MonitorStats::get(&s.cycles),
        empty_cycles: MonitorStats::get(&s.empty_cycles),
        void_cycles: MonitorStats::get(&s.void_cycles),
        items_seen: MonitorStats::get(&s.items_seen),
        items_dropped: MonitorStats::get(&s.items_dropped),
        alerts_sent: MonitorStats::get(&s.alerts_sent),
        alerts_failed: MonitorStats::get(&s.alerts_failed),
        publishes_ok: MonitorStats::get(&s.publishes_ok),
        publishes_failed: MonitorStats::get(&s.publishes_failed),
        last_balance: MonitorStats::get(&s.last_balance),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Result<Json<LatencyResponse>> {
    let p = state.latency.percentiles()?;
    Ok(Json(LatencyResponse {
        samples: state.latency.len(),
        p50_ms: p.map(|p| p.0),
        p95_ms: p.map(|p| p.1),
        p99_ms: p.map(|p| p.2),
        max_ms: p.map(|p| p.3),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn state() -> ApiState {
        ApiState {
            stats: Arc::new(MonitorStats::new()),
            latency: Arc::new(CycleLatency::new()),
            collection_url: "https://opensea.io/collection/yn".to_string(),
            threshold: 20.0,
        }
    }

    #[tokio::test]
    async fn health_reports_no_cycle_before_first_run() {
        let Json(h) = get_health(State(state())).await;
        assert!(!h.running);
        assert_eq!(h.last_cycle_at_secs, None);
    }

    #[tokio::test]
    async fn summary_reflects_counters() {
        let st = state();
        MonitorStats::add(&st.stats.items_seen, 4);
        MonitorStats::inc(&st.stats.alerts_sent);
        st.stats.set_last_balance(100_000);

        let Json(s) = get_stats_summary(State(st)).await;
        assert_eq!(s.items_seen, 4);
        assert_eq!(s.alerts_sent, 1);
        assert_eq!(s.last_balance, 100_000);
        assert_eq!(s.threshold, 20.0);
    }

    #[tokio::test]
    async fn latency_reports_recorded_cycles() {
        let st = state();
        st.latency.record(Duration::from_millis(250));
        let Json(l) = get_stats_latency(State(st)).await.unwrap();
        assert_eq!(l.samples, 1);
        assert!(l.p50_ms.is_some());
    }
}
