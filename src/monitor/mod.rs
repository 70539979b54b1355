//! Monitor Loop: drives the Listing Source through repeated cycles,
//! evaluates every listing, alerts on underpriced ones and publishes the
//! cycle snapshot.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::{CycleLatency, MonitorStats};
use crate::config::Config;
use crate::error::AppError;
use crate::evaluator::{ratio, should_alert};
use crate::notify::AlertDispatcher;
use crate::sink::SnapshotSink;
use crate::source::extract::extract_item;
use crate::source::ListingSource;
use crate::types::{Alert, CollectionBalance, CycleSnapshot, ListingItem, RawListing};

#[derive(Debug, Clone)]
pub struct MonitorParams {
    /// Collection endpoint with the auction filter already applied.
    pub endpoint: String,
    pub threshold: f64,
    pub conversion_rate: f64,
    /// Fixed pause before retrying after an empty market or a void cycle.
    pub retry_pause: Duration,
}

impl MonitorParams {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            endpoint: cfg.filtered_collection_url(),
            threshold: cfg.threshold,
            conversion_rate: cfg.conversion_rate,
            retry_pause: cfg.waits.empty_market_pause,
        }
    }
}

/// Why the loop stopped.
#[derive(Debug)]
pub enum Stop {
    Cancelled,
    /// Page or balance indicator never became available.
    Fatal(AppError),
}

#[derive(Debug)]
enum State {
    Init,
    WaitForPage,
    WaitForBalance,
    WaitForItems {
        balance: CollectionBalance,
        started: Instant,
    },
    ExtractAndEvaluate {
        balance: CollectionBalance,
        raws: Vec<RawListing>,
        started: Instant,
    },
    Publish {
        snapshot: CycleSnapshot,
        started: Instant,
    },
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Init => "init",
            State::WaitForPage => "wait_for_page",
            State::WaitForBalance => "wait_for_balance",
            State::WaitForItems { .. } => "wait_for_items",
            State::ExtractAndEvaluate { .. } => "extract_and_evaluate",
            State::Publish { .. } => "publish",
        }
    }
}

pub struct Monitor<S, A, K> {
    params: MonitorParams,
    source: S,
    dispatcher: A,
    sink: K,
    stats: Arc<MonitorStats>,
    latency: Arc<CycleLatency>,
    cancel: CancellationToken,
}

impl<S, A, K> Monitor<S, A, K>
where
    S: ListingSource,
    A: AlertDispatcher,
    K: SnapshotSink,
{
    pub fn new(
        params: MonitorParams,
        source: S,
        dispatcher: A,
        sink: K,
        stats: Arc<MonitorStats>,
        latency: Arc<CycleLatency>,
        cancel: CancellationToken,
    ) -> Self {
        Self { params, source, dispatcher, sink, stats, latency, cancel }
    }

    /// Run until cancelled or until a startup wait fails. The listing source
    /// is closed on every exit path.
    pub async fn run(mut self) -> Stop {
        self.stats.set_running(true);
        let stop = self.drive().await;
        self.stats.set_running(false);

        if let Err(e) = self.source.close().await {
            warn!("Issue while closing listing source: {e}");
        }
        match &stop {
            Stop::Cancelled => info!("Monitor stopped on request"),
            Stop::Fatal(e) => error!("Monitor stopped: {e}"),
        }
        stop
    }

    async fn drive(&mut self) -> Stop {
        let mut state = State::Init;
        loop {
            if self.cancel.is_cancelled() {
                return Stop::Cancelled;
            }
            debug!(state = state.name(), "transition");
            state = match self.step(state).await {
                ControlFlow::Continue(next) => next,
                ControlFlow::Break(stop) => return stop,
            };
        }
    }

    async fn step(&mut self, state: State) -> ControlFlow<Stop, State> {
        let cancel = self.cancel.clone();
        match state {
            State::Init => ControlFlow::Continue(State::WaitForPage),

            State::WaitForPage => {
                let Some(res) = race(&cancel, self.source.open(&self.params.endpoint)).await else {
                    return ControlFlow::Break(Stop::Cancelled);
                };
                match res {
                    Ok(()) => {
                        info!("Collection page ready");
                        ControlFlow::Continue(State::WaitForBalance)
                    }
                    Err(e) => ControlFlow::Break(Stop::Fatal(e)),
                }
            }

            State::WaitForBalance => {
                let started = Instant::now();
                let Some(res) = race(&cancel, self.source.read_balance()).await else {
                    return ControlFlow::Break(Stop::Cancelled);
                };
                match res {
                    Ok(balance) => {
                        info!(balance, "Read collection balance");
                        self.stats.set_last_balance(balance);
                        ControlFlow::Continue(State::WaitForItems { balance, started })
                    }
                    Err(e) if e.is_fatal() => ControlFlow::Break(Stop::Fatal(e)),
                    Err(e) => {
                        warn!("Cycle void, balance not available: {e}");
                        MonitorStats::inc(&self.stats.void_cycles);
                        self.pause_then(State::WaitForBalance).await
                    }
                }
            }

            State::WaitForItems { balance, started } => {
                let Some(res) = race(&cancel, self.source.read_items()).await else {
                    return ControlFlow::Break(Stop::Cancelled);
                };
                match res {
                    Ok(raws) if raws.is_empty() => {
                        info!("No item found, going to next cycle");
                        MonitorStats::inc(&self.stats.empty_cycles);
                        self.pause_then(State::WaitForBalance).await
                    }
                    Ok(raws) => ControlFlow::Continue(State::ExtractAndEvaluate { balance, raws, started }),
                    Err(e) if e.is_fatal() => ControlFlow::Break(Stop::Fatal(e)),
                    Err(e) => {
                        warn!(balance, "Cycle void, listings not readable: {e}");
                        MonitorStats::inc(&self.stats.void_cycles);
                        self.pause_then(State::WaitForBalance).await
                    }
                }
            }

            State::ExtractAndEvaluate { balance, raws, started } => {
                let snapshot = self.evaluate(balance, &raws).await;
                ControlFlow::Continue(State::Publish { snapshot, started })
            }

            State::Publish { snapshot, started } => {
                match self.sink.publish(&snapshot).await {
                    Ok(()) => {
                        MonitorStats::inc(&self.stats.publishes_ok);
                        info!(rows = snapshot.len(), "Collection stats published");
                    }
                    Err(e) => {
                        MonitorStats::inc(&self.stats.publishes_failed);
                        error!(rows = snapshot.len(), balance = snapshot.balance, "{e}");
                    }
                }
                MonitorStats::inc(&self.stats.cycles);
                self.stats.set_last_cycle_at_secs(now_secs());
                self.latency.record(started.elapsed());
                ControlFlow::Continue(State::WaitForBalance)
            }
        }
    }

    /// Extract, evaluate and (if matched) alert on every listing in page
    /// order. A bad listing is dropped without affecting the others.
    async fn evaluate(&self, balance: CollectionBalance, raws: &[RawListing]) -> CycleSnapshot {
        let mut snapshot = CycleSnapshot::new(balance);
        MonitorStats::add(&self.stats.items_seen, raws.len() as u64);

        for (index, raw) in raws.iter().enumerate() {
            let priced = match extract_item(raw, self.params.conversion_rate) {
                Ok(p) => p,
                Err(e) => {
                    warn!(
                        index,
                        balance,
                        price = ?raw.price_text,
                        link = ?raw.link,
                        "Dropping listing: {e}",
                    );
                    MonitorStats::inc(&self.stats.items_dropped);
                    continue;
                }
            };
            let item_ratio = match ratio(balance, priced.price) {
                Ok(r) => r,
                Err(e) => {
                    warn!(index, balance, price = priced.price, link = %priced.link, "Dropping listing: {e}");
                    MonitorStats::inc(&self.stats.items_dropped);
                    continue;
                }
            };
            let item = ListingItem {
                price: priced.price,
                link: priced.link,
                ratio: item_ratio,
            };

            let matched = should_alert(item.ratio, self.params.threshold);
            info!(
                price = item.price,
                balance,
                ratio = item.ratio,
                link = %item.link,
                matched,
                "Evaluated listing",
            );
            if matched {
                let alert = Alert::for_item(&item, balance, self.params.threshold);
                match self.dispatcher.notify(&alert).await {
                    Ok(()) => MonitorStats::inc(&self.stats.alerts_sent),
                    Err(e) => {
                        MonitorStats::inc(&self.stats.alerts_failed);
                        warn!(price = item.price, balance, ratio = item.ratio, link = %item.link, "{e}");
                    }
                }
            }
            snapshot.items.push(item);
        }
        snapshot
    }

    async fn pause_then(&self, next: State) -> ControlFlow<Stop, State> {
        match race(&self.cancel, tokio::time::sleep(self.params.retry_pause)).await {
            Some(()) => ControlFlow::Continue(next),
            None => ControlFlow::Break(Stop::Cancelled),
        }
    }
}

/// Resolve `fut` unless `cancel` fires first.
async fn race<T>(cancel: &CancellationToken, fut: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
