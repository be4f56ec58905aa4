//! # Poll Cycle Engine
//!
//! The `Crawler` is a periodic coordinator. On every tick it fetches one snapshot
//! per configured service, computes an update for every registered widget and
//! hands one encoded envelope to the broadcast hub.
//!
//! ## Cycle Workflow:
//! 1.  **Fan-out**: one tokio task per service, each reporting `(name, result)` into
//!     an `mpsc` channel sized to the service count.
//! 2.  **Fan-in under a deadline**: results are collected as they arrive until every
//!     service has reported or the per-cycle deadline (measured from the tick)
//!     passes. Failed fetches are logged and leave no entry.
//! 3.  **Cancellation**: every cycle owns a child `CancellationToken`. Once the join
//!     point returns the token is cancelled, so stragglers drop their in-flight
//!     request instead of running on in the background.
//! 4.  **Extraction**: widgets are evaluated in declaration order, never arrival
//!     order. A source without a snapshot degrades its widgets to their fallback
//!     values; it never aborts the cycle.
//! 5.  **Publish**: the envelope is encoded once. An encoding failure skips this
//!     cycle only.
//!
//! Cycles run inline on the coordinator, so two cycles never overlap and each one
//! collects into its own channel and map. There is no retry or backoff: every tick
//! is a fresh attempt.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::core::clock::{Clock, SystemClock};
use crate::core::hub::HubHandle;
use crate::core::metric::{gauge_value, line_chart_value, text_value};
use crate::core::registry::WidgetRegistry;
use crate::core::updates::{GaugeUpdate, LineChartUpdate, LinePoint, TextUpdate, UpdateEnvelope};
use crate::retrieve::{FetchError, Fetcher, Service, Snapshot};

/// How long a cycle waits for its fetches.
pub const DEFAULT_CYCLE_DEADLINE: Duration = Duration::from_secs(1);
/// Time between two ticks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Where the engine is in its tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlerState {
    /// Waiting for the next tick.
    Idle,
    /// Fan-out in progress.
    Collecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlerOptions {
    pub interval: Duration,
    pub cycle_deadline: Duration,
}

impl Default for CrawlerOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            cycle_deadline: DEFAULT_CYCLE_DEADLINE,
        }
    }
}

/// # Crawler
pub struct Crawler {
    options: CrawlerOptions,
    fetcher: Arc<dyn Fetcher>,
    hub: HubHandle,
    services: Vec<Service>,
    widgets: Arc<WidgetRegistry>,
    clock: Arc<dyn Clock>,
    state: RwLock<CrawlerState>,
}

impl Crawler {
    /// Creates a crawler using the wall clock.
    pub fn new(
        options: CrawlerOptions,
        fetcher: Arc<dyn Fetcher>,
        hub: HubHandle,
        services: Vec<Service>,
        widgets: Arc<WidgetRegistry>,
    ) -> Self {
        Self {
            options,
            fetcher,
            hub,
            services,
            widgets,
            clock: Arc::new(SystemClock),
            state: RwLock::new(CrawlerState::Idle),
        }
    }

    /// Replaces the clock used to timestamp line chart points.
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub async fn current_state(&self) -> CrawlerState {
        *self.state.read().await
    }

    /// # Main Execution Loop
    ///
    /// Ticks every `interval` (the first cycle runs one interval after start) until
    /// `shutdown` is cancelled. Cancelling also cancels the fetches of the cycle in
    /// progress. Missed ticks are skipped rather than replayed in a burst.
    pub async fn run(&self, shutdown: CancellationToken) {
        log::info!(
            "Crawler started: {} services, {} widgets, every {:?}.",
            self.services.len(),
            self.widgets.len(),
            self.options.interval
        );

        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.options.interval, self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("Crawler received shutdown signal.");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_cycle(&shutdown).await;
                }
            }
        }
    }

    /// Runs one fetch → extract → publish cycle. Returns whether a frame was published.
    ///
    /// A cycle interrupted by `shutdown` publishes nothing: its fetches were
    /// cancelled, not failed, so fallback values would be wrong.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> bool {
        self.set_state(CrawlerState::Collecting).await;
        let snapshots = self.fetch_all(shutdown).await;

        let published = if shutdown.is_cancelled() {
            log::info!("Crawler stopping; cycle discarded.");
            false
        } else {
            match self.extract_updates(&snapshots).encode() {
                Ok(frame) => {
                    self.hub.publish(frame);
                    true
                }
                Err(e) => {
                    log::error!("Error serializing updates, skipping cycle: {}", e);
                    false
                }
            }
        };

        self.set_state(CrawlerState::Idle).await;
        published
    }

    async fn set_state(&self, next: CrawlerState) {
        let mut state = self.state.write().await;
        if *state != next {
            log::trace!("Crawler state: {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    /// Fetches every service concurrently and keeps whatever arrived before the deadline.
    async fn fetch_all(&self, shutdown: &CancellationToken) -> HashMap<String, Snapshot> {
        let total = self.services.len();
        let mut snapshots = HashMap::with_capacity(total);
        if total == 0 {
            return snapshots;
        }

        let deadline = Instant::now() + self.options.cycle_deadline;
        let cycle = shutdown.child_token();
        let (tx, mut rx) = mpsc::channel::<(String, Result<Snapshot, FetchError>)>(total);

        // --- Phase 1: Fan-out ---
        for service in &self.services {
            let tx = tx.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let token = cycle.clone();
            let name = service.name.clone();
            let endpoint = service.endpoint.clone();

            tokio::spawn(async move {
                let result = tokio::select! {
                    _ = token.cancelled() => Err(FetchError::Cancelled),
                    result = fetcher.fetch(&endpoint) => result,
                };
                // Receiver is gone once the cycle has moved on.
                let _ = tx.send((name, result)).await;
            });
        }
        drop(tx);

        // --- Phase 2: Fan-in under the deadline ---
        let timeout = tokio::time::sleep_until(deadline);
        tokio::pin!(timeout);
        let mut pending = total;

        while pending > 0 {
            tokio::select! {
                _ = &mut timeout => {
                    log::warn!(
                        "Timed out waiting for crawling results: {} of {} services missing.",
                        pending,
                        total
                    );
                    break;
                }
                received = rx.recv() => match received {
                    Some((name, Ok(snapshot))) => {
                        pending -= 1;
                        snapshots.insert(name, snapshot);
                    }
                    Some((name, Err(FetchError::Cancelled))) => {
                        pending -= 1;
                        log::debug!("Crawl of '{}' cancelled.", name);
                    }
                    Some((name, Err(e))) => {
                        pending -= 1;
                        log::warn!("Failed to crawl '{}': {}", name, e);
                    }
                    None => break,
                }
            }
        }

        // --- Phase 3: Stop the stragglers ---
        cycle.cancel();
        snapshots
    }

    /// Computes the envelope for one set of snapshots, in widget declaration order.
    pub fn extract_updates(&self, snapshots: &HashMap<String, Snapshot>) -> UpdateEnvelope {
        let now = self.clock.now_unix();

        let gauges = self
            .widgets
            .gauges()
            .iter()
            .map(|g| GaugeUpdate {
                id: g.id.clone(),
                value: gauge_value(&g.metric, g.max, snapshots.get(&g.service)),
            })
            .collect();

        let line_charts = self
            .widgets
            .line_charts()
            .iter()
            .map(|chart| {
                let series: Vec<&str> = if chart.services.is_empty() {
                    self.services.iter().map(|s| s.name.as_str()).collect()
                } else {
                    chart.services.iter().map(String::as_str).collect()
                };
                LineChartUpdate {
                    id: chart.id.clone(),
                    points: series
                        .into_iter()
                        .map(|name| LinePoint {
                            time: now,
                            y: line_chart_value(&chart.metric, snapshots.get(name)),
                        })
                        .collect(),
                }
            })
            .collect();

        let texts = self
            .widgets
            .texts()
            .iter()
            .map(|t| TextUpdate {
                id: t.id.clone(),
                value: text_value(&t.metric, snapshots.get(&t.service)),
            })
            .collect();

        UpdateEnvelope {
            gauges,
            line_charts,
            texts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::core::hub::{Hub, DEFAULT_QUEUE_CAPACITY};
    use crate::core::metric::Metric;
    use crate::core::registry::{Gauge, LineChart, Text, Widget, WidgetId};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use url::Url;

    const FEB_3_2013: i64 = 1359849600;
    const VARS_1: &str =
        r#"{"gauge": {"metric": 800}, "process": {"text": "text 1"}, "memstats": {"alloc": 123}}"#;
    const VARS_2: &str =
        r#"{"gauge": {"metric": 600}, "process": {"text": "text 2"}, "memstats": {"alloc": 456}}"#;

    enum Mock {
        Vars(&'static str),
        Fail,
        Stall,
    }

    /// Answers by service host; stalled fetches report when they get dropped.
    struct MockFetcher {
        by_host: HashMap<&'static str, Mock>,
        dropped: Arc<Notify>,
        calls: AtomicUsize,
    }

    impl MockFetcher {
        fn new(entries: Vec<(&'static str, Mock)>) -> Self {
            Self {
                by_host: entries.into_iter().collect(),
                dropped: Arc::new(Notify::new()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    struct DropSignal(Arc<Notify>);

    impl Drop for DropSignal {
        fn drop(&mut self) {
            self.0.notify_one();
        }
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn fetch(&self, endpoint: &Url) -> Result<Snapshot, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.by_host.get(endpoint.host_str().unwrap_or_default()) {
                Some(Mock::Vars(raw)) => Snapshot::from_slice(raw.as_bytes()),
                Some(Mock::Stall) => {
                    let _signal = DropSignal(Arc::clone(&self.dropped));
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(FetchError::Parse("unreachable".into()))
                }
                Some(Mock::Fail) | None => Err(FetchError::Status {
                    url: endpoint.to_string(),
                    status: 502,
                }),
            }
        }
    }

    fn services(names: &[&str]) -> Vec<Service> {
        names.iter().map(|n| Service::new(*n, n).unwrap()).collect()
    }

    fn gauge(id: &str, service: &str) -> Widget {
        Widget::Gauge(Gauge {
            id: WidgetId::from(id),
            metric: Metric::new("gauge.metric"),
            service: service.into(),
            max: 1000.0,
        })
    }

    fn chart(id: &str, services: &[&str]) -> Widget {
        Widget::LineChart(LineChart {
            id: WidgetId::from(id),
            metric: Metric::new("memstats.alloc"),
            services: services.iter().map(|s| s.to_string()).collect(),
            show_legend: true,
        })
    }

    fn text(id: &str, service: &str) -> Widget {
        Widget::Text(Text {
            id: WidgetId::from(id),
            metric: Metric::new("process.text"),
            service: service.into(),
        })
    }

    fn registry(widgets: Vec<Widget>) -> Arc<WidgetRegistry> {
        let mut registry = WidgetRegistry::new();
        for w in widgets {
            registry.append(w);
        }
        Arc::new(registry)
    }

    fn crawler(fetcher: Arc<MockFetcher>, names: &[&str], widgets: Vec<Widget>) -> (Crawler, Hub) {
        let (hub, handle) = Hub::new(DEFAULT_QUEUE_CAPACITY);
        let crawler = Crawler::new(
            CrawlerOptions {
                interval: Duration::from_millis(200),
                cycle_deadline: DEFAULT_CYCLE_DEADLINE,
            },
            fetcher,
            handle,
            services(names),
            registry(widgets),
        )
        .with_clock(FixedClock(FEB_3_2013));
        (crawler, hub)
    }

    fn snapshot(raw: &str) -> Snapshot {
        Snapshot::from_slice(raw.as_bytes()).unwrap()
    }

    #[test]
    fn extract_updates_follows_declaration_order() {
        let fetcher = Arc::new(MockFetcher::new(vec![]));
        let (crawler, _hub) = crawler(
            fetcher,
            &["service1", "service2", "service3"],
            vec![
                gauge("g1", "service1"),
                gauge("g2", "service2"),
                gauge("g3", "service3"),
                chart("lc1", &[]),
                chart("lc2", &["service3"]),
                chart("lc3", &["service2"]),
                text("t1", "service1"),
                text("t2", "service2"),
                text("t3", "service3"),
            ],
        );

        let snapshots: HashMap<String, Snapshot> = [
            ("service1".to_string(), snapshot(VARS_1)),
            ("service2".to_string(), snapshot(VARS_2)),
        ]
        .into_iter()
        .collect();

        let updates = crawler.extract_updates(&snapshots);
        let point = |y| LinePoint { time: FEB_3_2013, y };

        assert_eq!(
            updates,
            UpdateEnvelope {
                gauges: vec![
                    GaugeUpdate { id: "g1".into(), value: 0.8 },
                    GaugeUpdate { id: "g2".into(), value: 0.6 },
                    GaugeUpdate { id: "g3".into(), value: 0.0 },
                ],
                line_charts: vec![
                    LineChartUpdate { id: "lc1".into(), points: vec![point(123), point(456), point(0)] },
                    LineChartUpdate { id: "lc2".into(), points: vec![point(0)] },
                    LineChartUpdate { id: "lc3".into(), points: vec![point(456)] },
                ],
                texts: vec![
                    TextUpdate { id: "t1".into(), value: "text 1".into() },
                    TextUpdate { id: "t2".into(), value: "text 2".into() },
                    TextUpdate { id: "t3".into(), value: "N/A".into() },
                ],
            }
        );
    }

    #[tokio::test]
    async fn cycle_publishes_envelope() {
        let fetcher = Arc::new(MockFetcher::new(vec![("service1", Mock::Vars(VARS_1))]));
        let (crawler, hub) = crawler(
            fetcher,
            &["service1"],
            vec![gauge("g1", "service1"), chart("lc1", &[]), text("t1", "service1")],
        );
        let mut sub = crawler.hub.register();
        tokio::spawn(hub.run(CancellationToken::new()));

        assert!(crawler.run_cycle(&CancellationToken::new()).await);
        assert_eq!(
            sub.frames.recv().await.as_deref(),
            Some(r#"{"g":[{"i":"g1","v":0.8}],"lc":[{"i":"lc1","p":[{"time":1359849600,"y":123}]}],"t":[{"i":"t1","v":"text 1"}]}"#)
        );
        assert_eq!(crawler.current_state().await, CrawlerState::Idle);
    }

    #[tokio::test]
    async fn fetch_error_degrades_to_fallbacks() {
        let fetcher = Arc::new(MockFetcher::new(vec![("service1", Mock::Fail)]));
        let (crawler, hub) = crawler(
            fetcher,
            &["service1"],
            vec![gauge("g1", "service1"), chart("lc1", &[]), text("t1", "service1")],
        );
        let mut sub = crawler.hub.register();
        tokio::spawn(hub.run(CancellationToken::new()));

        assert!(crawler.run_cycle(&CancellationToken::new()).await);
        assert_eq!(
            sub.frames.recv().await.as_deref(),
            Some(r#"{"g":[{"i":"g1","v":0.0}],"lc":[{"i":"lc1","p":[{"time":1359849600,"y":0}]}],"t":[{"i":"t1","v":"N/A"}]}"#)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_source_hits_deadline_and_is_cancelled() {
        let fetcher = Arc::new(MockFetcher::new(vec![
            ("service1", Mock::Vars(VARS_1)),
            ("service2", Mock::Stall),
        ]));
        let dropped = Arc::clone(&fetcher.dropped);
        let (crawler, _hub) = crawler(
            fetcher,
            &["service1", "service2"],
            vec![gauge("g1", "service1"), gauge("g2", "service2"), text("t2", "service2")],
        );

        let started = Instant::now();
        let snapshots = crawler.fetch_all(&CancellationToken::new()).await;
        assert!(started.elapsed() >= DEFAULT_CYCLE_DEADLINE);
        assert!(snapshots.contains_key("service1"));
        assert!(!snapshots.contains_key("service2"));

        // the straggler's request future is dropped, not left running
        tokio::time::timeout(Duration::from_secs(1), dropped.notified())
            .await
            .expect("stalled fetch was not cancelled");

        let updates = crawler.extract_updates(&snapshots);
        assert_eq!(updates.gauges[0].value, 0.8);
        assert_eq!(updates.gauges[1].value, 0.0);
        assert_eq!(updates.texts[0].value, "N/A");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_mid_cycle_publishes_nothing() {
        let fetcher = Arc::new(MockFetcher::new(vec![("service1", Mock::Stall)]));
        let (crawler, hub) = crawler(
            fetcher,
            &["service1"],
            vec![gauge("g1", "service1"), text("t1", "service1")],
        );
        let mut sub = crawler.hub.register();
        let hub_shutdown = CancellationToken::new();
        tokio::spawn(hub.run(hub_shutdown.clone()));

        let shutdown = CancellationToken::new();
        let canceller = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                shutdown.cancel();
            })
        };

        assert!(!crawler.run_cycle(&shutdown).await);
        canceller.await.unwrap();
        assert_eq!(crawler.current_state().await, CrawlerState::Idle);

        // Stopping the hub closes the queue; nothing was queued before that.
        hub_shutdown.cancel();
        assert_eq!(sub.frames.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn state_stays_collecting_until_frame_is_handed_off() {
        let fetcher = Arc::new(MockFetcher::new(vec![("service1", Mock::Stall)]));
        let (crawler, hub) = crawler(fetcher, &["service1"], vec![text("t1", "service1")]);
        let mut sub = crawler.hub.register();
        tokio::spawn(hub.run(CancellationToken::new()));

        let crawler = Arc::new(crawler);
        let cycle = {
            let crawler = Arc::clone(&crawler);
            tokio::spawn(async move { crawler.run_cycle(&CancellationToken::new()).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(crawler.current_state().await, CrawlerState::Collecting);

        assert!(cycle.await.unwrap());
        assert_eq!(crawler.current_state().await, CrawlerState::Idle);
        assert_eq!(
            sub.frames.recv().await.as_deref(),
            Some(r#"{"g":[],"lc":[],"t":[{"i":"t1","v":"N/A"}]}"#)
        );
    }

    #[tokio::test]
    async fn no_services_still_publishes() {
        let fetcher = Arc::new(MockFetcher::new(vec![]));
        let (crawler, hub) = crawler(Arc::clone(&fetcher), &[], vec![chart("lc1", &[])]);
        let mut sub = crawler.hub.register();
        tokio::spawn(hub.run(CancellationToken::new()));

        assert!(crawler.run_cycle(&CancellationToken::new()).await);
        assert_eq!(sub.frames.recv().await.as_deref(), Some(r#"{"g":[],"lc":[{"i":"lc1","p":[]}],"t":[]}"#));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_until_shutdown() {
        let fetcher = Arc::new(MockFetcher::new(vec![("service1", Mock::Vars(VARS_1))]));
        let (crawler, hub) = crawler(Arc::clone(&fetcher), &["service1"], vec![text("t1", "service1")]);
        let mut sub = crawler.hub.register();
        let shutdown = CancellationToken::new();
        tokio::spawn(hub.run(shutdown.clone()));

        let crawler = Arc::new(crawler);
        let running = {
            let crawler = Arc::clone(&crawler);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { crawler.run(shutdown).await })
        };

        for _ in 0..3 {
            assert_eq!(
                sub.frames.recv().await.as_deref(),
                Some(r#"{"g":[],"lc":[],"t":[{"i":"t1","v":"text 1"}]}"#)
            );
        }

        shutdown.cancel();
        running.await.unwrap();
        assert!(fetcher.calls.load(Ordering::SeqCst) >= 3);
    }
}
