use crate::clients::{chart_caption, ChartRenderer, FetchError, Messenger, PriceFetcher};
use crate::config::PipelineConfig;
use crate::error::{AppError, AppResult};
use crate::models::{Chart, TrackedVariant};
use crate::repositories::{ChartStore, VariantStore};
use crate::services::evaluator::ThresholdEvaluator;
use crate::services::notifier::{NotificationOutcome, Notifier};
use crate::services::propagator::ChartPropagator;
use crate::services::reconciler::{Observation, SeriesReconciler};
use chrono::{NaiveDateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Tally of one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub variants_seen: usize,
    pub variants_changed: usize,
    pub variants_unobserved: usize,
    pub variants_skipped: usize,
    pub snapshots_propagated: usize,
    pub charts_seen: usize,
    pub charts_evaluated: usize,
    pub charts_breached: usize,
    pub charts_refreshed: usize,
    pub refresh_failures: usize,
    pub charts_notified: usize,
    pub alerts_sent: usize,
    pub alerts_failed: usize,
}

#[derive(Debug)]
enum VariantOutcome {
    Reconciled {
        observed: bool,
        changed: bool,
        charts: usize,
    },
    Skipped,
}

#[derive(Debug)]
enum ChartOutcome {
    Evaluated {
        breached: bool,
        refreshed: bool,
        notification: NotificationOutcome,
    },
    Skipped,
}

impl CycleReport {
    fn record_variant(&mut self, outcome: &VariantOutcome) {
        match outcome {
            VariantOutcome::Reconciled {
                observed,
                changed,
                charts,
            } => {
                if !observed {
                    self.variants_unobserved += 1;
                }
                if *changed {
                    self.variants_changed += 1;
                }
                self.snapshots_propagated += charts;
            }
            VariantOutcome::Skipped => self.variants_skipped += 1,
        }
    }

    fn record_chart(&mut self, outcome: &ChartOutcome) {
        if let ChartOutcome::Evaluated {
            breached,
            refreshed,
            notification,
        } = outcome
        {
            self.charts_evaluated += 1;
            if *breached {
                self.charts_breached += 1;
            }
            if *refreshed {
                self.charts_refreshed += 1;
            } else {
                self.refresh_failures += 1;
            }
            if matches!(notification, NotificationOutcome::Delivered { .. }) {
                self.charts_notified += 1;
            }
            self.alerts_sent += notification.alerts_sent();
            self.alerts_failed += notification.alerts_failed();
        }
    }
}

/// Keep going past a per-item failure; hand back only store unavailability.
fn contain<T>(result: AppResult<T>, context: &str) -> AppResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!("{}: {}", context, e);
            Ok(None)
        }
    }
}

/// One polling cycle: reconcile and propagate every variant, then evaluate, redraw and
/// notify every chart.
pub struct DailyCycle {
    variant_store: Arc<dyn VariantStore>,
    chart_store: Arc<dyn ChartStore>,
    fetcher: Arc<dyn PriceFetcher>,
    renderer: Arc<dyn ChartRenderer>,
    messenger: Arc<dyn Messenger>,
    reconciler: SeriesReconciler,
    propagator: ChartPropagator,
    evaluator: ThresholdEvaluator,
    notifier: Notifier,
    fetch_timeout: Duration,
    concurrency: usize,
}

impl DailyCycle {
    pub fn new(
        variant_store: Arc<dyn VariantStore>,
        chart_store: Arc<dyn ChartStore>,
        fetcher: Arc<dyn PriceFetcher>,
        renderer: Arc<dyn ChartRenderer>,
        messenger: Arc<dyn Messenger>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            reconciler: SeriesReconciler::new(config.price_epsilon),
            propagator: ChartPropagator::new(chart_store.clone()),
            evaluator: ThresholdEvaluator::new(),
            notifier: Notifier::new(
                chart_store.clone(),
                messenger.clone(),
                config.notification_cap,
            ),
            variant_store,
            chart_store,
            fetcher,
            renderer,
            messenger,
            fetch_timeout: config.fetch_timeout(),
            concurrency: config.concurrency.max(1),
        }
    }

    /// Run a cycle on every tick of `interval`, forever. Failed cycles are logged.
    pub async fn start(self, interval: Duration) {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        info!("Daily cycle started, running every {:?}", interval);

        loop {
            ticker.tick().await;

            if let Err(e) = self.run(Utc::now().naive_utc()).await {
                error!("Cycle aborted: {}", e);
            }
        }
    }

    /// Run one cycle as of `now`.
    pub async fn run(&self, now: NaiveDateTime) -> AppResult<CycleReport> {
        let cycle_id = Uuid::new_v4();
        self.run_cycle(now)
            .instrument(info_span!("cycle", %cycle_id))
            .await
    }

    async fn run_cycle(&self, now: NaiveDateTime) -> AppResult<CycleReport> {
        let started = Instant::now();
        let mut report = CycleReport::default();

        let variants = self.variant_store.list_all().await?;
        report.variants_seen = variants.len();
        info!(variants = variants.len(), date = %now.date(), "Cycle started");

        let outcomes: Vec<VariantOutcome> = stream::iter(variants)
            .map(|variant| self.process_variant(variant, now))
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;
        for outcome in &outcomes {
            report.record_variant(outcome);
        }

        let charts = self.chart_store.list_all().await?;
        report.charts_seen = charts.len();

        let outcomes: Vec<ChartOutcome> = stream::iter(charts)
            .map(|chart| self.process_chart(chart, now))
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;
        for outcome in &outcomes {
            report.record_chart(outcome);
        }

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            report = ?report,
            "Cycle finished"
        );
        Ok(report)
    }

    async fn observe(&self, variant: &TrackedVariant) -> Observation {
        let result = match time::timeout(self.fetch_timeout, self.fetcher.fetch(variant)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.fetch_timeout)),
        };

        match result {
            Ok(quote) => Observation::Found(quote),
            Err(e) => {
                warn!(variant_id = %variant.variant_id, "Price lookup failed: {}", e);
                Observation::Missing(e.to_string())
            }
        }
    }

    /// Fetch, reconcile, store, then propagate one variant.
    async fn process_variant(
        &self,
        variant: TrackedVariant,
        now: NaiveDateTime,
    ) -> AppResult<VariantOutcome> {
        if let Err(e) = variant.channel_enum() {
            warn!(variant_id = %variant.variant_id, "Skipping variant: {}", e);
            return Ok(VariantOutcome::Skipped);
        }

        let observation = self.observe(&variant).await;
        let observed = matches!(observation, Observation::Found(_));
        let reconciliation = self.reconciler.reconcile(&variant, &observation, now);
        for anomaly in &reconciliation.anomalies {
            warn!(variant_id = %variant.variant_id, "Malformed price history: {}", anomaly);
        }
        if reconciliation.price_changed {
            info!(
                variant_id = %variant.variant_id,
                from = %reconciliation.previous_price,
                to = %reconciliation.variant.current_price,
                "Price changed"
            );
        }

        let stored = self
            .variant_store
            .upsert(&reconciliation.variant)
            .await
            .map_err(AppError::from);
        let stored = match contain(stored, "Failed to store variant")? {
            Some(stored) => stored,
            None => return Ok(VariantOutcome::Skipped),
        };

        let touched = contain(
            self.propagator.propagate(&stored).await,
            "Failed to propagate variant",
        )?
        .map(|keys| keys.len())
        .unwrap_or(0);

        Ok(VariantOutcome::Reconciled {
            observed,
            changed: reconciliation.price_changed,
            charts: touched,
        })
    }

    /// Redraw a chart from its mirrored series and replace its message. Failures are
    /// logged and reported as `false`.
    async fn refresh(&self, chart: &Chart, now: NaiveDateTime) -> bool {
        let key = chart.key();
        let rendered = match self.renderer.render(chart).await {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(chart = %key, "Failed to render chart: {}", e);
                return false;
            }
        };

        let caption = chart_caption(now.date());
        match self
            .messenger
            .update_chart(&chart.chat_id, &chart.chart_id, &rendered, &caption)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(chart = %key, "Failed to update chart message: {}", e);
                false
            }
        }
    }

    /// Evaluate, store, redraw, then notify one chart.
    async fn process_chart(&self, chart: Chart, now: NaiveDateTime) -> AppResult<ChartOutcome> {
        let key = chart.key();
        let evaluation = self.evaluator.evaluate(&chart);

        let saved = self
            .chart_store
            .save_evaluation(&key, &evaluation, now)
            .await
            .map_err(AppError::from);
        let updated = match contain(saved, "Failed to store evaluation")? {
            Some(updated) => updated,
            None => return Ok(ChartOutcome::Skipped),
        };

        let refreshed = self.refresh(&updated, now).await;

        let notification = contain(
            self.notifier.notify(&updated, now).await,
            "Failed to notify chart",
        )?
        .unwrap_or(NotificationOutcome::Ineligible);

        Ok(ChartOutcome::Evaluated {
            breached: updated.threshold_hit,
            refreshed,
            notification,
        })
    }
}
