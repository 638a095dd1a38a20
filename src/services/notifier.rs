use crate::clients::Messenger;
use crate::error::AppResult;
use crate::models::{Chart, ChartKey, ChartVariant};
use crate::repositories::ChartStore;
use crate::services::evaluator::display_percent;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// What one `notify` call did for a chart
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// Not breaching, cap reached, or already notified on this date
    Ineligible,
    /// Aggregate flag set but no member flagged
    NothingToSend,
    /// Another invocation in this process is sending for the chart
    InFlight,
    /// Every alert failed; the counter is untouched
    DeliveryFailed { failed: usize },
    /// Alerts went out and the counter was committed
    Delivered {
        sent: usize,
        failed: usize,
        notification_count: i32,
    },
    /// Alerts went out but another invocation committed the counter first
    Superseded { sent: usize },
}

impl NotificationOutcome {
    pub fn alerts_sent(&self) -> usize {
        match self {
            NotificationOutcome::Delivered { sent, .. }
            | NotificationOutcome::Superseded { sent } => *sent,
            _ => 0,
        }
    }

    pub fn alerts_failed(&self) -> usize {
        match self {
            NotificationOutcome::Delivered { failed, .. }
            | NotificationOutcome::DeliveryFailed { failed } => *failed,
            _ => 0,
        }
    }
}

/// Whether a chart may be notified on `today`.
pub fn is_eligible(chart: &Chart, cap: i32, today: NaiveDate) -> bool {
    chart.threshold_hit
        && chart.notification_count < cap
        && chart.last_notified_time.map(|t| t.date()) != Some(today)
}

/// Escape the characters Telegram's legacy Markdown treats as markup.
fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Alert text for one breaching member.
pub fn compose_alert(chart: &Chart, member: &ChartVariant) -> String {
    format!(
        "*{}*\n{} ({})\nNow {:.2}, {} since tracking began\n{}",
        escape_markdown(chart.display_name()),
        escape_markdown(&member.item_name),
        escape_markdown(&member.variant_name),
        member.current_price,
        display_percent(member.price_change_percent),
        member.item_url,
    )
}

/// Releases a chart's in-flight claim when dropped
struct Claim<'a> {
    in_flight: &'a Mutex<HashSet<ChartKey>>,
    key: ChartKey,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(&self.key);
        }
    }
}

/// Sends threshold alerts and commits the per-chart notification counter
pub struct Notifier {
    chart_store: Arc<dyn ChartStore>,
    messenger: Arc<dyn Messenger>,
    cap: i32,
    in_flight: Mutex<HashSet<ChartKey>>,
}

impl Notifier {
    pub fn new(chart_store: Arc<dyn ChartStore>, messenger: Arc<dyn Messenger>, cap: i32) -> Self {
        Self {
            chart_store,
            messenger,
            cap,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    fn claim(&self, key: &ChartKey) -> Option<Claim<'_>> {
        let mut set = match self.in_flight.lock() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !set.insert(key.clone()) {
            return None;
        }
        Some(Claim {
            in_flight: &self.in_flight,
            key: key.clone(),
        })
    }

    /// Alert the owning chat about every breaching member, then bump the counter once.
    ///
    /// `chart` should be the copy just written by evaluation. The counter only moves when
    /// at least one alert was delivered.
    pub async fn notify(
        &self,
        chart: &Chart,
        now: NaiveDateTime,
    ) -> AppResult<NotificationOutcome> {
        let key = chart.key();

        if !is_eligible(chart, self.cap, now.date()) {
            debug!(
                chart = %key,
                count = chart.notification_count,
                "Chart not eligible for notification"
            );
            return Ok(NotificationOutcome::Ineligible);
        }

        let breaching: Vec<&ChartVariant> =
            chart.variants.iter().filter(|m| m.threshold_hit).collect();
        if breaching.is_empty() {
            warn!(chart = %key, "Chart flagged as breaching but no member is; skipping");
            return Ok(NotificationOutcome::NothingToSend);
        }

        let _claim = match self.claim(&key) {
            Some(claim) => claim,
            None => {
                debug!(chart = %key, "Notification already in flight");
                return Ok(NotificationOutcome::InFlight);
            }
        };

        let mut sent = 0;
        let mut failed = 0;
        for member in breaching {
            let text = compose_alert(chart, member);
            match self.messenger.send(&chart.chat_id, &text).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    failed += 1;
                    warn!(
                        chat_id = %chart.chat_id,
                        chart_id = %chart.chart_id,
                        variant_id = %member.variant_id,
                        "Failed to deliver alert: {}",
                        e
                    );
                }
            }
        }

        if sent == 0 {
            warn!(chart = %key, failed, "No alert delivered; will retry");
            return Ok(NotificationOutcome::DeliveryFailed { failed });
        }

        match self
            .chart_store
            .increment_notification_count(&key, chart.notification_count, now)
            .await?
        {
            Some(notification_count) => {
                info!(chart = %key, sent, failed, notification_count, "Chart notified");
                Ok(NotificationOutcome::Delivered {
                    sent,
                    failed,
                    notification_count,
                })
            }
            None => {
                warn!(chart = %key, sent, "Notification counter moved underneath us");
                Ok(NotificationOutcome::Superseded { sent })
            }
        }
    }
}
