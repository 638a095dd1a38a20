use crate::clients::PriceQuote;
use crate::models::variant::round_price;
use crate::models::{PriceEvent, PriceSeries, TrackedVariant};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

/// What the marketplace said about a variant this cycle
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Found(PriceQuote),
    /// Lookup failed; carries the reason for logging
    Missing(String),
}

/// Result of reconciling one variant
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub variant: TrackedVariant,
    pub previous_price: Decimal,
    pub price_changed: bool,
    /// Problems found in the stored history while rebuilding the series
    pub anomalies: Vec<String>,
}

/// Turns a sparse list of price-change events into a dense daily series
#[derive(Debug, Clone)]
pub struct SeriesReconciler {
    epsilon: Decimal,
}

impl SeriesReconciler {
    pub fn new(epsilon: Decimal) -> Self {
        Self { epsilon }
    }

    /// Fold one observation into a variant and rebuild its series from scratch.
    ///
    /// A missing observation only bumps `last_updated_time`; price, stock, events and
    /// series stay exactly as stored. An observation dated before the latest event is
    /// reported as an anomaly and leaves the variant untouched.
    pub fn reconcile(
        &self,
        variant: &TrackedVariant,
        observation: &Observation,
        now: NaiveDateTime,
    ) -> Reconciliation {
        let previous_price = variant.current_price;
        if let Some(latest) = variant.price_history.last().map(PriceEvent::day) {
            if now.date() < latest {
                return Reconciliation {
                    variant: variant.clone(),
                    previous_price,
                    price_changed: false,
                    anomalies: vec![format!(
                        "cycle date {} precedes latest event {}; observation ignored",
                        now.date(),
                        latest
                    )],
                };
            }
        }

        let mut next = variant.clone();
        next.last_updated_time = now;

        let quote = match observation {
            Observation::Found(quote) => quote,
            Observation::Missing(_) => {
                return Reconciliation {
                    variant: next,
                    previous_price,
                    price_changed: false,
                    anomalies: Vec::new(),
                };
            }
        };

        let observed = round_price(quote.price);
        let price_changed = (observed - previous_price).abs() > self.epsilon;
        if price_changed {
            record_change(&mut next.price_history, now, observed);
            next.current_price = observed;
        }
        next.stock = quote.stock;

        let (series, anomalies) = rebuild_series(
            next.created_time,
            next.created_price,
            next.current_price,
            &next.price_history,
            now.date(),
        );
        next.lowest_price = series.lowest_price().unwrap_or(next.current_price);
        next.series = series;

        Reconciliation {
            variant: next,
            previous_price,
            price_changed,
            anomalies,
        }
    }
}

/// Append a change event, keeping at most one event per calendar day.
/// `now` must not fall before the last event's day.
fn record_change(history: &mut Vec<PriceEvent>, now: NaiveDateTime, price: Decimal) {
    match history.last_mut() {
        Some(last) if last.day() == now.date() => {
            last.date = now;
            last.price = price;
        }
        _ => history.push(PriceEvent::new(now, price)),
    }
}

/// Rebuild the dense series covering every day from creation to `today` inclusive.
///
/// Each day carries the price of the latest event on or before it, or the creation price
/// before the first event. Only the longest chronologically valid prefix of `events` is
/// used. The last entry always equals `current_price`.
pub fn rebuild_series(
    created_time: NaiveDateTime,
    created_price: Decimal,
    current_price: Decimal,
    events: &[PriceEvent],
    today: NaiveDate,
) -> (PriceSeries, Vec<String>) {
    let mut anomalies = Vec::new();
    let start = created_time.date();
    let end = if today < start {
        anomalies.push(format!("cycle date {} precedes creation date {}", today, start));
        start
    } else {
        today
    };

    if events.is_empty() {
        anomalies.push("price history is empty".to_string());
    }

    let mut valid_len = 0;
    for (i, event) in events.iter().enumerate() {
        if event.day() > end {
            anomalies.push(format!(
                "event {} dated {} is after {}; ignoring it and everything after",
                i,
                event.day(),
                end
            ));
            break;
        }
        if i > 0 && event.day() <= events[i - 1].day() {
            anomalies.push(format!(
                "event {} dated {} does not follow {}; ignoring it and everything after",
                i,
                event.day(),
                events[i - 1].day()
            ));
            break;
        }
        valid_len = i + 1;
    }
    let valid = &events[..valid_len];

    let mut series = PriceSeries::default();
    let mut price = created_price;
    let mut next_event = 0;
    let mut day = start;
    loop {
        while next_event < valid.len() && valid[next_event].day() <= day {
            price = valid[next_event].price;
            next_event += 1;
        }
        series.dates.push(day);
        series.prices.push(price);

        if day >= end {
            break;
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }

    if let Some(last) = series.prices.last_mut() {
        if *last != current_price {
            anomalies.push(format!(
                "history ends at {} but current price is {}",
                last, current_price
            ));
            *last = current_price;
        }
    }

    (series, anomalies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Channel;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    fn tracked(price: Decimal, created: NaiveDateTime) -> TrackedVariant {
        TrackedVariant::new(
            "555".to_string(),
            "Large".to_string(),
            "1001".to_string(),
            "Air Fryer".to_string(),
            "77".to_string(),
            Channel::Shopee,
            Some("SGD".to_string()),
            price,
            10,
            created,
        )
    }

    fn found(price: Decimal, stock: i32) -> Observation {
        Observation::Found(PriceQuote { price, stock })
    }

    fn reconciler() -> SeriesReconciler {
        SeriesReconciler::new(dec!(0.01))
    }

    #[test]
    fn test_drop_on_day_three_fills_forward() {
        let variant = tracked(dec!(100.00), day(1));
        let day3 = reconciler().reconcile(&variant, &found(dec!(80.00), 9), day(4));
        assert!(day3.price_changed);

        let day5 = reconciler().reconcile(&day3.variant, &found(dec!(80.00), 8), day(6));
        assert!(!day5.price_changed);
        assert!(day5.anomalies.is_empty());

        let series = &day5.variant.series;
        assert_eq!(series.dates.first(), Some(&day(1).date()));
        assert_eq!(series.dates.last(), Some(&day(6).date()));
        assert_eq!(
            series.prices,
            vec![dec!(100), dec!(100), dec!(100), dec!(80), dec!(80), dec!(80)]
        );
        assert_eq!(day5.variant.current_price, dec!(80.00));
        assert_eq!(day5.variant.lowest_price, dec!(80.00));
        assert_eq!(day5.variant.stock, 8);
        assert_eq!(day5.variant.price_history.len(), 2);
    }

    #[test]
    fn test_series_is_dense_and_ends_at_current_price() {
        let mut variant = tracked(dec!(50.00), day(1));
        for (d, p) in [(3, dec!(45.00)), (4, dec!(47.50)), (9, dec!(39.90))] {
            variant = reconciler().reconcile(&variant, &found(p, 1), day(d)).variant;
        }
        let result = reconciler().reconcile(&variant, &found(dec!(39.90), 1), day(12));

        let series = &result.variant.series;
        assert!(series.is_dense());
        assert_eq!(series.len(), 12);
        assert_eq!(series.last_price(), Some(result.variant.current_price));
        assert_eq!(series.prices[1], dec!(50.00));
        assert_eq!(series.prices[3], dec!(47.50));
        assert_eq!(series.prices[7], dec!(47.50));
        assert_eq!(series.prices[8], dec!(39.90));
    }

    #[test]
    fn test_reconcile_twice_is_idempotent() {
        let variant = tracked(dec!(20.00), day(1));
        let first = reconciler().reconcile(&variant, &found(dec!(18.00), 4), day(5));
        let second = reconciler().reconcile(&first.variant, &found(dec!(18.00), 4), day(5));

        assert!(!second.price_changed);
        assert_eq!(first.variant, second.variant);
        assert_eq!(second.variant.price_history.len(), 2);
    }

    #[test]
    fn test_change_within_epsilon_is_ignored() {
        let variant = tracked(dec!(20.00), day(1));
        let result = reconciler().reconcile(&variant, &found(dec!(20.01), 4), day(2));
        assert!(!result.price_changed);
        assert_eq!(result.variant.current_price, dec!(20.00));
        assert_eq!(result.variant.price_history.len(), 1);
    }

    #[test]
    fn test_same_day_change_replaces_event() {
        let variant = tracked(dec!(20.00), day(1));
        let morning = reconciler().reconcile(&variant, &found(dec!(18.00), 4), day(3));
        let evening = reconciler().reconcile(&morning.variant, &found(dec!(17.00), 4), day(3));

        assert!(evening.price_changed);
        assert_eq!(evening.variant.price_history.len(), 2);
        assert_eq!(evening.variant.price_history[1].price, dec!(17.00));
        assert_eq!(evening.variant.series.prices.last(), Some(&dec!(17.00)));
    }

    #[test]
    fn test_missing_observation_only_touches_timestamp() {
        let variant = reconciler()
            .reconcile(&tracked(dec!(30.00), day(1)), &found(dec!(25.00), 2), day(2))
            .variant;
        let missing = Observation::Missing("delisted".into());
        let result = reconciler().reconcile(&variant, &missing, day(6));

        assert!(!result.price_changed);
        assert_eq!(result.variant.last_updated_time, day(6));
        assert_eq!(result.variant.current_price, variant.current_price);
        assert_eq!(result.variant.series, variant.series);
        assert_eq!(result.variant.stock, variant.stock);
        assert_eq!(result.variant.price_history, variant.price_history);
    }

    #[test]
    fn test_backdated_cycle_keeps_history_in_order() {
        let variant = tracked(dec!(100.00), day(1));
        let day5 = reconciler().reconcile(&variant, &found(dec!(80.00), 9), day(5));
        let day4 = reconciler().reconcile(&day5.variant, &found(dec!(70.00), 3), day(4));

        assert!(!day4.price_changed);
        assert_eq!(day4.anomalies.len(), 1);
        assert_eq!(day4.variant, day5.variant);
        assert_eq!(day4.variant.current_price, dec!(80.00));

        let days: Vec<NaiveDate> = day4.variant.price_history.iter().map(PriceEvent::day).collect();
        assert_eq!(days, vec![day(1).date(), day(5).date()]);

        // The next regular cycle still sees a clean history
        let day6 = reconciler().reconcile(&day4.variant, &found(dec!(70.00), 3), day(6));
        assert!(day6.price_changed);
        assert!(day6.anomalies.is_empty());
        assert_eq!(day6.variant.series.last_price(), Some(dec!(70.00)));
    }

    #[test]
    fn test_out_of_order_history_uses_valid_prefix() {
        let events = vec![
            PriceEvent::new(day(1), dec!(10.00)),
            PriceEvent::new(day(3), dec!(8.00)),
            PriceEvent::new(day(2), dec!(9.00)),
        ];
        let (series, anomalies) =
            rebuild_series(day(1), dec!(10.00), dec!(8.00), &events, day(5).date());

        assert_eq!(anomalies.len(), 1);
        assert!(series.is_dense());
        assert_eq!(
            series.prices,
            vec![dec!(10.00), dec!(10.00), dec!(8.00), dec!(8.00), dec!(8.00)]
        );
    }

    #[test]
    fn test_empty_history_falls_back_to_prices_on_record() {
        let (series, anomalies) =
            rebuild_series(day(1), dec!(12.00), dec!(11.00), &[], day(3).date());

        assert!(!anomalies.is_empty());
        assert_eq!(series.prices, vec![dec!(12.00), dec!(12.00), dec!(11.00)]);
    }

    #[test]
    fn test_cycle_before_creation_yields_single_day() {
        let events = vec![PriceEvent::new(day(5), dec!(10.00))];
        let (series, anomalies) =
            rebuild_series(day(5), dec!(10.00), dec!(10.00), &events, day(4).date());

        assert_eq!(anomalies.len(), 1);
        assert_eq!(series.dates, vec![day(5).date()]);
        assert_eq!(series.prices, vec![dec!(10.00)]);
    }
}
