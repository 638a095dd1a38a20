use crate::models::{Chart, ChartEvaluation, ChartVariant, MemberEvaluation};
use rust_decimal::{Decimal, RoundingStrategy};

/// Recomputes percentage change and breach flags for a chart.
/// Pure: never touches the store or the notification counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdEvaluator;

impl ThresholdEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, chart: &Chart) -> ChartEvaluation {
        let members: Vec<MemberEvaluation> = chart
            .variants
            .iter()
            .map(|member| evaluate_member(member, chart.threshold))
            .collect();
        let threshold_hit = members.iter().any(|m| m.threshold_hit);

        ChartEvaluation {
            members,
            threshold_hit,
        }
    }
}

fn evaluate_member(member: &ChartVariant, threshold: i32) -> MemberEvaluation {
    let price_change = member.current_price - member.created_price;
    let price_change_percent = percent_change(member.created_price, member.current_price);

    MemberEvaluation {
        variant_id: member.variant_id.clone(),
        price_change,
        price_change_percent,
        threshold_hit: is_breach(price_change_percent, threshold),
    }
}

/// Exact percentage change from `baseline`; zero when there is no usable baseline.
pub fn percent_change(baseline: Decimal, current: Decimal) -> Decimal {
    if baseline <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (current - baseline) / baseline * Decimal::ONE_HUNDRED
}

/// A drop below the threshold, except a full -100% which is a delisting artifact.
pub fn is_breach(percent: Decimal, threshold: i32) -> bool {
    percent < Decimal::ZERO
        && percent < Decimal::from(threshold)
        && percent != Decimal::from(-100)
}

/// Signed, one-decimal rendering used in alerts, e.g. `-20.0%` or `+3.5%`.
pub fn display_percent(percent: Decimal) -> String {
    let rounded = percent.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_zero() {
        "0.0%".to_string()
    } else if rounded > Decimal::ZERO {
        format!("+{:.1}%", rounded)
    } else {
        format!("{:.1}%", rounded)
    }
}
