pub mod daily_cycle;
pub mod evaluator;
pub mod notifier;
pub mod propagator;
pub mod reconciler;
pub mod tracking;

pub use daily_cycle::{CycleReport, DailyCycle};
pub use evaluator::ThresholdEvaluator;
pub use notifier::{NotificationOutcome, Notifier};
pub use propagator::ChartPropagator;
pub use reconciler::{Observation, Reconciliation, SeriesReconciler};
pub use tracking::{TrackRequest, TrackingService, VariantSelection};
