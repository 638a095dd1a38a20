//! Domain models for the Pricey backend.
//!
//! `TrackedVariant` is the single source of truth for price history.
//! `ChartVariant` is a denormalized projection of it kept inside each `Chart`.

pub mod chart;
pub mod variant;

// Re-export all models for convenient access
pub use chart::{Chart, ChartEvaluation, ChartKey, ChartVariant, MemberEvaluation};
pub use variant::{Channel, PriceEvent, PriceSeries, TrackedVariant};
