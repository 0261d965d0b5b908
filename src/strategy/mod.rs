//! Strategy Layer - Market regime classification
//!
//! Indicator math and the classifier that decides whether the market is
//! ranging (recovery mechanisms are safe) or trending (they compound losses).

pub mod regime;

pub use regime::{IndicatorReadings, RegimeClassifier, RegimeConfig};
