//! Market data adapters

pub mod json_bars;
pub mod synthetic;

pub use json_bars::JsonBarsProvider;
pub use synthetic::SyntheticMarketData;
