//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Store: JSON-file and in-memory time-series stores
//! - Market Data: exported bar files and synthetic random-walk bars
//! - CLI: Command-line interface handlers

pub mod cli;
pub mod market_data;
pub mod store;

pub use cli::CliApp;
pub use market_data::{JsonBarsProvider, SyntheticMarketData};
pub use store::{InMemoryStore, JsonFileStore};
