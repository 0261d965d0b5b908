//! Regime Sentinel - diagnostic monitor for a recovery-based trading agent

use anyhow::Result;

use regime_sentinel::adapters::cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (overrides for paths and RUST_LOG)
    dotenvy::dotenv().ok();

    let app = cli::init();
    cli::execute(app).await
}
