//! Agent Gambler - Kelly-sized moonshot trading agent

use anyhow::Result;

use agent_gambler::adapters::cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (overrides go here, not in the TOML)
    dotenvy::dotenv().ok();

    let app = cli::init();
    cli::execute(app).await
}
