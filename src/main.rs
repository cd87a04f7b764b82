//! Command line interface for the digest bot. A single no-argument invocation
//! collects recent notes from the read relay, summarizes them through the
//! completion API, signs the digest, and publishes it to the write relay.

mod collect;
mod config;
mod error;
mod event;
mod publish;
mod relay;
mod run;
mod summarize;

use std::{fs, path::Path};

use clap::Parser;
use config::Settings;

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "digestr",
    author,
    version,
    about = "Nostr digest bot: summarize recent notes and publish the result"
)]
struct Cli {
    /// Path to the `.env` configuration file.
    #[arg(long, default_value = ".env")]
    env: String,
}

/// Load configuration and perform one full run.
async fn execute(cli: Cli) -> anyhow::Result<()> {
    ensure_env_file(&cli.env)?;
    let cfg = Settings::from_env(&cli.env)?;
    run::run_once(&cfg).await?;
    Ok(())
}

/// Create a default `.env` file if one is not already present at `path`.
fn ensure_env_file(path: &str) -> anyhow::Result<()> {
    let env_path = Path::new(path);
    if env_path.exists() {
        return Ok(());
    }
    if let Some(parent) = env_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut content = String::new();
    content.push_str("MISTRAL_API_KEY=\n");
    content.push_str("APP_SECRET=\n");
    content.push_str(&format!("RELAY_READ={}\n", config::DEFAULT_RELAY_READ));
    content.push_str(&format!("RELAY_WRITE={}\n", config::DEFAULT_RELAY_WRITE));
    content.push_str("PROMPT_MODE=strict\n");
    content.push_str("LOOKBACK_SECS=\n");
    content.push_str("MAX_RETRIES=5\n");
    content.push_str("MODEL=mistral-tiny\n");
    content.push_str("MAX_TOKENS=2000\n");
    content.push_str("COMPLETIONS_URL=\n");
    content.push_str("DRY_RUN=\n");
    content.push_str("TOR_SOCKS=\n");
    fs::write(env_path, content)?;
    Ok(())
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    execute(cli).await
}
