// UniSkor - Web Server
// Read-only JSON API over data/data.json

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use uniskor::{api, logging, Config};

#[derive(Parser)]
#[command(name = "uniskor-server", version, about = "UniSkor read API")]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "UNISKOR_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `server.bind`
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    logging::init(&config.logging);

    println!("🌐 UniSkor API");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if !config.output.dataset.exists() {
        eprintln!("⚠️  No dataset at {}", config.output.dataset.display());
        eprintln!("   Run: uniskor update");
        eprintln!("   Data endpoints answer 404 until it exists.");
    }

    let app = api::app(&config);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind))?;

    info!(bind = %config.server.bind, dataset = %config.output.dataset.display(), "server listening");
    println!("\n🚀 Server running on http://{}", config.server.bind);
    println!("   API:  http://{}/api/data/", config.server.bind);
    println!("   Data: http://{}/data/", config.server.bind);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Server stopped unexpectedly")?;
    Ok(())
}
