use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use portfolio_console::http::Console;
use portfolio_console::registry::HttpUpstream;
use portfolio_console::Config;

#[derive(Parser)]
struct Cli {
    #[arg(short, long)]
    config_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .compact()
        .init();

    // load configuration
    let config = Config::from_file(&cli.config_file.unwrap_or("./dev-config.yml".into()))?;
    tracing::info!(
        registry = %config.registry.host,
        max_concurrent_requests = config.registry.max_concurrent_requests,
        "loaded configuration"
    );

    // upstream transport
    let upstream = HttpUpstream::new(&config.registry)?;

    let listen = config.listen;
    let console = Console::new(Arc::new(upstream), config);
    let router = match console.router() {
        Err(e) => return Err(e.into()),
        Ok(r) => r,
    };

    // run HTTP server
    tracing::info!(%listen, "serving console api");
    axum::Server::bind(&listen)
        .serve(router.into_make_service())
        .await?;

    Ok(())
}
