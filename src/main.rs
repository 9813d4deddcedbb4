use clap::Parser;

use dispatcher::config::{Args, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    // Load .env file if present (silently ignored if missing)
    dotenvy::dotenv().ok();

    let config = Config::from(Args::parse());
    tracing::info!(
        infile = %config.infile.display(),
        outfile = %config.outfile.display(),
        "dispatcher starting"
    );

    dispatcher::server::run(&config).await?;

    tracing::info!("all work persisted, dispatcher shutting down");
    Ok(())
}
