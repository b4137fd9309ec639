use rmcp::{ServiceExt, transport::stdio};

use atemate::config::Config;
use atemate::server::AtemateServer;

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

    // MCP clients may start the server from any CWD: prefer the .env next to
    // the binary, then dotenvy's default search.
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(".env")))
        .filter(|path| path.exists());
    match beside_exe {
        Some(path) => {
            dotenvy::from_path(&path).ok();
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    tracing::info!("atemate starting");

    let config = Config::load()?;
    let server = AtemateServer::new(config)?;
    let shutdown = server.shutdown_token();

    let service = server
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("serving error: {e:?}"))?;

    service.waiting().await?;
    shutdown.cancel();

    tracing::info!("atemate shutting down");
    Ok(())
}
