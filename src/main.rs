use std::net::SocketAddr;

use anyhow::Context;
use log::info;
use log::LevelFilter;
use shape_sketch::commands;
use shape_sketch::config::ServerConfig;
use shape_sketch::state::AppState;

#[cfg(debug_assertions)]
const LOG_LEVEL: LevelFilter = LevelFilter::Debug;
#[cfg(not(debug_assertions))]
const LOG_LEVEL: LevelFilter = LevelFilter::Info;


#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG, when set, takes precedence over the build's default level.
    pretty_env_logger::formatted_timed_builder()
        .filter_level(LOG_LEVEL)
        .parse_default_env()
        .init();

    let config = ServerConfig::from_env()?;

    config.data.ensure_buckets()
        .with_context(|| format!("Failed to create buckets under {:?}", config.data.base_dir))?;
    info!("Storing drawings under {:?}", config.data.base_dir);
    match config.data.canvas {
        Some((width, height)) => info!("Accepting {}x{} drawings", width, height),
        None => info!("Accepting drawings of any size"),
    }

    let app = commands::router(AppState::new(&config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
