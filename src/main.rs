use mimalloc::MiMalloc;
use ping_org_sync::app::lifecycle::context::StartupContext;
use ping_org_sync::app::lifecycle::shutdown::build_shutdown_pipeline;
use ping_org_sync::app::lifecycle::startup::build_start_pipeline;
use std::path::PathBuf;
use tracing::info;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const DEFAULT_CONFIG_PATH: &str = "org-sync.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let cfg_path: PathBuf = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
        .into();

    let startup_pipeline = build_start_pipeline(cfg_path);
    let startup_ctx = StartupContext::default();

    startup_pipeline.run(&startup_ctx).await?;
    info!("Startup successful");

    let shutdown_pipeline = build_shutdown_pipeline();

    tokio::signal::ctrl_c().await?;

    shutdown_pipeline.run(&startup_ctx).await?;
    println!("Shutdown successful");

    Ok(())
}
