//! BizOSaaS real-time monitor entry point.

mod app;
mod config;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,bizosaas=debug")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting BizOSaaS real-time monitor"
    );

    let mut config = config::MonitorConfig::load()?;
    config.apply_args(std::env::args().skip(1));
    tracing::info!(
        tenant = %config.tenant_id,
        user = %config.user_id,
        types = ?config.message_types,
        endpoint = %config.realtime.endpoint,
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("monitor shut down cleanly");
    Ok(())
}
