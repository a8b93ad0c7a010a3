//! 功率桥接进程：从所选数据源读取实时功率并推送到显示屏。

mod factory;

use bridge_config::{BridgeConfig, SourceKind};
use bridge_pipeline::run_bridge;
use bridge_telemetry::init_tracing;
use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 本地配置文件（令牌、主机、显示屏密钥）。
const ENV_FILE: &str = "lametric-power-bridge.env";

#[derive(Debug, Parser)]
#[command(name = "power-bridge", version, about = "Bridges live power readings to a LaMetric display")]
struct Cli {
    /// 数据源：tibber、homewizard-p1、homewizard-v2、p1-serial
    #[arg(long, env = "BRIDGE_SOURCE")]
    source: Option<SourceKind>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // 配置文件不存在时忽略
    dotenvy::from_filename(ENV_FILE).ok();
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "bridge stopped");
            ExitCode::FAILURE
        }
    };
    let snapshot = bridge_telemetry::metrics().snapshot();
    info!(
        readings_produced = snapshot.readings_produced,
        readings_skipped = snapshot.readings_skipped,
        sink_push_success = snapshot.sink_push_success,
        sink_push_failure = snapshot.sink_push_failure,
        stale_alerts = snapshot.stale_alerts,
        telegram_crc_failures = snapshot.telegram_crc_failures,
        reconnects = snapshot.reconnects,
        rediscoveries = snapshot.rediscoveries,
        "metrics_at_shutdown"
    );
    code
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = BridgeConfig::from_env()?;
    if let Some(source) = cli.source {
        config.source = source;
    }
    info!(source = %config.source, "using source");

    let sink = factory::build_sink(&config)?;
    let mut source = factory::build_source(&config);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown.cancel();
        }
    });

    run_bridge(
        source.as_mut(),
        &sink,
        &factory::pipeline_config(&config),
        cancel,
    )
    .await?;
    Ok(())
}
