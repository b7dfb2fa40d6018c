use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use axetune_rs::config::{self, Args, Config};
use axetune_rs::device::BitaxeClient;
use axetune_rs::runner::{RunController, SessionOptions, ShutdownToken};
use axetune_rs::tuning::{AdjustmentStrategy, OperatingPoint, OperatingPointTable};

#[tokio::main]
async fn main() {
    // 初始化日志系统
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    // 解析命令行参数
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    // 加载配置（可选 TOML 覆盖阈值与时间参数）
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    args.validate(&config)?;
    let base_url = config::validate_ip(&args.ip_address)?;

    info!("🚀 Starting AxeTune-RS v{}", env!("CARGO_PKG_VERSION"));
    info!("Device address: {}", base_url);

    // 提供工作点表则走表驱动模式，否则为线性扫描
    let strategy = match &args.values {
        Some(path) => {
            let table = OperatingPointTable::load(path)?;
            info!(
                "Loaded {} voltage-frequency pairs from {}",
                table.len(),
                path.display()
            );
            AdjustmentStrategy::table(table, &config)
        }
        None => AdjustmentStrategy::sweep(&config),
    };

    let client = BitaxeClient::new(base_url, &config)?;

    // 设置协作式停止令牌
    let shutdown = ShutdownToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Stopping status logger...");
            token.trigger();
        }
    });

    let opts = SessionOptions {
        initial: OperatingPoint {
            voltage_mv: args.voltage,
            frequency_mhz: args.frequency,
        },
        range_mhz: if args.monitor { 0 } else { args.range },
        step_mhz: args.step,
        monitor_mode: args.monitor,
        reboot_threshold: args.reboot,
        output_dir: std::env::current_dir().context("Failed to resolve working directory")?,
    };

    let mut controller = RunController::new(client, config, strategy, shutdown, opts);
    controller.run_session().await?;

    info!("👋 Session finished");
    Ok(())
}

fn init_logging() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "axetune_rs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
