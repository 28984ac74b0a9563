// apps/md_cli/src/main.rs

//! MultiDomain 命令行界面
//!
//! 在两套结构网格之间执行跨网格耦合并报告定位统计。
//!
//! # 架构层级
//!
//! 本模块属于 **Layer 5: Application**，只通过 `CouplingConfig`
//! 与各层公开接口交互。

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// MultiDomain 跨网格耦合命令行工具
#[derive(Parser)]
#[command(name = "md_cli")]
#[command(author = "MultiDomain Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MultiDomain cross-mesh coupling tool", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 执行耦合
    Run(commands::run::RunArgs),
    /// 显示信息
    Info(commands::info::InfoArgs),
    /// 验证配置
    Validate(commands::validate::ValidateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Info(args) => commands::info::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
    }
}
