// apps/md_cli/src/commands/info.rs

//! 信息显示命令
//!
//! 显示版本信息与当前（或默认）耦合配置。

use anyhow::Result;
use clap::Args;
use md_config::CouplingConfig;
use std::path::PathBuf;
use tracing::info;

use super::load_config;

/// 信息显示参数
#[derive(Args)]
pub struct InfoArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 以 JSON 输出配置
    #[arg(long)]
    pub json: bool,
}

/// 执行信息命令
pub fn execute(args: InfoArgs) -> Result<()> {
    info!("=== MultiDomain 信息 ===");

    let config = load_config(args.config.as_deref())?;
    if args.json {
        println!("{}", config.to_json_string()?);
        return Ok(());
    }

    print_system_info();
    println!();
    print_config(&config);
    Ok(())
}

fn print_system_info() {
    println!("=== 系统信息 ===");
    println!("md_cli 版本: {}", env!("CARGO_PKG_VERSION"));
    println!("目标平台: {}", std::env::consts::ARCH);
    println!("操作系统: {}", std::env::consts::OS);
    println!("并行定位: {}", if cfg!(feature = "parallel") { "启用" } else { "未启用" });
}

fn print_config(config: &CouplingConfig) {
    println!("=== 耦合配置 ===");

    println!("分箱:");
    match &config.bins.counts {
        Some(counts) => println!("  每轴分箱数: {:?}", counts),
        None => println!("  每轴分箱数: 自动（上限 {}）", config.bins.max_bins_per_axis),
    }
    println!("  单元采样点/轴: {}", config.bins.samples_per_axis);

    println!("定位:");
    println!("  反演容差: {:e}", config.locate.inversion_tolerance);
    println!("  越界容差: {:e}", config.locate.overshoot_tolerance);
    println!("  Newton 最大迭代: {}", config.locate.max_newton_iterations);
    println!("  包围盒外扩: {}", config.locate.bounds_margin);
    match config.locate.max_spiral_rings {
        Some(n) => println!("  螺旋最大环数: {}", n),
        None => println!("  螺旋最大环数: 不限"),
    }

    println!("驱动:");
    println!("  静默: {}", config.driver.quiet);
    println!("  复用索引: {}", config.driver.reuse_index);
    println!("  缓存猜测: {}", config.driver.use_cached_guess);
}
