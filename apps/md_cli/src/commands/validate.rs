// apps/md_cli/src/commands/validate.rs

//! 配置验证命令

use anyhow::{bail, Context, Result};
use clap::Args;
use md_config::CouplingConfig;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// 验证参数
#[derive(Args)]
pub struct ValidateArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: PathBuf,

    /// 严格模式（警告也视为错误）
    #[arg(long)]
    pub strict: bool,
}

/// 验证结果
#[derive(Default)]
struct ValidationResult {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationResult {
    fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn passed(&self, strict: bool) -> bool {
        self.errors.is_empty() && (!strict || self.warnings.is_empty())
    }
}

/// 执行验证命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    info!("=== MultiDomain 配置验证 ===");

    let mut result = ValidationResult::default();
    validate_config(&args.config, &mut result)?;
    print_validation_result(&result, args.strict)
}

fn validate_config(path: &Path, result: &mut ValidationResult) -> Result<()> {
    println!("\n检查配置文件: {}", path.display());

    if !path.exists() {
        result.add_error(format!("配置文件不存在: {}", path.display()));
        return Ok(());
    }

    let content = std::fs::read_to_string(path).context("无法读取配置文件")?;
    if check_content(&content, result) {
        println!("  ✓ 配置文件格式有效");
    }
    Ok(())
}

/// 解析并校验配置内容，通过 `validate()` 时返回 true
fn check_content(content: &str, result: &mut ValidationResult) -> bool {
    let config: CouplingConfig = match serde_json::from_str(content) {
        Ok(c) => c,
        Err(e) => {
            result.add_error(format!("JSON 解析错误: {}", e));
            return false;
        }
    };

    let valid = match config.validate() {
        Ok(()) => true,
        Err(e) => {
            result.add_error(e.to_string());
            false
        }
    };
    check_warnings(&config, result);
    valid
}

fn check_warnings(config: &CouplingConfig, result: &mut ValidationResult) {
    if config.bins.samples_per_axis < 3 {
        result.add_warning(format!(
            "samples_per_axis = {} 过小，弯曲单元可能漏登记",
            config.bins.samples_per_axis
        ));
    }
    if let Some(counts) = &config.bins.counts {
        let total: usize = counts.iter().product();
        if total > 1_000_000 {
            result.add_warning(format!("分箱总数 {} 较大，内存占用高", total));
        }
    }
    if config.locate.inversion_tolerance > 1e-6 {
        result.add_warning(format!(
            "反演容差 {:e} 较大，局部坐标精度可能不足",
            config.locate.inversion_tolerance
        ));
    }
    if config.locate.max_spiral_rings == Some(0) {
        result.add_warning("max_spiral_rings = 0 只搜索中心分箱");
    }
}

fn print_validation_result(result: &ValidationResult, strict: bool) -> Result<()> {
    println!("\n=== 验证结果 ===");

    if !result.errors.is_empty() {
        println!("\n错误 ({}):", result.errors.len());
        for err in &result.errors {
            error!("  ✗ {}", err);
            println!("  ✗ {}", err);
        }
    }

    if !result.warnings.is_empty() {
        println!("\n警告 ({}):", result.warnings.len());
        for warning in &result.warnings {
            warn!("  ⚠ {}", warning);
            println!("  ⚠ {}", warning);
        }
    }

    if result.passed(strict) {
        println!("\n✓ 验证通过");
        Ok(())
    } else {
        println!("\n✗ 验证失败");
        bail!(
            "验证失败：发现 {} 个错误，{} 个警告",
            result.errors.len(),
            result.warnings.len()
        )
    }
}
