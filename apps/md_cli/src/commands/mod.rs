// apps/md_cli/src/commands/mod.rs

//! 子命令实现

pub mod info;
pub mod run;
pub mod validate;

use anyhow::{Context, Result};
use md_config::CouplingConfig;
use std::path::Path;

/// 读取配置文件，未指定时使用默认配置
pub fn load_config(path: Option<&Path>) -> Result<CouplingConfig> {
    match path {
        Some(p) => CouplingConfig::from_file(p)
            .with_context(|| format!("无法加载配置文件 {}", p.display())),
        None => Ok(CouplingConfig::default()),
    }
}
