// crates/md_config/src/lib.rs

//! MultiDomain Config Layer (Layer 2)
//!
//! 配置层，集中管理跨网格耦合的全部参数。
//!
//! # 模块概览
//!
//! - [`coupling_config`]: CouplingConfig（分箱、定位、驱动三组参数）
//! - [`error`]: 配置错误类型
//!
//! # 层级架构
//!
//! ```text
//! Layer 5: md_cli        ─> 加载 CouplingConfig
//! Layer 4: md_coupling   ─> DriverConfig
//! Layer 3: md_mesh       ─> BinConfig, LocateConfig
//! Layer 2: md_config     (本层)
//! Layer 1: md_foundation, md_geo
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coupling_config;
pub mod error;

/// 层级标识
pub const LAYER: u8 = 2;

pub use coupling_config::{BinConfig, CouplingConfig, DriverConfig, LocateConfig};
pub use error::ConfigError;
