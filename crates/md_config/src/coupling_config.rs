// crates/md_config/src/coupling_config.rs

//! CouplingConfig - 跨网格耦合配置
//!
//! 分箱索引、点定位与耦合驱动的全部可调参数集中在这里，
//! 随耦合驱动一起传递，生命周期限定在一次 `set_sources` 调用。
//!
//! # JSON 示例
//!
//! ```json
//! {
//!   "bins": { "counts": [16, 8], "samples_per_axis": 5 },
//!   "locate": { "inversion_tolerance": 1e-10, "max_spiral_rings": 4 },
//!   "driver": { "quiet": false }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// 耦合配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CouplingConfig {
    /// 分箱网格配置
    #[serde(default)]
    pub bins: BinConfig,

    /// 点定位配置
    #[serde(default)]
    pub locate: LocateConfig,

    /// 驱动配置
    #[serde(default)]
    pub driver: DriverConfig,
}

// ============================================================================
// 分箱
// ============================================================================

/// 分箱网格配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinConfig {
    /// 每个轴的分箱数；None 时按单元数自动估计
    #[serde(default)]
    pub counts: Option<Vec<usize>>,

    /// 每个单元每个局部轴的采样点数（含端点）
    #[serde(default = "default_samples_per_axis")]
    pub samples_per_axis: usize,

    /// 自动估计时每轴分箱数上限
    #[serde(default = "default_max_bins_per_axis")]
    pub max_bins_per_axis: usize,
}

fn default_samples_per_axis() -> usize { 5 }
fn default_max_bins_per_axis() -> usize { 64 }

impl Default for BinConfig {
    fn default() -> Self {
        Self {
            counts: None,
            samples_per_axis: default_samples_per_axis(),
            max_bins_per_axis: default_max_bins_per_axis(),
        }
    }
}

impl BinConfig {
    /// 求出 `dim` 维网格上每轴的分箱数
    ///
    /// 显式给出时校验长度与正值；否则取 ceil(nelement^(1/dim))，
    /// 截断到 [1, max_bins_per_axis]。
    pub fn resolve_counts(&self, dim: usize, nelement: usize) -> Result<Vec<usize>, ConfigError> {
        if let Some(counts) = &self.counts {
            if counts.len() != dim {
                return Err(ConfigError::invalid(
                    "bins.counts",
                    format!("{counts:?}"),
                    format!("长度必须等于网格维度 {dim}"),
                ));
            }
            if counts.iter().any(|&n| n == 0) {
                return Err(ConfigError::invalid(
                    "bins.counts",
                    format!("{counts:?}"),
                    "分箱数必须为正",
                ));
            }
            return Ok(counts.clone());
        }

        // 最小的 n 使 n^dim >= nelement
        let cap = self.max_bins_per_axis.max(1);
        let mut per_axis = 1usize;
        while per_axis < cap && per_axis.saturating_pow(dim as u32) < nelement {
            per_axis += 1;
        }
        Ok(vec![per_axis; dim])
    }
}

// ============================================================================
// 点定位
// ============================================================================

/// 点定位配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocateConfig {
    /// Newton 反演收敛容差（相对单元特征尺寸）
    #[serde(default = "default_inversion_tolerance")]
    pub inversion_tolerance: f64,

    /// 局部坐标越出参考域 [-1,1] 的允许量
    #[serde(default = "default_overshoot_tolerance")]
    pub overshoot_tolerance: f64,

    /// Newton 最大迭代次数
    #[serde(default = "default_max_newton_iterations")]
    pub max_newton_iterations: usize,

    /// 判定雅可比奇异的相对阈值
    #[serde(default = "default_singular_jacobian_tolerance")]
    pub singular_jacobian_tolerance: f64,

    /// 包围盒外扩容差（相对包围盒对角线）
    ///
    /// 索引包围盒由单元采样点求得，弯曲边界可越出该包围盒。
    #[serde(default = "default_bounds_margin")]
    pub bounds_margin: f64,

    /// 螺旋搜索最大环数；None 表示覆盖整个分箱网格
    #[serde(default)]
    pub max_spiral_rings: Option<usize>,
}

fn default_inversion_tolerance() -> f64 { 1e-10 }
fn default_overshoot_tolerance() -> f64 { 1e-8 }
fn default_max_newton_iterations() -> usize { 20 }
fn default_singular_jacobian_tolerance() -> f64 { 1e-14 }
fn default_bounds_margin() -> f64 { 0.05 }

impl Default for LocateConfig {
    fn default() -> Self {
        Self {
            inversion_tolerance: default_inversion_tolerance(),
            overshoot_tolerance: default_overshoot_tolerance(),
            max_newton_iterations: default_max_newton_iterations(),
            singular_jacobian_tolerance: default_singular_jacobian_tolerance(),
            bounds_margin: default_bounds_margin(),
            max_spiral_rings: None,
        }
    }
}

impl LocateConfig {
    /// 高精度预设
    pub fn high_precision() -> Self {
        Self {
            inversion_tolerance: 1e-13,
            overshoot_tolerance: 1e-10,
            max_newton_iterations: 50,
            ..Self::default()
        }
    }

    /// 宽松预设
    pub fn relaxed() -> Self {
        Self {
            inversion_tolerance: 1e-8,
            overshoot_tolerance: 1e-6,
            bounds_margin: 0.1,
            ..Self::default()
        }
    }
}

// ============================================================================
// 驱动
// ============================================================================

/// 耦合驱动配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// 静默模式：不输出每轮耦合的统计信息
    #[serde(default = "default_true")]
    pub quiet: bool,

    /// 产出网格未变化时复用已构建的分箱索引
    #[serde(default = "default_true")]
    pub reuse_index: bool,

    /// 先尝试上一个积分点命中的单元
    #[serde(default = "default_true")]
    pub use_cached_guess: bool,
}

fn default_true() -> bool { true }

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            quiet: true,
            reuse_index: true,
            use_cached_guess: true,
        }
    }
}

// ============================================================================
// 加载与校验
// ============================================================================

impl CouplingConfig {
    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// 从 JSON 字符串加载配置
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: CouplingConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 序列化为格式化 JSON
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(counts) = &self.bins.counts {
            if counts.is_empty() || counts.len() > 3 {
                return Err(ConfigError::invalid(
                    "bins.counts",
                    format!("{counts:?}"),
                    "必须给出 1~3 个轴的分箱数",
                ));
            }
            if counts.iter().any(|&n| n == 0) {
                return Err(ConfigError::invalid(
                    "bins.counts",
                    format!("{counts:?}"),
                    "分箱数必须为正",
                ));
            }
        }

        if self.bins.samples_per_axis < 2 {
            return Err(ConfigError::invalid(
                "bins.samples_per_axis",
                self.bins.samples_per_axis,
                "每轴至少需要 2 个采样点（两个端点）",
            ));
        }

        if self.bins.max_bins_per_axis == 0 {
            return Err(ConfigError::invalid(
                "bins.max_bins_per_axis",
                0,
                "必须为正",
            ));
        }

        let positive = [
            ("locate.inversion_tolerance", self.locate.inversion_tolerance),
            ("locate.overshoot_tolerance", self.locate.overshoot_tolerance),
            (
                "locate.singular_jacobian_tolerance",
                self.locate.singular_jacobian_tolerance,
            ),
        ];
        for (key, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::invalid(key, value, "必须为有限正数"));
            }
        }

        if !(self.locate.bounds_margin.is_finite() && self.locate.bounds_margin >= 0.0) {
            return Err(ConfigError::invalid(
                "locate.bounds_margin",
                self.locate.bounds_margin,
                "不能为负",
            ));
        }

        if self.locate.max_newton_iterations == 0 {
            return Err(ConfigError::invalid(
                "locate.max_newton_iterations",
                0,
                "必须为正",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CouplingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bins.samples_per_axis, 5);
        assert!(config.driver.quiet);
        assert!(config.locate.max_spiral_rings.is_none());
    }

    #[test]
    fn test_zero_bins_rejected() {
        let mut config = CouplingConfig::default();
        config.bins.counts = Some(vec![4, 0]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_tolerance_rejected() {
        let mut config = CouplingConfig::default();
        config.locate.overshoot_tolerance = 0.0;
        assert!(config.validate().is_err());

        let mut config = CouplingConfig::default();
        config.locate.inversion_tolerance = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = CouplingConfig::from_json_str(
            r#"{ "bins": { "counts": [8, 4] }, "driver": { "quiet": false } }"#,
        )
        .unwrap();
        assert_eq!(config.bins.counts, Some(vec![8, 4]));
        assert_eq!(config.bins.samples_per_axis, 5);
        assert!(!config.driver.quiet);
        assert!(config.driver.reuse_index);
        assert_eq!(config.locate.max_newton_iterations, 20);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            CouplingConfig::from_json_str("{ bins: "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_resolve_counts_heuristic() {
        let bins = BinConfig::default();
        assert_eq!(bins.resolve_counts(2, 64).unwrap(), vec![8, 8]);
        assert_eq!(bins.resolve_counts(2, 65).unwrap(), vec![9, 9]);
        assert_eq!(bins.resolve_counts(3, 0).unwrap(), vec![1, 1, 1]);
        assert_eq!(bins.resolve_counts(1, 10_000).unwrap(), vec![64]);
    }

    #[test]
    fn test_resolve_counts_explicit() {
        let bins = BinConfig {
            counts: Some(vec![3, 5]),
            ..BinConfig::default()
        };
        assert_eq!(bins.resolve_counts(2, 1).unwrap(), vec![3, 5]);
        assert!(bins.resolve_counts(3, 1).is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coupling.json");
        let mut config = CouplingConfig::default();
        config.locate.max_spiral_rings = Some(3);
        config.save_to_file(&path).unwrap();

        let loaded = CouplingConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_presets_validate() {
        for locate in [LocateConfig::high_precision(), LocateConfig::relaxed()] {
            let config = CouplingConfig {
                locate,
                ..CouplingConfig::default()
            };
            assert!(config.validate().is_ok());
        }
    }
}
