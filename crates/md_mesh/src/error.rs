// crates/md_mesh/src/error.rs
//! 网格层错误类型
//!
//! 包含单元构造、网格维度、分箱索引与点定位相关的错误定义。
//! 点未找到属于正常结果，由 `LocateResult::NotFound` 表达，不在此处；
//! 只有调用方要求"必须找到"时（如 `position_of`）才转为 `PointNotFound`。
//! 所有错误可转换为 `md_foundation::MdError` 向上传播。

use md_config::ConfigError;
use md_foundation::{ElementIndex, MdError};
use md_geo::Coord;
use thiserror::Error;

/// 网格模块结果类型
pub type MeshResult<T> = Result<T, MeshError>;

/// 网格错误枚举
#[derive(Error, Debug)]
pub enum MeshError {
    /// 单元定义无效
    #[error("单元无效: {reason}")]
    InvalidElement {
        /// 原因
        reason: String,
    },

    /// 维度不匹配
    #[error("维度不匹配: {context} 期望 {expected} 维, 实际 {actual} 维")]
    DimensionMismatch {
        /// 发生位置
        context: &'static str,
        /// 期望维度
        expected: usize,
        /// 实际维度
        actual: usize,
    },

    /// 单元不存在或索引已过期
    #[error("单元 {0} 不存在或已被移除")]
    ElementNotFound(ElementIndex),

    /// 分箱索引与网格不一致
    #[error("分箱索引已过期: 索引对应网格 {index_mesh}@r{index_revision}, 当前网格 {mesh}@r{revision}")]
    StaleIndex {
        /// 索引构建时的网格 id
        index_mesh: u64,
        /// 索引构建时的网格版本
        index_revision: u64,
        /// 当前网格 id
        mesh: u64,
        /// 当前网格版本
        revision: u64,
    },

    /// 点不在网格内
    #[error("点 {point:?} 不在网格内")]
    PointNotFound {
        /// 查询点
        point: Coord,
    },

    /// 索引快照无效
    #[error("索引快照无效: {reason}")]
    InvalidSnapshot {
        /// 原因
        reason: String,
    },

    /// 诊断输出失败
    #[error("写出失败: {0}")]
    Io(#[from] std::io::Error),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

impl MeshError {
    /// 创建单元无效错误
    pub fn invalid_element(reason: impl Into<String>) -> Self {
        Self::InvalidElement {
            reason: reason.into(),
        }
    }

    /// 创建维度不匹配错误
    pub fn dimension_mismatch(context: &'static str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            context,
            expected,
            actual,
        }
    }

    /// 创建快照无效错误
    pub fn invalid_snapshot(reason: impl Into<String>) -> Self {
        Self::InvalidSnapshot {
            reason: reason.into(),
        }
    }

    /// 是否属于致命的配置类错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. } | Self::Config(_))
    }
}

/// 转换到 Foundation 层错误
impl From<MeshError> for MdError {
    fn from(err: MeshError) -> Self {
        match err {
            MeshError::InvalidElement { reason } => MdError::invalid_input(reason),
            MeshError::DimensionMismatch {
                context,
                expected,
                actual,
            } => MdError::dimension_mismatch(context, expected, actual),
            MeshError::ElementNotFound(idx) => {
                MdError::stale_index("element", idx.slot(), idx.generation())
            }
            err @ MeshError::StaleIndex { .. } => MdError::invalid_input(err.to_string()),
            err @ MeshError::PointNotFound { .. } => MdError::invalid_input(err.to_string()),
            MeshError::InvalidSnapshot { reason } => MdError::serialization(reason),
            MeshError::Io(e) => MdError::io_with_source("网格诊断输出失败", e),
            MeshError::Config(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let err = MeshError::dimension_mismatch("build", 2, 3);
        assert!(err.is_fatal());
        let md: MdError = err.into();
        assert!(md.is_config_error());
    }

    #[test]
    fn test_stale_index_message() {
        let err = MeshError::StaleIndex {
            index_mesh: 1,
            index_revision: 0,
            mesh: 1,
            revision: 3,
        };
        assert!(err.to_string().contains("r3"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_element_not_found_to_foundation() {
        let err = MeshError::ElementNotFound(ElementIndex::new(2, 5));
        let md: MdError = err.into();
        assert!(matches!(md, MdError::StaleIndex { index: 2, generation: 5, .. }));
    }
}
