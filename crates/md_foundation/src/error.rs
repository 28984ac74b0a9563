// crates/md_foundation/src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `MdError` 枚举和 `MdResult` 类型别名，作为各层错误的最终汇聚点。
//!
//! # 设计原则
//!
//! 1. **层次化**: 基础层只定义核心错误，网格与耦合相关错误在各自 crate 中定义，
//!    并通过 `From` 转换到本类型
//! 2. **易用性**: 提供便捷的构造方法
//! 3. **可追溯**: 支持错误链
//!
//! # 示例
//!
//! ```
//! use md_foundation::error::{MdError, MdResult};
//!
//! fn check_bins(n: usize) -> MdResult<()> {
//!     if n == 0 {
//!         return Err(MdError::invalid_config("bins.counts", n, "分箱数量不能为零"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_bins(0).is_err());
//! ```

use thiserror::Error;

/// 统一结果类型
pub type MdResult<T> = Result<T, MdError>;

/// MultiDomain 错误类型
#[derive(Error, Debug)]
pub enum MdError {
    // ========================================================================
    // IO 相关错误
    // ========================================================================
    /// IO 错误
    #[error("IO错误: {message}")]
    Io {
        /// 描述性错误信息
        message: String,
        #[source]
        /// 可选的底层 IO 错误
        source: Option<std::io::Error>,
    },

    /// 序列化错误
    #[error("序列化错误: {message}")]
    Serialization {
        /// 序列化失败原因
        message: String,
    },

    // ========================================================================
    // 数据与索引错误
    // ========================================================================
    /// 无效输入
    #[error("无效的输入数据: {message}")]
    InvalidInput {
        /// 说明无效原因
        message: String,
    },

    /// 维度不匹配
    #[error("维度不匹配: {context} 期望 {expected} 维, 实际 {actual} 维")]
    DimensionMismatch {
        /// 发生位置
        context: String,
        /// 期望维度
        expected: usize,
        /// 实际维度
        actual: usize,
    },

    /// 索引越界
    #[error("索引越界: {index_type} 索引 {index} 超出范围 0..{len}")]
    IndexOutOfBounds {
        /// 索引类别描述
        index_type: &'static str,
        /// 访问的索引
        index: usize,
        /// 上界（长度）
        len: usize,
    },

    /// 过期索引（代际不匹配，元素已被删除或替换）
    #[error("过期索引: {index_type} {index}@{generation} 已失效")]
    StaleIndex {
        /// 索引类别描述
        index_type: &'static str,
        /// 槽位
        index: u32,
        /// 索引持有的代际
        generation: u32,
    },

    // ========================================================================
    // 配置错误
    // ========================================================================
    /// 配置值无效
    #[error("配置值无效: {key}={value}, 原因: {reason}")]
    InvalidConfig {
        /// 配置键名
        key: String,
        /// 配置值
        value: String,
        /// 无效原因说明
        reason: String,
    },

    // ========================================================================
    // 其他
    // ========================================================================
    /// 进程间通信失败
    #[error("通信错误: {message}")]
    Communication {
        /// 失败原因
        message: String,
    },
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl MdError {
    /// 创建 IO 错误（带源）
    pub fn io_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(source),
        }
    }

    /// 创建序列化错误
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// 创建无效输入错误
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// 创建维度不匹配错误
    pub fn dimension_mismatch(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    /// 创建索引越界错误
    pub fn index_out_of_bounds(index_type: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds {
            index_type,
            index,
            len,
        }
    }

    /// 创建过期索引错误
    pub fn stale_index(index_type: &'static str, index: u32, generation: u32) -> Self {
        Self::StaleIndex {
            index_type,
            index,
            generation,
        }
    }

    /// 创建配置值无效错误
    pub fn invalid_config(
        key: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// 创建通信错误
    pub fn communication(message: impl Into<String>) -> Self {
        Self::Communication {
            message: message.into(),
        }
    }

    /// 是否属于配置类（致命）错误
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. } | Self::DimensionMismatch { .. }
        )
    }
}

impl From<std::io::Error> for MdError {
    fn from(err: std::io::Error) -> Self {
        Self::io_with_source(err.to_string(), err)
    }
}
