// crates/md_config/src/error.rs

//! 配置层错误类型

use md_foundation::MdError;

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(String),

    /// 无效值
    #[error("无效值 '{key}': {value} - {reason}")]
    InvalidValue {
        /// 配置键
        key: String,
        /// 配置值
        value: String,
        /// 原因
        reason: String,
    },
}

impl ConfigError {
    /// 创建无效值错误
    pub fn invalid(key: &str, value: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<ConfigError> for MdError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(e) => MdError::io_with_source("读取配置失败", e),
            ConfigError::Parse(msg) => MdError::serialization(msg),
            ConfigError::InvalidValue { key, value, reason } => {
                MdError::invalid_config(key, value, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("bins.counts", "[0, 4]", "分箱数必须为正");
        assert!(err.to_string().contains("bins.counts"));
    }

    #[test]
    fn test_into_md_error() {
        let err: MdError = ConfigError::invalid("locate.overshoot_tolerance", -1.0, "必须为正").into();
        assert!(err.is_config_error());
    }
}
