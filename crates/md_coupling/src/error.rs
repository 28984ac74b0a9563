// crates/md_coupling/src/error.rs
//! 耦合层错误类型
//!
//! 点未找到不是错误：它以 `ExternalInteraction::NotFound` 记录在交互存储中，
//! 只有物理代码要求读取该交互时才报告 `InteractionNotFound`。

use md_config::ConfigError;
use md_foundation::{ElementIndex, MdError};
use md_mesh::MeshError;
use thiserror::Error;

/// 耦合模块结果类型
pub type CouplingResult<T> = Result<T, CouplingError>;

/// 耦合错误枚举
#[derive(Error, Debug)]
pub enum CouplingError {
    /// 消费网格与生产网格维度不一致
    #[error("网格维度不一致: 消费网格 {consuming} 维, 生产网格 {producing} 维")]
    DimensionMismatch {
        /// 消费网格维度
        consuming: usize,
        /// 生产网格维度
        producing: usize,
    },

    /// 局部坐标维度与存储声明不一致
    #[error("局部坐标维度不符: 期望 {expected}, 实际 {actual}")]
    LocalDimMismatch {
        /// 期望维度
        expected: usize,
        /// 实际维度
        actual: usize,
    },

    /// 交互槽位或积分点越界
    #[error("交互 ({slot}, {ipt}) 越界: 共 {n_slots} 个槽位, {n_ipt} 个积分点")]
    OutOfRange {
        /// 槽位
        slot: usize,
        /// 积分点
        ipt: usize,
        /// 槽位数
        n_slots: usize,
        /// 积分点数
        n_ipt: usize,
    },

    /// 交互尚未设置
    #[error("交互 ({slot}, {ipt}) 尚未设置")]
    InteractionUnset {
        /// 槽位
        slot: usize,
        /// 积分点
        ipt: usize,
    },

    /// 交互点在生产网格中未找到
    #[error("交互 ({slot}, {ipt}) 的点不在生产网格内")]
    InteractionNotFound {
        /// 槽位
        slot: usize,
        /// 积分点
        ipt: usize,
    },

    /// 记录指向的单元已被移除（网格细分后未重新耦合）
    #[error("交互 ({slot}, {ipt}) 指向的单元 {element} 已不存在, 需要重新调用 set_sources")]
    StaleInteraction {
        /// 槽位
        slot: usize,
        /// 积分点
        ipt: usize,
        /// 单元
        element: ElementIndex,
    },

    /// 记录属于其他进程
    #[error("交互指向进程 {owner} 上的单元, 本进程为 {rank}")]
    RemoteInteraction {
        /// 单元所在进程
        owner: usize,
        /// 当前进程
        rank: usize,
    },

    /// 网格层错误
    #[error("网格错误: {0}")]
    Mesh(#[from] MeshError),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 进程间通信失败
    #[error("通信失败: {0}")]
    Communication(String),
}

impl CouplingError {
    /// 创建通信错误
    pub fn communication(message: impl Into<String>) -> Self {
        Self::Communication(message.into())
    }

    /// 是否属于致命的配置类错误
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::DimensionMismatch { .. } | Self::Config(_) => true,
            Self::Mesh(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// 转换到 Foundation 层错误
impl From<CouplingError> for MdError {
    fn from(err: CouplingError) -> Self {
        match err {
            CouplingError::DimensionMismatch {
                consuming,
                producing,
            } => MdError::dimension_mismatch("set_sources", producing, consuming),
            CouplingError::StaleInteraction { element, .. } => {
                MdError::stale_index("element", element.slot(), element.generation())
            }
            CouplingError::Mesh(e) => e.into(),
            CouplingError::Config(e) => e.into(),
            CouplingError::Communication(message) => MdError::communication(message),
            other => MdError::invalid_input(other.to_string()),
        }
    }
}
