// crates/md_coupling/src/lib.rs

//! MultiDomain 跨网格耦合模块
//!
//! 让一套网格（消费者）的积分点引用另一套独立离散网格（生产者）中的单元与局部坐标，
//! 用于组装跨网格的残差与 Jacobian 贡献。
//!
//! # 模块结构
//!
//! - [`interaction`]: 外部交互存储与 `ExternalElement` 包装
//! - [`interpolate`]: `Interpolatable` 插值能力接口与 `ExternalSource` 访问器
//! - [`driver`]: 单向 / 双向耦合驱动
//! - [`distributed`]: 生产网格分布在多个进程时的集合耦合
//!
//! # 示例
//!
//! ```rust
//! use md_config::CouplingConfig;
//! use md_coupling::prelude::*;
//! use md_mesh::generation::rectangular_quad_mesh;
//!
//! let producing = rectangular_quad_mesh(4, 4, 1.0, 1.0, 2).unwrap();
//! let mut consuming =
//!     ExternalElement::wrap_mesh(&rectangular_quad_mesh(3, 3, 1.0, 1.0, 2).unwrap()).unwrap();
//!
//! let mut driver = CouplingDriver::new(CouplingConfig::default(), 0).unwrap();
//! let report = driver.set_sources(&mut consuming, &producing).unwrap();
//! assert_eq!(report.n_points, 36);
//! assert!(report.all_found());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod distributed;
pub mod driver;
pub mod error;
pub mod interaction;
pub mod interpolate;

/// 预导入模块
pub mod prelude {
    pub use crate::distributed::{
        Communicator, DistributedCouplingDriver, SerialCommunicator, ThreadCommunicator,
    };
    pub use crate::driver::{CouplingDriver, CouplingReport, CouplingState, TwoWayCoupling};
    pub use crate::error::{CouplingError, CouplingResult};
    pub use crate::interaction::{
        ElementWithExternalElement, ExternalElement, ExternalInteraction,
        ExternalInteractionStore, InteractionRecord,
    };
    pub use crate::interpolate::{ExternalSource, ExternalValue, Interpolatable};
}

pub use distributed::{
    Communicator, DistributedCouplingDriver, DistributedReport, SerialCommunicator,
    ThreadCommunicator,
};
pub use driver::{CouplingDriver, CouplingReport, CouplingState, TwoWayCoupling};
pub use error::{CouplingError, CouplingResult};
pub use interaction::{
    ElementWithExternalElement, ExternalElement, ExternalInteraction, ExternalInteractionStore,
    InteractionCounts, InteractionRecord,
};
pub use interpolate::{ExternalSource, ExternalValue, Interpolatable};
