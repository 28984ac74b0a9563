// crates/md_mesh/src/lib.rs

//! MultiDomain 网格模块
//!
//! 提供跨网格点定位所需的网格层：几何单元、单元网格容器、分箱空间索引与螺旋点定位。
//!
//! # 核心类型
//!
//! - [`QElement`]: 1~3 维张量积 Lagrange 单元（每轴 2 或 3 个节点）
//! - [`ElementMesh`]: 代际验证的单元网格，带版本号
//! - [`SpatialBinIndex`]: 均匀分箱空间索引
//! - [`PointLocator`]: 螺旋搜索点定位器
//!
//! # Trait 抽象
//!
//! - [`GeomElement`]: 几何单元适配接口（正向映射、包围盒、Newton 反演）
//! - [`MeshAccess`]: 网格只读访问接口
//!
//! # 模块结构
//!
//! - [`shape`]: 一维 Lagrange 基函数、Gauss 积分、张量积形函数
//! - [`element`]: Q 单元
//! - [`mesh`]: 网格容器
//! - [`generation`]: 结构化网格生成
//! - [`algorithms`]: 网格细分与方程重编号
//! - [`spatial_index`]: 分箱索引
//! - [`locator`]: 点定位
//!
//! # 示例
//!
//! ```rust
//! use md_mesh::prelude::*;
//! use md_config::CouplingConfig;
//!
//! let mesh = rectangular_quad_mesh(2, 2, 1.0, 1.0, 2).unwrap();
//! let result = mesh.locate_zeta(&Coord::new2(0.75, 0.25), &CouplingConfig::default()).unwrap();
//! assert!(result.is_found());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algorithms;
pub mod element;
pub mod error;
pub mod generation;
pub mod locator;
pub mod mesh;
pub mod shape;
pub mod spatial_index;
pub mod traits;

/// 预导入模块
pub mod prelude {
    pub use crate::element::QElement;
    pub use crate::error::{MeshError, MeshResult};
    pub use crate::generation::{brick_mesh, rectangular_quad_mesh, structured_line_mesh};
    pub use crate::locator::{LocateResult, MeshLocateExt, NotFoundReason, PointLocator};
    pub use crate::mesh::ElementMesh;
    pub use crate::spatial_index::SpatialBinIndex;
    pub use crate::traits::{GeomElement, MeshAccess, MeshAccessMut, NodalElement, Refineable};
    pub use md_foundation::ElementIndex;
    pub use md_geo::Coord;
}

pub use element::QElement;
pub use error::{MeshError, MeshResult};
pub use generation::BoxMeshGenerator;
pub use locator::{
    CachedLocator, LocateResult, LocatorStats, MeshLocateExt, NotFoundReason, PointLocator,
};
pub use mesh::ElementMesh;
pub use spatial_index::{BinIndexSnapshot, BinOccupancy, BinRecord, SpatialBinIndex};
pub use traits::{
    GeomElement, InversionFailure, MeshAccess, MeshAccessMut, NodalElement, Refineable,
};
