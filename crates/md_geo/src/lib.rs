// crates/md_geo/src/lib.rs

//! MultiDomain 几何模块
//!
//! 提供跨网格点定位所需的基础几何类型。
//!
//! # 模块
//!
//! - `geometry`: 1~3 维坐标 `Coord` 与局部雅可比 `Jacobian`
//! - `bbox`: 轴对齐包围盒 `BoundingBox`
//!
//! # 示例
//!
//! ```
//! use md_geo::prelude::*;
//!
//! let bbox = BoundingBox::from_corners(Coord::new2(0.0, 0.0), Coord::new2(1.0, 1.0));
//! assert!(bbox.contains(&Coord::new2(0.25, 0.75), 0.0));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bbox;
pub mod geometry;

/// 预导入模块
pub mod prelude {
    pub use crate::bbox::BoundingBox;
    pub use crate::geometry::{Coord, Jacobian, MAX_DIM};
}

pub use bbox::BoundingBox;
pub use geometry::{Coord, Jacobian, MAX_DIM};
