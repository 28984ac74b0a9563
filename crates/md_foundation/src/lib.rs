// crates/md_foundation/src/lib.rs

//! MultiDomain Foundation Layer
//!
//! 基础层，提供整个项目共用的基础抽象。
//!
//! # 模块概览
//!
//! - [`arena`]: 代际验证元素池与强类型索引
//! - [`error`]: 统一错误类型
//!
//! # 示例
//!
//! ```
//! use md_foundation::arena::{ElementTag, SafeArena};
//!
//! let mut arena: SafeArena<f64, ElementTag> = SafeArena::new();
//! let idx = arena.insert(1.5);
//! assert_eq!(arena.get(idx), Some(&1.5));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod error;

pub use arena::{ElementIndex, ElementTag, SafeArena, SafeIdx};
pub use error::{MdError, MdResult};

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::arena::{ElementIndex, ElementTag, SafeArena, SafeIdx};
    pub use crate::error::{MdError, MdResult};
}
