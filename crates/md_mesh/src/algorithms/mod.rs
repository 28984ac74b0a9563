// crates/md_mesh/src/algorithms/mod.rs

//! 网格算法

pub mod refine;

pub use refine::{refine_near, refine_uniform, refine_where, renumber_equations, RefineStats};
