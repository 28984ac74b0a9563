// crates/md_geo/src/bbox.rs

//! 轴对齐包围盒
//!
//! 维度随坐标而定（1~3 维）。空盒的最小值为 +∞、最大值为 -∞，
//! 第一次 `expand` 后变为退化的单点盒。

use crate::geometry::Coord;
use serde::{Deserialize, Serialize};

/// 边界框
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// 各轴最小值
    pub min: Coord,
    /// 各轴最大值
    pub max: Coord,
}

impl BoundingBox {
    /// 空边界框
    #[must_use]
    pub fn empty(dim: usize) -> Self {
        Self {
            min: Coord::splat(dim, f64::INFINITY),
            max: Coord::splat(dim, f64::NEG_INFINITY),
        }
    }

    /// 从两个角点创建，自动排序各分量
    #[must_use]
    pub fn from_corners(a: Coord, b: Coord) -> Self {
        let mut bbox = Self::empty(a.dim());
        bbox.expand(&a);
        bbox.expand(&b);
        bbox
    }

    /// 从点集创建
    #[must_use]
    pub fn from_points<'a>(dim: usize, points: impl IntoIterator<Item = &'a Coord>) -> Self {
        let mut bbox = Self::empty(dim);
        for p in points {
            bbox.expand(p);
        }
        bbox
    }

    /// 维度
    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.min.dim()
    }

    /// 是否为空（尚未包含任何点）
    #[must_use]
    pub fn is_empty(&self) -> bool {
        (0..self.dim()).any(|i| self.min[i] > self.max[i])
    }

    /// 扩展以包含点
    pub fn expand(&mut self, p: &Coord) {
        for i in 0..self.dim().min(p.dim()) {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    /// 合并两个边界框
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut out = *self;
        if !other.is_empty() {
            out.expand(&other.min);
            out.expand(&other.max);
        }
        out
    }

    /// 某轴的长度
    #[inline]
    #[must_use]
    pub fn extent(&self, axis: usize) -> f64 {
        self.max[axis] - self.min[axis]
    }

    /// 对角线长度
    #[must_use]
    pub fn diagonal(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.min.distance(&self.max)
    }

    /// 中心点
    #[must_use]
    pub fn center(&self) -> Coord {
        (self.min + self.max) * 0.5
    }

    /// 各方向向外扩展 `amount`
    #[must_use]
    pub fn inflate(&self, amount: f64) -> Self {
        Self {
            min: self.min - Coord::splat(self.dim(), amount),
            max: self.max + Coord::splat(self.dim(), amount),
        }
    }

    /// 点是否在盒内（含边界），`margin` 为各方向的额外容差
    #[must_use]
    pub fn contains(&self, p: &Coord, margin: f64) -> bool {
        if p.dim() != self.dim() {
            return false;
        }
        (0..self.dim()).all(|i| p[i] >= self.min[i] - margin && p[i] <= self.max[i] + margin)
    }

    /// 两个边界框是否相交
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.dim() == other.dim()
            && (0..self.dim()).all(|i| self.min[i] <= other.max[i] && self.max[i] >= other.min[i])
    }
}
