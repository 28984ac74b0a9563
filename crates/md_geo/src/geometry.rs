// crates/md_geo/src/geometry.rs

//! 几何类型定义
//!
//! 提供维度可变（1~3 维）的坐标类型 `Coord` 与局部雅可比矩阵 `Jacobian`。
//! 两者都是定长栈上类型，在点定位的热路径中不产生堆分配。
//!
//! `Coord` 同时用于物理坐标 x 和局部（参数）坐标 s。

use glam::{DMat2, DMat3, DVec2, DVec3};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Index, IndexMut, Mul, Neg, Sub};

/// 支持的最大维度
pub const MAX_DIM: usize = 3;

// ============================================================================
// Coord
// ============================================================================

/// 1~3 维坐标
///
/// # 示例
///
/// ```
/// use md_geo::geometry::Coord;
///
/// let a = Coord::new2(1.0, 2.0);
/// let b = Coord::new2(4.0, 6.0);
/// assert_eq!(a.dim(), 2);
/// assert!((a.distance(&b) - 5.0).abs() < 1e-14);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    dim: u8,
    v: [f64; MAX_DIM],
}

impl Coord {
    /// 指定维度的零坐标（维度超过 3 时截断为 3）
    #[inline]
    #[must_use]
    pub fn zeros(dim: usize) -> Self {
        Self {
            dim: dim.min(MAX_DIM) as u8,
            v: [0.0; MAX_DIM],
        }
    }

    /// 所有分量取同一值
    #[inline]
    #[must_use]
    pub fn splat(dim: usize, value: f64) -> Self {
        let mut c = Self::zeros(dim);
        for i in 0..c.dim() {
            c.v[i] = value;
        }
        c
    }

    /// 1 维坐标
    #[inline]
    #[must_use]
    pub const fn new1(x: f64) -> Self {
        Self {
            dim: 1,
            v: [x, 0.0, 0.0],
        }
    }

    /// 2 维坐标
    #[inline]
    #[must_use]
    pub const fn new2(x: f64, y: f64) -> Self {
        Self {
            dim: 2,
            v: [x, y, 0.0],
        }
    }

    /// 3 维坐标
    #[inline]
    #[must_use]
    pub const fn new3(x: f64, y: f64, z: f64) -> Self {
        Self { dim: 3, v: [x, y, z] }
    }

    /// 从切片创建，长度为 0 或超过 3 时返回 None
    #[must_use]
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        if values.is_empty() || values.len() > MAX_DIM {
            return None;
        }
        let mut c = Self::zeros(values.len());
        c.v[..values.len()].copy_from_slice(values);
        Some(c)
    }

    /// 维度
    #[inline]
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim as usize
    }

    /// 有效分量切片
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.v[..self.dim()]
    }

    /// 有效分量可变切片
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        let d = self.dim();
        &mut self.v[..d]
    }

    /// 点积
    #[inline]
    #[must_use]
    pub fn dot(&self, other: &Self) -> f64 {
        self.as_slice()
            .iter()
            .zip(other.as_slice())
            .map(|(a, b)| a * b)
            .sum()
    }

    /// 欧几里得范数
    #[inline]
    #[must_use]
    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// 无穷范数
    #[inline]
    #[must_use]
    pub fn max_abs(&self) -> f64 {
        self.as_slice().iter().fold(0.0_f64, |m, v| m.max(v.abs()))
    }

    /// 到另一点的距离平方
    #[inline]
    #[must_use]
    pub fn distance_squared(&self, other: &Self) -> f64 {
        let d = *self - *other;
        d.dot(&d)
    }

    /// 到另一点的距离
    #[inline]
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// 所有分量是否有限
    #[inline]
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.as_slice().iter().all(|v| v.is_finite())
    }

    /// 逐分量截断到 [lo, hi]
    #[must_use]
    pub fn clamp(&self, lo: f64, hi: f64) -> Self {
        let mut c = *self;
        for v in c.as_mut_slice() {
            *v = v.clamp(lo, hi);
        }
        c
    }

    /// 转为 glam 二维向量（缺失分量取 0）
    #[inline]
    #[must_use]
    pub fn to_dvec2(&self) -> DVec2 {
        DVec2::new(self.v[0], self.v[1])
    }

    /// 转为 glam 三维向量（缺失分量取 0）
    #[inline]
    #[must_use]
    pub fn to_dvec3(&self) -> DVec3 {
        DVec3::new(self.v[0], self.v[1], self.v[2])
    }
}

impl Default for Coord {
    fn default() -> Self {
        Self::zeros(MAX_DIM)
    }
}

impl Index<usize> for Coord {
    type Output = f64;

    #[inline]
    fn index(&self, i: usize) -> &f64 {
        &self.as_slice()[i]
    }
}

impl IndexMut<usize> for Coord {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.as_mut_slice()[i]
    }
}

// 维度不同的两个坐标相加时取较大维度，缺失分量视为 0
impl Add for Coord {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        let mut v = [0.0; MAX_DIM];
        for (i, slot) in v.iter_mut().enumerate() {
            *slot = self.v[i] + other.v[i];
        }
        Self {
            dim: self.dim.max(other.dim),
            v,
        }
    }
}

impl Sub for Coord {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        self + (-other)
    }
}

impl Neg for Coord {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self {
            dim: self.dim,
            v: [-self.v[0], -self.v[1], -self.v[2]],
        }
    }
}

impl Mul<f64> for Coord {
    type Output = Self;

    #[inline]
    fn mul(self, scalar: f64) -> Self {
        Self {
            dim: self.dim,
            v: [self.v[0] * scalar, self.v[1] * scalar, self.v[2] * scalar],
        }
    }
}

impl Mul<Coord> for f64 {
    type Output = Coord;

    #[inline]
    fn mul(self, c: Coord) -> Coord {
        c * self
    }
}

impl From<[f64; 2]> for Coord {
    fn from([x, y]: [f64; 2]) -> Self {
        Self::new2(x, y)
    }
}

impl From<[f64; 3]> for Coord {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self::new3(x, y, z)
    }
}

impl From<DVec2> for Coord {
    fn from(v: DVec2) -> Self {
        Self::new2(v.x, v.y)
    }
}

impl From<DVec3> for Coord {
    fn from(v: DVec3) -> Self {
        Self::new3(v.x, v.y, v.z)
    }
}

// ============================================================================
// Jacobian
// ============================================================================

/// 局部雅可比矩阵 J[i][j] = ∂x_i/∂s_j
///
/// 行数为物理维度 `ndim`，列数为局部维度 `nlocal`（nlocal <= ndim）。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Jacobian {
    ndim: u8,
    nlocal: u8,
    m: [[f64; MAX_DIM]; MAX_DIM],
}

impl Jacobian {
    /// 零矩阵
    #[must_use]
    pub fn zeros(ndim: usize, nlocal: usize) -> Self {
        Self {
            ndim: ndim.min(MAX_DIM) as u8,
            nlocal: nlocal.min(MAX_DIM) as u8,
            m: [[0.0; MAX_DIM]; MAX_DIM],
        }
    }

    /// 物理维度（行数）
    #[inline]
    #[must_use]
    pub const fn ndim(&self) -> usize {
        self.ndim as usize
    }

    /// 局部维度（列数）
    #[inline]
    #[must_use]
    pub const fn nlocal(&self) -> usize {
        self.nlocal as usize
    }

    /// 读取元素
    #[inline]
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.m[i][j]
    }

    /// 累加元素
    #[inline]
    pub fn add_to(&mut self, i: usize, j: usize, value: f64) {
        self.m[i][j] += value;
    }

    /// 第 j 列的欧几里得范数
    fn column_norm(&self, j: usize) -> f64 {
        (0..self.ndim())
            .map(|i| self.m[i][j] * self.m[i][j])
            .sum::<f64>()
            .sqrt()
    }

    /// 以度量矩阵 JᵀJ 的行列式开方表示的体积因子
    ///
    /// 方阵时等于 |det J|。
    #[must_use]
    pub fn volume_factor(&self) -> f64 {
        let g = self.metric();
        match self.nlocal() {
            1 => g.0[0][0].max(0.0).sqrt(),
            2 => DMat2::from_cols(
                DVec2::new(g.0[0][0], g.0[1][0]),
                DVec2::new(g.0[0][1], g.0[1][1]),
            )
            .determinant()
            .max(0.0)
            .sqrt(),
            _ => mat3(&g.0).determinant().max(0.0).sqrt(),
        }
    }

    /// 度量矩阵 G = JᵀJ（nlocal × nlocal）
    fn metric(&self) -> Metric {
        let mut g = [[0.0; MAX_DIM]; MAX_DIM];
        for a in 0..self.nlocal() {
            for b in 0..self.nlocal() {
                g[a][b] = (0..self.ndim()).map(|i| self.m[i][a] * self.m[i][b]).sum();
            }
        }
        Metric(g)
    }

    /// 求解 J·ds = r
    ///
    /// 方阵直接求解，非方阵（例如嵌入二维空间的一维单元）按最小二乘求解。
    /// 当 |det| 相对于各列范数乘积（Hadamard 上界）小于 `singular_tol` 时，
    /// 视为奇异并返回 None。
    #[must_use]
    pub fn solve(&self, rhs: &Coord, singular_tol: f64) -> Option<Coord> {
        let n = self.nlocal();
        let hadamard: f64 = (0..n).map(|j| self.column_norm(j)).product();
        if !(hadamard.is_finite() && hadamard > 0.0) {
            return None;
        }

        if self.ndim() == n {
            return self.solve_square(rhs, hadamard, singular_tol);
        }

        // 最小二乘: (JᵀJ) ds = Jᵀ r
        let g = self.metric();
        let mut b = Coord::zeros(n);
        for a in 0..n {
            b[a] = (0..self.ndim()).map(|i| self.m[i][a] * rhs[i]).sum();
        }
        let normal = Jacobian {
            ndim: n as u8,
            nlocal: n as u8,
            m: g.0,
        };
        normal.solve_square(&b, hadamard * hadamard, singular_tol)
    }

    fn solve_square(&self, rhs: &Coord, scale: f64, singular_tol: f64) -> Option<Coord> {
        let ds = match self.nlocal() {
            1 => {
                let det = self.m[0][0];
                if det.abs() <= singular_tol * scale {
                    return None;
                }
                Coord::new1(rhs[0] / det)
            }
            2 => {
                let a = DMat2::from_cols(
                    DVec2::new(self.m[0][0], self.m[1][0]),
                    DVec2::new(self.m[0][1], self.m[1][1]),
                );
                if a.determinant().abs() <= singular_tol * scale {
                    return None;
                }
                Coord::from(a.inverse() * rhs.to_dvec2())
            }
            _ => {
                let a = mat3(&self.m);
                if a.determinant().abs() <= singular_tol * scale {
                    return None;
                }
                Coord::from(a.inverse() * rhs.to_dvec3())
            }
        };
        ds.is_finite().then_some(ds)
    }
}

struct Metric([[f64; MAX_DIM]; MAX_DIM]);

fn mat3(m: &[[f64; MAX_DIM]; MAX_DIM]) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(m[0][0], m[1][0], m[2][0]),
        DVec3::new(m[0][1], m[1][1], m[2][1]),
        DVec3::new(m[0][2], m[1][2], m[2][2]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coord_basic() {
        let c = Coord::new3(1.0, 2.0, 2.0);
        assert_eq!(c.dim(), 3);
        assert!((c.norm() - 3.0).abs() < 1e-14);
        assert_eq!(c.as_slice(), &[1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_coord_from_slice() {
        assert!(Coord::from_slice(&[]).is_none());
        assert!(Coord::from_slice(&[1.0, 2.0, 3.0, 4.0]).is_none());
        let c = Coord::from_slice(&[0.5, -0.5]).unwrap();
        assert_eq!(c, Coord::new2(0.5, -0.5));
    }

    #[test]
    fn test_coord_arithmetic() {
        let a = Coord::new2(1.0, 2.0);
        let b = Coord::new2(0.5, 0.5);
        assert_eq!(a - b, Coord::new2(0.5, 1.5));
        assert_eq!(2.0 * a, Coord::new2(2.0, 4.0));
        assert_eq!((-a)[1], -2.0);
    }

    #[test]
    fn test_coord_clamp() {
        let s = Coord::new2(1.2, -3.0).clamp(-1.0, 1.0);
        assert_eq!(s, Coord::new2(1.0, -1.0));
    }

    #[test]
    fn test_jacobian_square_solve() {
        // x = 2s, y = 3t
        let mut j = Jacobian::zeros(2, 2);
        j.add_to(0, 0, 2.0);
        j.add_to(1, 1, 3.0);
        let ds = j.solve(&Coord::new2(1.0, 1.5), 1e-14).unwrap();
        assert!((ds[0] - 0.5).abs() < 1e-14);
        assert!((ds[1] - 0.5).abs() < 1e-14);
        assert!((j.volume_factor() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_jacobian_singular() {
        let mut j = Jacobian::zeros(2, 2);
        j.add_to(0, 0, 1.0);
        j.add_to(0, 1, 1.0);
        j.add_to(1, 0, 1.0);
        j.add_to(1, 1, 1.0);
        assert!(j.solve(&Coord::new2(1.0, 0.0), 1e-14).is_none());
    }

    #[test]
    fn test_jacobian_least_squares() {
        // 一维单元嵌入二维：x = s, y = s
        let mut j = Jacobian::zeros(2, 1);
        j.add_to(0, 0, 1.0);
        j.add_to(1, 0, 1.0);
        let ds = j.solve(&Coord::new2(1.0, 1.0), 1e-14).unwrap();
        assert!((ds[0] - 1.0).abs() < 1e-14);
        assert!((j.volume_factor() - 2.0_f64.sqrt()).abs() < 1e-14);
    }

    #[test]
    fn test_jacobian_3d() {
        let mut j = Jacobian::zeros(3, 3);
        j.add_to(0, 0, 1.0);
        j.add_to(1, 1, 2.0);
        j.add_to(2, 2, 4.0);
        let ds = j.solve(&Coord::new3(1.0, 1.0, 1.0), 1e-14).unwrap();
        assert!((ds[2] - 0.25).abs() < 1e-14);
    }
}
