// crates/md_mesh/src/shape.rs

//! 张量积 Lagrange 形函数与 Gauss-Legendre 积分点
//!
//! 参考域为 [-1,1]^d，每轴 2 个（线性）或 3 个（二次）节点，等距分布。
//! 节点编号 x 方向最快，其次 y，最后 z。

use md_geo::{Coord, MAX_DIM};

/// 每轴最大节点数
pub const MAX_NNODE_1D: usize = 3;

/// 单元最大节点数（3 维二次单元）
pub const MAX_NNODE: usize = 27;

/// 一维 Lagrange 形函数及其导数
///
/// 只支持 2 或 3 个节点，其他值返回 None。
#[must_use]
pub fn lagrange_1d(nnode_1d: usize, s: f64) -> Option<([f64; MAX_NNODE_1D], [f64; MAX_NNODE_1D])> {
    match nnode_1d {
        2 => Some(([0.5 * (1.0 - s), 0.5 * (1.0 + s), 0.0], [-0.5, 0.5, 0.0])),
        3 => Some((
            [0.5 * s * (s - 1.0), 1.0 - s * s, 0.5 * s * (s + 1.0)],
            [s - 0.5, -2.0 * s, s + 0.5],
        )),
        _ => None,
    }
}

/// 一维节点的参考坐标
#[inline]
#[must_use]
pub fn reference_node_1d(nnode_1d: usize, j: usize) -> f64 {
    -1.0 + 2.0 * j as f64 / (nnode_1d - 1) as f64
}

/// 一维 Gauss-Legendre 积分点与权重，点数与每轴节点数相同
#[must_use]
pub fn gauss_1d(npts: usize) -> Option<(&'static [f64], &'static [f64])> {
    const P2: [f64; 2] = [-0.577_350_269_189_625_8, 0.577_350_269_189_625_8];
    const W2: [f64; 2] = [1.0, 1.0];
    const P3: [f64; 3] = [-0.774_596_669_241_483_4, 0.0, 0.774_596_669_241_483_4];
    const W3: [f64; 3] = [5.0 / 9.0, 8.0 / 9.0, 5.0 / 9.0];
    match npts {
        2 => Some((&P2, &W2)),
        3 => Some((&P3, &W3)),
        _ => None,
    }
}

/// 多维索引 <-> 线性索引（x 最快）
#[inline]
#[must_use]
pub fn unravel(mut linear: usize, n_per_axis: usize, dim: usize) -> [usize; MAX_DIM] {
    let mut out = [0; MAX_DIM];
    for slot in out.iter_mut().take(dim) {
        *slot = linear % n_per_axis;
        linear /= n_per_axis;
    }
    out
}

/// 张量积形函数在某一局部坐标处的值与导数
#[derive(Debug, Clone)]
pub struct ShapeValues {
    n: usize,
    nlocal: usize,
    psi: [f64; MAX_NNODE],
    dpsids: [[f64; MAX_DIM]; MAX_NNODE],
}

impl ShapeValues {
    /// 计算 `nlocal` 维、每轴 `nnode_1d` 个节点的形函数
    ///
    /// 参数组合不受支持时返回 None。
    #[must_use]
    pub fn evaluate(nlocal: usize, nnode_1d: usize, s: &Coord) -> Option<Self> {
        if nlocal == 0 || nlocal > MAX_DIM || s.dim() < nlocal {
            return None;
        }
        let mut psi_1d = [[0.0; MAX_NNODE_1D]; MAX_DIM];
        let mut dpsi_1d = [[0.0; MAX_NNODE_1D]; MAX_DIM];
        for a in 0..nlocal {
            let (p, d) = lagrange_1d(nnode_1d, s[a])?;
            psi_1d[a] = p;
            dpsi_1d[a] = d;
        }

        let n = nnode_1d.pow(nlocal as u32);
        let mut out = Self {
            n,
            nlocal,
            psi: [0.0; MAX_NNODE],
            dpsids: [[0.0; MAX_DIM]; MAX_NNODE],
        };
        for l in 0..n {
            let idx = unravel(l, nnode_1d, nlocal);
            let mut value = 1.0;
            for a in 0..nlocal {
                value *= psi_1d[a][idx[a]];
            }
            out.psi[l] = value;
            for b in 0..nlocal {
                let mut deriv = 1.0;
                for a in 0..nlocal {
                    deriv *= if a == b {
                        dpsi_1d[a][idx[a]]
                    } else {
                        psi_1d[a][idx[a]]
                    };
                }
                out.dpsids[l][b] = deriv;
            }
        }
        Some(out)
    }

    /// 节点数
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.n
    }

    /// 是否无节点
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// 第 l 个形函数值
    #[inline]
    #[must_use]
    pub fn psi(&self, l: usize) -> f64 {
        self.psi[l]
    }

    /// 第 l 个形函数对局部坐标 s_b 的导数
    #[inline]
    #[must_use]
    pub fn dpsids(&self, l: usize, b: usize) -> f64 {
        self.dpsids[l][b]
    }

    /// 全部形函数值
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.psi[..self.n]
    }

    /// 局部维度
    #[inline]
    #[must_use]
    pub fn nlocal(&self) -> usize {
        self.nlocal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_of_unity() {
        for nnode_1d in [2, 3] {
            for s in [-1.0, -0.3, 0.0, 0.7, 1.0] {
                let (psi, dpsi) = lagrange_1d(nnode_1d, s).unwrap();
                let sum: f64 = psi.iter().sum();
                let dsum: f64 = dpsi.iter().sum();
                assert!((sum - 1.0).abs() < 1e-14);
                assert!(dsum.abs() < 1e-14);
            }
        }
        assert!(lagrange_1d(4, 0.0).is_none());
    }

    #[test]
    fn test_kronecker_at_nodes() {
        let (psi, _) = lagrange_1d(3, reference_node_1d(3, 1)).unwrap();
        assert!((psi[1] - 1.0).abs() < 1e-14);
        assert!(psi[0].abs() < 1e-14 && psi[2].abs() < 1e-14);
    }

    #[test]
    fn test_gauss_integrates_cubic_exactly() {
        let (pts, wts) = gauss_1d(2).unwrap();
        let integral: f64 = pts.iter().zip(wts).map(|(x, w)| w * (x * x * x + x * x)).sum();
        assert!((integral - 2.0 / 3.0).abs() < 1e-14);

        let (pts, wts) = gauss_1d(3).unwrap();
        let integral: f64 = pts.iter().zip(wts).map(|(x, w)| w * x.powi(4)).sum();
        assert!((integral - 0.4).abs() < 1e-14);
    }

    #[test]
    fn test_tensor_shape_2d() {
        let s = Coord::new2(0.2, -0.6);
        let sv = ShapeValues::evaluate(2, 2, &s).unwrap();
        assert_eq!(sv.len(), 4);
        let sum: f64 = sv.values().iter().sum();
        assert!((sum - 1.0).abs() < 1e-14);
        // 节点 0 在 (-1,-1)
        assert!((sv.psi(0) - 0.25 * 0.8 * 1.6).abs() < 1e-14);
        let dsum: f64 = (0..4).map(|l| sv.dpsids(l, 1)).sum();
        assert!(dsum.abs() < 1e-14);
    }

    #[test]
    fn test_unravel() {
        assert_eq!(unravel(5, 3, 2), [2, 1, 0]);
        assert_eq!(unravel(26, 3, 3), [2, 2, 2]);
    }
}
