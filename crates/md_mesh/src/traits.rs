// crates/md_mesh/src/traits.rs

//! 网格与几何单元抽象接口
//!
//! - [`GeomElement`]: 几何单元适配接口，提供正向映射 s -> x、局部雅可比、
//!   积分点、近似包围盒以及 x -> s 的 Newton 反演
//! - [`NodalElement`]: 节点型单元（节点坐标、节点场值、方程编号）
//! - [`Refineable`]: 可均匀细分的单元
//! - [`MeshAccess`]: 网格只读访问接口，点定位与耦合驱动只通过它访问网格
//! - [`MeshAccessMut`]: 单元可变访问（写入交互记录等非几何数据）
//!
//! # 参考域约定
//!
//! 所有单元的局部坐标域固定为 [-1,1]^d。

use md_config::LocateConfig;
use md_foundation::ElementIndex;
use md_geo::{BoundingBox, Coord, Jacobian};

use crate::shape::unravel;

/// 局部坐标超过该界限时视为 Newton 发散
pub const DIVERGENCE_BOUND: f64 = 10.0;

// =========================================================================
// 反演失败
// =========================================================================

/// x -> s 反演失败的原因
///
/// 这是正常的查询结果，不是错误：点定位器据此继续尝试下一个候选单元。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InversionFailure {
    /// 局部雅可比奇异或严重病态
    Singular,
    /// 迭代发散（局部坐标远离参考域或出现非有限值）
    Diverged,
    /// 达到最大迭代次数仍未收敛
    NotConverged,
    /// 收敛到参考域之外（超出越界容差）
    OutsideReference,
}

impl std::fmt::Display for InversionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Singular => "雅可比奇异",
            Self::Diverged => "迭代发散",
            Self::NotConverged => "未收敛",
            Self::OutsideReference => "超出参考域",
        };
        f.write_str(text)
    }
}

// =========================================================================
// GeomElement
// =========================================================================

/// 几何单元适配接口
///
/// 实现者只需提供正向映射、雅可比和积分点，包围盒、特征尺寸和反演都有默认实现。
/// 所有方法都是纯几何查询，没有副作用。
pub trait GeomElement {
    /// 局部（参数）坐标维度
    fn nlocal(&self) -> usize;

    /// 物理坐标维度
    fn ndim(&self) -> usize;

    /// 时间层 `t` 处的物理位置（0 为当前层）
    fn position_at(&self, t: usize, s: &Coord) -> Coord;

    /// 当前物理位置
    #[inline]
    fn position(&self, s: &Coord) -> Coord {
        self.position_at(0, s)
    }

    /// 局部雅可比 ∂x/∂s
    fn dposition(&self, s: &Coord) -> Jacobian;

    /// 积分点数量
    fn n_integration_points(&self) -> usize;

    /// 第 i 个积分点的局部坐标
    fn integration_point(&self, i: usize) -> Coord;

    /// 第 i 个积分点的权重
    fn integration_weight(&self, i: usize) -> f64;

    /// 局部坐标是否在参考域内（允许越界 `tol`）
    fn reference_contains(&self, s: &Coord, tol: f64) -> bool {
        s.dim() == self.nlocal() && s.as_slice().iter().all(|v| v.abs() <= 1.0 + tol)
    }

    /// 在参考域上取每轴 `samples_per_axis` 个均匀点（含端点），按 x 最快的顺序
    fn reference_samples(&self, samples_per_axis: usize) -> Vec<Coord> {
        let n = samples_per_axis.max(2);
        let nlocal = self.nlocal();
        let total = n.pow(nlocal as u32);
        (0..total)
            .map(|l| {
                let idx = unravel(l, n, nlocal);
                let mut s = Coord::zeros(nlocal);
                for a in 0..nlocal {
                    s[a] = -1.0 + 2.0 * idx[a] as f64 / (n - 1) as f64;
                }
                s
            })
            .collect()
    }

    /// 采样得到的近似包围盒
    ///
    /// 对弯曲单元可能略小于真实包围盒。
    fn bounding_box(&self, samples_per_axis: usize) -> BoundingBox {
        let mut bbox = BoundingBox::empty(self.ndim());
        for s in self.reference_samples(samples_per_axis) {
            bbox.expand(&self.position(&s));
        }
        bbox
    }

    /// 特征尺寸（角点包围盒对角线）
    fn characteristic_length(&self) -> f64 {
        self.bounding_box(2).diagonal()
    }

    /// Newton 反演：求 s 使 position(s) ≈ x
    ///
    /// 收敛判据为 |x - position(s)| <= inversion_tolerance × 特征尺寸。
    /// 收敛后若 s 在参考域外但不超过 `overshoot_tolerance`，截断回参考域。
    fn locate_local(
        &self,
        x: &Coord,
        guess: &Coord,
        config: &LocateConfig,
    ) -> Result<Coord, InversionFailure> {
        let nlocal = self.nlocal();
        let scale = self.characteristic_length();
        if !(scale.is_finite() && scale > 0.0) {
            return Err(InversionFailure::Singular);
        }
        let tol = config.inversion_tolerance * scale;

        let mut s = if guess.dim() == nlocal {
            *guess
        } else {
            Coord::zeros(nlocal)
        };

        let mut converged = false;
        for iter in 0..=config.max_newton_iterations {
            let residual = *x - self.position(&s);
            if residual.norm() <= tol {
                converged = true;
                break;
            }
            if iter == config.max_newton_iterations {
                break;
            }
            let jacobian = self.dposition(&s);
            let ds = jacobian
                .solve(&residual, config.singular_jacobian_tolerance)
                .ok_or(InversionFailure::Singular)?;
            s = s + ds;
            if !s.is_finite() || s.max_abs() > DIVERGENCE_BOUND {
                return Err(InversionFailure::Diverged);
            }
        }

        if !converged {
            return Err(InversionFailure::NotConverged);
        }
        if !self.reference_contains(&s, config.overshoot_tolerance) {
            return Err(InversionFailure::OutsideReference);
        }
        Ok(s.clamp(-1.0, 1.0))
    }
}

// =========================================================================
// NodalElement
// =========================================================================

/// 节点型单元
///
/// 节点坐标属于单元自身；相邻单元共享位置相同的节点时，
/// 由网格层保证这些节点坐标一致。
pub trait NodalElement {
    /// 节点数
    fn nnode(&self) -> usize;

    /// 节点当前位置
    fn node_position(&self, j: usize) -> Coord;

    /// 设置节点当前位置
    fn set_node_position(&mut self, j: usize, x: Coord);

    /// 节点参考（局部）坐标
    fn node_local_coord(&self, j: usize) -> Coord;

    /// 每个节点的场变量数
    fn nfield(&self) -> usize;

    /// 重设场变量数，新值为 0，方程编号为 None
    fn resize_fields(&mut self, nfield: usize);

    /// 节点场值
    fn nodal_value(&self, j: usize, field: usize) -> f64;

    /// 设置节点场值
    fn set_nodal_value(&mut self, j: usize, field: usize, value: f64);

    /// 全局方程编号，None 表示被钉住（不是未知量）
    fn eqn_number(&self, j: usize, field: usize) -> Option<usize>;

    /// 设置全局方程编号
    fn set_eqn_number(&mut self, j: usize, field: usize, eqn: Option<usize>);

    /// 把当前节点位置压入历史层
    fn push_history(&mut self);
}

/// 可均匀细分的单元
pub trait Refineable: Sized {
    /// 在局部坐标中均匀细分为 2^nlocal 个子单元
    ///
    /// 子单元节点场值由父单元插值得到，与父单元角点重合的节点保留方程编号，
    /// 新增节点的方程编号为 None，需要重新编号。
    fn split(&self) -> Vec<Self>;
}

// =========================================================================
// MeshAccess
// =========================================================================

/// 网格只读访问接口
///
/// 单元通过代际验证的 `ElementIndex` 访问；单元被删除后旧索引返回 None。
pub trait MeshAccess {
    /// 单元类型
    type Element: GeomElement;

    /// 物理维度
    fn dimension(&self) -> usize;

    /// 单元数
    fn nelement(&self) -> usize;

    /// 按网格顺序取第 i 个单元
    fn element_at(&self, i: usize) -> Option<(ElementIndex, &Self::Element)>;

    /// 按索引取单元
    fn element(&self, idx: ElementIndex) -> Option<&Self::Element>;

    /// 网格内唯一标识
    fn mesh_id(&self) -> u64;

    /// 几何版本号，任何几何或单元集合的变化都会使其递增
    fn revision(&self) -> u64;

    /// 全部单元索引（网格顺序）
    fn element_indices(&self) -> Vec<ElementIndex> {
        (0..self.nelement())
            .filter_map(|i| self.element_at(i).map(|(idx, _)| idx))
            .collect()
    }

    /// 积分点总数
    fn n_integration_points_total(&self) -> usize {
        (0..self.nelement())
            .filter_map(|i| self.element_at(i))
            .map(|(_, e)| e.n_integration_points())
            .sum()
    }
}

/// 单元可变访问
///
/// 通过此接口的修改不会改变几何版本号；若修改了几何，
/// 调用方需自行调用网格的 `mark_modified`。
pub trait MeshAccessMut: MeshAccess {
    /// 按索引取可变单元
    fn element_mut(&mut self, idx: ElementIndex) -> Option<&mut Self::Element>;
}
