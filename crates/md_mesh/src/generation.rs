// crates/md_mesh/src/generation.rs

//! 网格生成模块
//!
//! 提供简单的结构化网格生成工具，用于测试、验证与演示：
//!
//! - [`BoxMeshGenerator`]: 1~3 维轴对齐盒子上的结构化 Q 单元网格
//! - [`structured_line_mesh`] / [`rectangular_quad_mesh`] / [`brick_mesh`]: 常用快捷函数
//!
//! # 使用示例
//!
//! ```rust
//! use md_mesh::generation::rectangular_quad_mesh;
//! use md_mesh::traits::MeshAccess;
//!
//! // 4x2 个双线性单元覆盖 [0,2]x[0,1]
//! let mesh = rectangular_quad_mesh(4, 2, 2.0, 1.0, 2).unwrap();
//! assert_eq!(mesh.nelement(), 8);
//! ```

use md_geo::{Coord, MAX_DIM};

use crate::element::QElement;
use crate::error::{MeshError, MeshResult};
use crate::mesh::ElementMesh;
use crate::shape::unravel;
use crate::traits::NodalElement;

/// 轴对齐盒子结构化网格生成器
///
/// 单元按 x 最快的顺序编号；全局节点按同样顺序编号，
/// 节点 (i, j, k) 的编号用于分配方程编号。
#[derive(Debug, Clone)]
pub struct BoxMeshGenerator {
    counts: Vec<usize>,
    lengths: Vec<f64>,
    origin: Coord,
    nnode_1d: usize,
}

impl BoxMeshGenerator {
    /// 创建生成器
    ///
    /// # 参数
    ///
    /// - `counts`: 各轴单元数
    /// - `lengths`: 各轴域长度
    pub fn new(counts: &[usize], lengths: &[f64]) -> Self {
        Self {
            counts: counts.to_vec(),
            lengths: lengths.to_vec(),
            origin: Coord::zeros(counts.len()),
            nnode_1d: 2,
        }
    }

    /// 设置原点
    pub fn with_origin(mut self, origin: Coord) -> Self {
        self.origin = origin;
        self
    }

    /// 设置每轴节点数（2 线性，3 二次）
    pub fn with_nnode_1d(mut self, nnode_1d: usize) -> Self {
        self.nnode_1d = nnode_1d;
        self
    }

    /// 维度
    pub fn dim(&self) -> usize {
        self.counts.len()
    }

    /// 单元总数
    pub fn n_elements(&self) -> usize {
        self.counts.iter().product()
    }

    /// 每轴全局节点数
    fn nodes_per_axis(&self, a: usize) -> usize {
        self.counts[a] * (self.nnode_1d - 1) + 1
    }

    fn validate(&self) -> MeshResult<()> {
        let dim = self.dim();
        if dim == 0 || dim > MAX_DIM {
            return Err(MeshError::invalid_element(format!("不支持的维度 {dim}")));
        }
        if self.lengths.len() != dim {
            return Err(MeshError::dimension_mismatch(
                "BoxMeshGenerator::lengths",
                dim,
                self.lengths.len(),
            ));
        }
        if self.origin.dim() != dim {
            return Err(MeshError::dimension_mismatch(
                "BoxMeshGenerator::origin",
                dim,
                self.origin.dim(),
            ));
        }
        if self.counts.iter().any(|&n| n == 0) {
            return Err(MeshError::invalid_element("每轴单元数必须为正"));
        }
        if self.lengths.iter().any(|&l| !(l.is_finite() && l > 0.0)) {
            return Err(MeshError::invalid_element("域长度必须为有限正数"));
        }
        Ok(())
    }

    /// 单元 e 的局部 -> 物理映射参数（左下角与边长）
    fn element_box(&self, e: usize) -> (Coord, Coord) {
        let dim = self.dim();
        let mut lo = self.origin;
        let mut h = Coord::zeros(dim);
        let mut rest = e;
        for a in 0..dim {
            let i = rest % self.counts[a];
            rest /= self.counts[a];
            h[a] = self.lengths[a] / self.counts[a] as f64;
            lo[a] += i as f64 * h[a];
        }
        (lo, h)
    }

    /// 生成网格（不带场变量）
    pub fn build(&self) -> MeshResult<ElementMesh<QElement>> {
        self.validate()?;
        let dim = self.dim();
        let mut mesh = ElementMesh::new(dim);
        for e in 0..self.n_elements() {
            let (lo, h) = self.element_box(e);
            let element = QElement::from_map(dim, self.nnode_1d, |s| {
                let mut x = lo;
                for a in 0..dim {
                    x[a] += 0.5 * (s[a] + 1.0) * h[a];
                }
                x
            })?;
            mesh.add_element(element)?;
        }
        Ok(mesh)
    }

    /// 生成网格并按位置设置场值，每个全局节点的每个场都分配一个方程编号
    ///
    /// `pinned(x)` 返回 true 的节点不分配方程编号（如 Dirichlet 边界）。
    pub fn build_with_field<F, P>(
        &self,
        nfield: usize,
        values: F,
        pinned: P,
    ) -> MeshResult<ElementMesh<QElement>>
    where
        F: Fn(&Coord) -> Vec<f64>,
        P: Fn(&Coord) -> bool,
    {
        let mut mesh = self.build()?;
        mesh.set_nodal_field(nfield, values);

        let dim = self.dim();
        let n1 = self.nnode_1d;
        let mut global_dof = 0usize;
        let total_nodes: usize = (0..dim).map(|a| self.nodes_per_axis(a)).product();
        let mut node_eqn: Vec<Option<usize>> = vec![None; total_nodes * nfield];
        let mut assigned = vec![false; total_nodes];

        let counts = self.counts.clone();
        let mut e = 0usize;
        mesh.for_each_mut(|_, element| {
            let elem_multi = unravel_mixed(e, &counts);
            for j in 0..element.nnode() {
                let local = unravel(j, n1, dim);
                let mut global = 0usize;
                let mut stride = 1usize;
                for a in 0..dim {
                    let g = elem_multi[a] * (n1 - 1) + local[a];
                    global += g * stride;
                    stride *= counts[a] * (n1 - 1) + 1;
                }
                if !assigned[global] {
                    assigned[global] = true;
                    if !pinned(&element.node_position(j)) {
                        for f in 0..nfield {
                            node_eqn[global * nfield + f] = Some(global_dof);
                            global_dof += 1;
                        }
                    }
                }
                for f in 0..nfield {
                    element.set_eqn_number(j, f, node_eqn[global * nfield + f]);
                }
            }
            e += 1;
        });

        tracing::debug!(
            elements = self.n_elements(),
            nodes = total_nodes,
            dofs = global_dof,
            "结构化网格生成完成"
        );
        Ok(mesh)
    }
}

/// 混合进制展开（各轴基数不同）
fn unravel_mixed(mut linear: usize, counts: &[usize]) -> [usize; MAX_DIM] {
    let mut out = [0; MAX_DIM];
    for (a, &n) in counts.iter().enumerate() {
        out[a] = linear % n;
        linear /= n;
    }
    out
}

/// [x0, x1] 上 n 个一维单元
pub fn structured_line_mesh(
    n: usize,
    x0: f64,
    x1: f64,
    nnode_1d: usize,
) -> MeshResult<ElementMesh<QElement>> {
    BoxMeshGenerator::new(&[n], &[x1 - x0])
        .with_origin(Coord::new1(x0))
        .with_nnode_1d(nnode_1d)
        .build()
}

/// [0,lx]x[0,ly] 上 nx*ny 个四边形单元
pub fn rectangular_quad_mesh(
    nx: usize,
    ny: usize,
    lx: f64,
    ly: f64,
    nnode_1d: usize,
) -> MeshResult<ElementMesh<QElement>> {
    BoxMeshGenerator::new(&[nx, ny], &[lx, ly])
        .with_nnode_1d(nnode_1d)
        .build()
}

/// [0,lx]x[0,ly]x[0,lz] 上 nx*ny*nz 个六面体单元
pub fn brick_mesh(
    counts: [usize; 3],
    lengths: [f64; 3],
    nnode_1d: usize,
) -> MeshResult<ElementMesh<QElement>> {
    BoxMeshGenerator::new(&counts, &lengths)
        .with_nnode_1d(nnode_1d)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{GeomElement, MeshAccess};

    #[test]
    fn test_line_mesh() {
        let mesh = structured_line_mesh(4, -1.0, 3.0, 3).unwrap();
        assert_eq!(mesh.nelement(), 4);
        assert_eq!(mesh.dimension(), 1);
        let (_, last) = mesh.element_at(3).unwrap();
        assert!((last.position(&Coord::new1(1.0))[0] - 3.0).abs() < 1e-14);
    }

    #[test]
    fn test_quad_mesh_covers_domain() {
        let mesh = rectangular_quad_mesh(3, 2, 3.0, 1.0, 2).unwrap();
        let area: f64 = mesh
            .iter()
            .map(|(_, e)| {
                (0..e.n_integration_points())
                    .map(|i| {
                        e.integration_weight(i)
                            * e.dposition(&e.integration_point(i)).volume_factor()
                    })
                    .sum::<f64>()
            })
            .sum();
        assert!((area - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_brick_mesh() {
        let mesh = brick_mesh([2, 2, 2], [1.0, 1.0, 1.0], 2).unwrap();
        assert_eq!(mesh.nelement(), 8);
        assert_eq!(mesh.dimension(), 3);
    }

    #[test]
    fn test_invalid_generator() {
        assert!(rectangular_quad_mesh(0, 2, 1.0, 1.0, 2).is_err());
        assert!(rectangular_quad_mesh(2, 2, -1.0, 1.0, 2).is_err());
        assert!(rectangular_quad_mesh(2, 2, 1.0, 1.0, 4).is_err());
    }

    #[test]
    fn test_shared_nodes_share_equations() {
        let mesh = BoxMeshGenerator::new(&[2, 1], &[2.0, 1.0])
            .build_with_field(1, |x| vec![x[0]], |_| false)
            .unwrap();
        let (_, left) = mesh.element_at(0).unwrap();
        let (_, right) = mesh.element_at(1).unwrap();
        // 左单元右下角 (节点 1) 与右单元左下角 (节点 0) 重合
        assert_eq!(left.eqn_number(1, 0), right.eqn_number(0, 0));
        assert!(left.eqn_number(1, 0).is_some());
        // 3x2 个全局节点
        let max_eqn = mesh
            .iter()
            .flat_map(|(_, e)| (0..e.nnode()).filter_map(move |j| e.eqn_number(j, 0)))
            .max();
        assert_eq!(max_eqn, Some(5));
    }

    #[test]
    fn test_pinned_nodes() {
        let mesh = BoxMeshGenerator::new(&[2], &[1.0])
            .build_with_field(1, |_| vec![0.0], |x| x[0] < 1e-12)
            .unwrap();
        let (_, first) = mesh.element_at(0).unwrap();
        assert_eq!(first.eqn_number(0, 0), None);
        assert_eq!(first.eqn_number(1, 0), Some(0));
    }
}
