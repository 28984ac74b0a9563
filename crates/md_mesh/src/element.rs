// crates/md_mesh/src/element.rs

//! 张量积 Lagrange 单元 `QElement`
//!
//! 支持 1~3 维局部坐标，每轴 2 或 3 个节点，参考域 [-1,1]^d，
//! 积分采用每轴与节点数相同的 Gauss-Legendre 点。
//!
//! 单元自己持有节点坐标、历史坐标、节点场值和方程编号，
//! 因此可以独立于网格被细分、移动或复制。

use md_geo::{Coord, Jacobian, MAX_DIM};

use crate::error::{MeshError, MeshResult};
use crate::shape::{gauss_1d, reference_node_1d, unravel, ShapeValues};
use crate::traits::{GeomElement, NodalElement, Refineable};

/// 张量积 Lagrange 单元
#[derive(Debug, Clone, PartialEq)]
pub struct QElement {
    nlocal: usize,
    ndim: usize,
    nnode_1d: usize,
    nodes: Vec<Coord>,
    /// history[k] 为时间层 k+1 的节点坐标
    history: Vec<Vec<Coord>>,
    nfield: usize,
    /// 按 (节点, 场) 平铺
    values: Vec<f64>,
    eqn: Vec<Option<usize>>,
}

impl QElement {
    /// 由节点坐标创建单元
    ///
    /// 节点按 x 最快的张量积顺序给出，数量必须为 nnode_1d^nlocal，
    /// 物理维度取第一个节点的维度且不小于 nlocal。
    pub fn new(nlocal: usize, nnode_1d: usize, nodes: Vec<Coord>) -> MeshResult<Self> {
        if nlocal == 0 || nlocal > MAX_DIM {
            return Err(MeshError::invalid_element(format!(
                "局部维度 {nlocal} 不在 1..=3 内"
            )));
        }
        if !(2..=3).contains(&nnode_1d) {
            return Err(MeshError::invalid_element(format!(
                "每轴节点数 {nnode_1d} 不受支持（只支持 2 或 3）"
            )));
        }
        let expected = nnode_1d.pow(nlocal as u32);
        if nodes.len() != expected {
            return Err(MeshError::invalid_element(format!(
                "节点数 {} 与期望 {expected} 不符",
                nodes.len()
            )));
        }
        let ndim = nodes[0].dim();
        if ndim < nlocal || nodes.iter().any(|x| x.dim() != ndim) {
            return Err(MeshError::dimension_mismatch("QElement::new", nlocal, ndim));
        }
        if nodes.iter().any(|x| !x.is_finite()) {
            return Err(MeshError::invalid_element("节点坐标含非有限值"));
        }
        Ok(Self {
            nlocal,
            ndim,
            nnode_1d,
            nodes,
            history: Vec::new(),
            nfield: 0,
            values: Vec::new(),
            eqn: Vec::new(),
        })
    }

    /// 由参考坐标到物理坐标的映射创建单元
    ///
    /// 节点位置为 `map(节点参考坐标)`，常用于结构化网格与细分。
    pub fn from_map<F>(nlocal: usize, nnode_1d: usize, map: F) -> MeshResult<Self>
    where
        F: Fn(&Coord) -> Coord,
    {
        if nlocal == 0 || nlocal > MAX_DIM || !(2..=3).contains(&nnode_1d) {
            return Err(MeshError::invalid_element(format!(
                "不支持的单元类型: nlocal={nlocal}, nnode_1d={nnode_1d}"
            )));
        }
        let nodes = (0..nnode_1d.pow(nlocal as u32))
            .map(|j| map(&reference_coord(nlocal, nnode_1d, j)))
            .collect();
        Self::new(nlocal, nnode_1d, nodes)
    }

    /// 每轴节点数
    #[inline]
    pub fn nnode_1d(&self) -> usize {
        self.nnode_1d
    }

    /// 已保存的历史层数
    #[inline]
    pub fn n_history(&self) -> usize {
        self.history.len()
    }

    /// 形函数
    pub fn shape(&self, s: &Coord) -> Option<ShapeValues> {
        ShapeValues::evaluate(self.nlocal, self.nnode_1d, s)
    }

    /// 在局部坐标处插值某个场变量
    ///
    /// 局部坐标维度错误时返回 NaN。
    pub fn interpolate_field(&self, field: usize, s: &Coord) -> f64 {
        match self.shape(s) {
            Some(shape) => (0..self.nnode())
                .map(|j| shape.psi(j) * self.nodal_value(j, field))
                .sum(),
            None => f64::NAN,
        }
    }

    /// 时间层 t 的节点坐标，超出已存层数时取最旧的一层
    fn nodes_at(&self, t: usize) -> &[Coord] {
        if t == 0 || self.history.is_empty() {
            return &self.nodes;
        }
        let k = (t - 1).min(self.history.len() - 1);
        &self.history[k]
    }

    /// 子单元局部坐标 -> 父单元局部坐标
    fn child_to_parent(child: &[usize; MAX_DIM], nlocal: usize, s: &Coord) -> Coord {
        let mut p = Coord::zeros(nlocal);
        for a in 0..nlocal {
            let shift = if child[a] == 0 { -1.0 } else { 1.0 };
            p[a] = 0.5 * (s[a] + shift);
        }
        p
    }

    /// 父单元局部坐标若恰好落在父单元节点上，返回该节点编号
    fn parent_node_at(&self, p: &Coord) -> Option<usize> {
        let half = (self.nnode_1d - 1) as f64 / 2.0;
        let mut linear = 0;
        let mut stride = 1;
        for a in 0..self.nlocal {
            let f = (p[a] + 1.0) * half;
            let j = f.round();
            if (f - j).abs() > 1e-10 {
                return None;
            }
            linear += j as usize * stride;
            stride *= self.nnode_1d;
        }
        Some(linear)
    }
}

/// 节点 j 的参考坐标
fn reference_coord(nlocal: usize, nnode_1d: usize, j: usize) -> Coord {
    let idx = unravel(j, nnode_1d, nlocal);
    let mut s = Coord::zeros(nlocal);
    for a in 0..nlocal {
        s[a] = reference_node_1d(nnode_1d, idx[a]);
    }
    s
}

impl GeomElement for QElement {
    #[inline]
    fn nlocal(&self) -> usize {
        self.nlocal
    }

    #[inline]
    fn ndim(&self) -> usize {
        self.ndim
    }

    fn position_at(&self, t: usize, s: &Coord) -> Coord {
        let Some(shape) = self.shape(s) else {
            return Coord::splat(self.ndim, f64::NAN);
        };
        let mut x = Coord::zeros(self.ndim);
        for (j, node) in self.nodes_at(t).iter().enumerate() {
            let w = shape.psi(j);
            for i in 0..self.ndim {
                x[i] += w * node[i];
            }
        }
        x
    }

    fn dposition(&self, s: &Coord) -> Jacobian {
        let mut jac = Jacobian::zeros(self.ndim, self.nlocal);
        let Some(shape) = self.shape(s) else {
            return jac;
        };
        for (j, node) in self.nodes.iter().enumerate() {
            for b in 0..self.nlocal {
                let d = shape.dpsids(j, b);
                for i in 0..self.ndim {
                    jac.add_to(i, b, node[i] * d);
                }
            }
        }
        jac
    }

    fn n_integration_points(&self) -> usize {
        self.nnode_1d.pow(self.nlocal as u32)
    }

    fn integration_point(&self, i: usize) -> Coord {
        let mut s = Coord::zeros(self.nlocal);
        if let Some((pts, _)) = gauss_1d(self.nnode_1d) {
            let idx = unravel(i, self.nnode_1d, self.nlocal);
            for a in 0..self.nlocal {
                s[a] = pts[idx[a]];
            }
        }
        s
    }

    fn integration_weight(&self, i: usize) -> f64 {
        match gauss_1d(self.nnode_1d) {
            Some((_, wts)) => {
                let idx = unravel(i, self.nnode_1d, self.nlocal);
                (0..self.nlocal).map(|a| wts[idx[a]]).product()
            }
            None => 0.0,
        }
    }

    // Lagrange 单元的节点就是角点与边中点，直接用节点包围盒
    fn characteristic_length(&self) -> f64 {
        md_geo::BoundingBox::from_points(self.ndim, &self.nodes).diagonal()
    }
}

impl NodalElement for QElement {
    #[inline]
    fn nnode(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    fn node_position(&self, j: usize) -> Coord {
        self.nodes[j]
    }

    fn set_node_position(&mut self, j: usize, x: Coord) {
        self.nodes[j] = x;
    }

    fn node_local_coord(&self, j: usize) -> Coord {
        reference_coord(self.nlocal, self.nnode_1d, j)
    }

    #[inline]
    fn nfield(&self) -> usize {
        self.nfield
    }

    fn resize_fields(&mut self, nfield: usize) {
        self.nfield = nfield;
        self.values = vec![0.0; self.nodes.len() * nfield];
        self.eqn = vec![None; self.nodes.len() * nfield];
    }

    #[inline]
    fn nodal_value(&self, j: usize, field: usize) -> f64 {
        self.values[j * self.nfield + field]
    }

    fn set_nodal_value(&mut self, j: usize, field: usize, value: f64) {
        self.values[j * self.nfield + field] = value;
    }

    #[inline]
    fn eqn_number(&self, j: usize, field: usize) -> Option<usize> {
        self.eqn[j * self.nfield + field]
    }

    fn set_eqn_number(&mut self, j: usize, field: usize, eqn: Option<usize>) {
        self.eqn[j * self.nfield + field] = eqn;
    }

    fn push_history(&mut self) {
        self.history.insert(0, self.nodes.clone());
    }
}

impl Refineable for QElement {
    fn split(&self) -> Vec<Self> {
        let nlocal = self.nlocal;
        let nchild = 1usize << nlocal;
        let nnode = self.nnode();
        let mut children = Vec::with_capacity(nchild);

        for c in 0..nchild {
            let child = unravel(c, 2, nlocal);
            let parent_s: Vec<Coord> = (0..nnode)
                .map(|j| {
                    let r = reference_coord(nlocal, self.nnode_1d, j);
                    Self::child_to_parent(&child, nlocal, &r)
                })
                .collect();

            let nodes = parent_s.iter().map(|p| self.position(p)).collect();
            let history = (1..=self.history.len())
                .map(|t| parent_s.iter().map(|p| self.position_at(t, p)).collect())
                .collect();

            let mut values = Vec::with_capacity(nnode * self.nfield);
            let mut eqn = Vec::with_capacity(nnode * self.nfield);
            for p in &parent_s {
                let coincident = self.parent_node_at(p);
                for f in 0..self.nfield {
                    match coincident {
                        Some(pj) => {
                            values.push(self.nodal_value(pj, f));
                            eqn.push(self.eqn_number(pj, f));
                        }
                        None => {
                            values.push(self.interpolate_field(f, p));
                            eqn.push(None);
                        }
                    }
                }
            }

            children.push(Self {
                nlocal,
                ndim: self.ndim,
                nnode_1d: self.nnode_1d,
                nodes,
                history,
                nfield: self.nfield,
                values,
                eqn,
            });
        }
        children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::InversionFailure;
    use md_config::LocateConfig;

    fn unit_square() -> QElement {
        // [0,1]^2
        QElement::from_map(2, 2, |s| Coord::new2(0.5 * (s[0] + 1.0), 0.5 * (s[1] + 1.0)))
            .unwrap()
    }

    #[test]
    fn test_invalid_node_count() {
        let err = QElement::new(2, 2, vec![Coord::new2(0.0, 0.0); 3]);
        assert!(err.is_err());
        assert!(QElement::new(2, 4, vec![Coord::new2(0.0, 0.0); 16]).is_err());
    }

    #[test]
    fn test_position_and_jacobian() {
        let e = unit_square();
        let x = e.position(&Coord::new2(0.0, 0.0));
        assert!((x[0] - 0.5).abs() < 1e-14 && (x[1] - 0.5).abs() < 1e-14);
        let jac = e.dposition(&Coord::new2(0.3, 0.3));
        assert!((jac.get(0, 0) - 0.5).abs() < 1e-14);
        assert!(jac.get(0, 1).abs() < 1e-14);
        assert!((jac.volume_factor() - 0.25).abs() < 1e-14);
    }

    #[test]
    fn test_integration_weights_sum_to_reference_volume() {
        for (nlocal, n1d) in [(1, 2), (2, 3), (3, 2)] {
            let e = QElement::from_map(nlocal, n1d, |s| *s).unwrap();
            let sum: f64 = (0..e.n_integration_points())
                .map(|i| e.integration_weight(i))
                .sum();
            assert!((sum - 2f64.powi(nlocal as i32)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_locate_local_bilinear() {
        // 一般四边形
        let e = QElement::new(
            2,
            2,
            vec![
                Coord::new2(0.0, 0.0),
                Coord::new2(2.0, 0.2),
                Coord::new2(0.1, 1.0),
                Coord::new2(1.8, 1.5),
            ],
        )
        .unwrap();
        let s = Coord::new2(0.3, -0.7);
        let x = e.position(&s);
        let found = e
            .locate_local(&x, &Coord::zeros(2), &LocateConfig::default())
            .unwrap();
        assert!(found.distance(&s) < 1e-8);
    }

    #[test]
    fn test_locate_local_outside() {
        let e = unit_square();
        let res = e.locate_local(
            &Coord::new2(1.5, 0.5),
            &Coord::zeros(2),
            &LocateConfig::default(),
        );
        assert_eq!(res, Err(InversionFailure::OutsideReference));
    }

    #[test]
    fn test_locate_local_overshoot_tolerance() {
        let e = unit_square();
        let config = LocateConfig::default();
        let tol = config.overshoot_tolerance;

        // 越界量在容差内：接受并截断到 s0 = 1
        let x = e.position(&Coord::new2(1.0 + 0.5 * tol, 0.2));
        let s = e.locate_local(&x, &Coord::zeros(2), &config).unwrap();
        assert_eq!(s[0], 1.0);
        assert!((s[1] - 0.2).abs() < 1e-12);

        // 越界量超过容差：拒绝
        let x = e.position(&Coord::new2(1.0 + 2.0 * tol, 0.2));
        let res = e.locate_local(&x, &Coord::zeros(2), &config);
        assert_eq!(res, Err(InversionFailure::OutsideReference));
    }

    #[test]
    fn test_degenerate_element_reports_singular() {
        let e = QElement::new(2, 2, vec![Coord::new2(0.0, 0.0); 4]).unwrap();
        let res = e.locate_local(
            &Coord::new2(0.0, 0.0),
            &Coord::zeros(2),
            &LocateConfig::default(),
        );
        assert_eq!(res, Err(InversionFailure::Singular));
    }

    #[test]
    fn test_history_levels() {
        let mut e = unit_square();
        e.push_history();
        for j in 0..e.nnode() {
            let x = e.node_position(j);
            e.set_node_position(j, x + Coord::new2(1.0, 0.0));
        }
        let s = Coord::new2(0.0, 0.0);
        assert!((e.position_at(0, &s)[0] - 1.5).abs() < 1e-14);
        assert!((e.position_at(1, &s)[0] - 0.5).abs() < 1e-14);
        // 超出历史层数取最旧层
        assert!((e.position_at(5, &s)[0] - 0.5).abs() < 1e-14);
    }

    #[test]
    fn test_split_covers_parent() {
        let mut e = unit_square();
        e.resize_fields(1);
        for j in 0..e.nnode() {
            let x = e.node_position(j);
            e.set_nodal_value(j, 0, x[0] + 2.0 * x[1]);
            e.set_eqn_number(j, 0, Some(j));
        }
        let children = e.split();
        assert_eq!(children.len(), 4);
        let area: f64 = children
            .iter()
            .map(|c| c.dposition(&Coord::zeros(2)).volume_factor() * 4.0)
            .sum();
        assert!((area - 1.0).abs() < 1e-12);

        // 线性场被精确继承
        for c in &children {
            let x = c.position(&Coord::new2(0.1, 0.2));
            let v = c.interpolate_field(0, &Coord::new2(0.1, 0.2));
            assert!((v - (x[0] + 2.0 * x[1])).abs() < 1e-12);
        }
        // 角点保留编号，中点编号为空
        assert_eq!(children[0].eqn_number(0, 0), Some(0));
        assert_eq!(children[0].eqn_number(1, 0), None);
    }

    #[test]
    fn test_quadratic_split_keeps_midside_numbers() {
        let mut e = QElement::from_map(1, 3, |s| Coord::new1(s[0])).unwrap();
        e.resize_fields(1);
        for j in 0..3 {
            e.set_eqn_number(j, 0, Some(10 + j));
        }
        let children = e.split();
        // 左子单元节点位于父坐标 -1, -0.5, 0
        assert_eq!(children[0].eqn_number(0, 0), Some(10));
        assert_eq!(children[0].eqn_number(1, 0), None);
        assert_eq!(children[0].eqn_number(2, 0), Some(11));
    }
}
