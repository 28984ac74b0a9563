// crates/md_mesh/src/mesh.rs

//! 单元网格容器 `ElementMesh`
//!
//! 单元存放在代际验证池中，网格顺序另由 `order` 记录；
//! 细分时子单元占据父单元在网格顺序中的位置，保证遍历顺序稳定。
//!
//! 每次几何或单元集合变化都会递增 `revision`，分箱索引据此判断是否过期。

use std::sync::atomic::{AtomicU64, Ordering};

use md_foundation::{ElementIndex, ElementTag, SafeArena};
use md_geo::Coord;

use crate::error::{MeshError, MeshResult};
use crate::traits::{GeomElement, MeshAccess, MeshAccessMut, NodalElement, Refineable};

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

fn next_mesh_id() -> u64 {
    NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed)
}

/// 单元网格
#[derive(Debug)]
pub struct ElementMesh<E> {
    id: u64,
    dim: usize,
    elements: SafeArena<E, ElementTag>,
    order: Vec<ElementIndex>,
    revision: u64,
}

// 克隆得到的是一个新网格，分配新的 id
impl<E: Clone> Clone for ElementMesh<E> {
    fn clone(&self) -> Self {
        Self {
            id: next_mesh_id(),
            dim: self.dim,
            elements: self.elements.clone(),
            order: self.order.clone(),
            revision: 0,
        }
    }
}

impl<E: GeomElement> ElementMesh<E> {
    /// 创建空网格
    pub fn new(dim: usize) -> Self {
        Self {
            id: next_mesh_id(),
            dim,
            elements: SafeArena::new(),
            order: Vec::new(),
            revision: 0,
        }
    }

    /// 由单元列表创建网格
    pub fn from_elements(dim: usize, elements: impl IntoIterator<Item = E>) -> MeshResult<Self> {
        let mut mesh = Self::new(dim);
        for e in elements {
            mesh.add_element(e)?;
        }
        Ok(mesh)
    }

    /// 添加单元，物理维度必须与网格一致
    pub fn add_element(&mut self, element: E) -> MeshResult<ElementIndex> {
        if element.ndim() != self.dim {
            return Err(MeshError::dimension_mismatch(
                "ElementMesh::add_element",
                self.dim,
                element.ndim(),
            ));
        }
        let idx = self.elements.insert(element);
        self.order.push(idx);
        self.revision += 1;
        Ok(idx)
    }

    /// 移除单元，返回被移除的单元
    pub fn remove_element(&mut self, idx: ElementIndex) -> Option<E> {
        let element = self.elements.remove(idx)?;
        self.order.retain(|&i| i != idx);
        self.revision += 1;
        Some(element)
    }

    /// 遍历单元（网格顺序）
    pub fn iter(&self) -> impl Iterator<Item = (ElementIndex, &E)> + '_ {
        self.order
            .iter()
            .filter_map(move |&idx| self.elements.get(idx).map(|e| (idx, e)))
    }

    /// 可变遍历单元（网格顺序），不改变版本号
    pub fn for_each_mut<F: FnMut(ElementIndex, &mut E)>(&mut self, mut f: F) {
        for &idx in &self.order {
            if let Some(e) = self.elements.get_mut(idx) {
                f(idx, e);
            }
        }
    }

    /// 索引是否仍有效
    pub fn contains(&self, idx: ElementIndex) -> bool {
        self.elements.contains(idx)
    }

    /// 单元在网格顺序中的位置
    pub fn position_in_order(&self, idx: ElementIndex) -> Option<usize> {
        self.order.iter().position(|&i| i == idx)
    }

    /// 标记几何已被修改
    pub fn mark_modified(&mut self) {
        self.revision += 1;
    }

    /// 网格内所有单元的积分点物理坐标
    pub fn integration_point_positions(&self) -> Vec<(ElementIndex, usize, Coord)> {
        let mut out = Vec::new();
        for (idx, e) in self.iter() {
            for ipt in 0..e.n_integration_points() {
                out.push((idx, ipt, e.position(&e.integration_point(ipt))));
            }
        }
        out
    }
}

impl<E: GeomElement + Refineable> ElementMesh<E> {
    /// 把一个单元细分为 2^d 个子单元
    ///
    /// 父单元索引失效，子单元按细分顺序占据父单元在网格顺序中的位置。
    pub fn split_element(&mut self, idx: ElementIndex) -> MeshResult<Vec<ElementIndex>> {
        let pos = self
            .position_in_order(idx)
            .ok_or(MeshError::ElementNotFound(idx))?;
        let parent = self
            .elements
            .remove(idx)
            .ok_or(MeshError::ElementNotFound(idx))?;

        let children: Vec<ElementIndex> = parent
            .split()
            .into_iter()
            .map(|child| self.elements.insert(child))
            .collect();
        self.order.remove(pos);
        for (k, &child) in children.iter().enumerate() {
            self.order.insert(pos + k, child);
        }
        self.revision += 1;

        tracing::debug!(
            mesh = self.id,
            parent = %idx,
            children = children.len(),
            "单元细分"
        );
        Ok(children)
    }
}

impl<E: GeomElement + NodalElement> ElementMesh<E> {
    /// 用映射移动所有节点（如网格变形），版本号递增
    pub fn map_nodes<F: Fn(&Coord) -> Coord>(&mut self, f: F) {
        for (_, e) in self.elements.iter_mut() {
            for j in 0..e.nnode() {
                let x = e.node_position(j);
                e.set_node_position(j, f(&x));
            }
        }
        self.revision += 1;
    }

    /// 所有单元保存当前节点位置到历史层
    pub fn push_history(&mut self) {
        for (_, e) in self.elements.iter_mut() {
            e.push_history();
        }
    }

    /// 按节点位置设置场值（会重设场变量数并清空方程编号）
    pub fn set_nodal_field<F>(&mut self, nfield: usize, f: F)
    where
        F: Fn(&Coord) -> Vec<f64>,
    {
        for (_, e) in self.elements.iter_mut() {
            e.resize_fields(nfield);
            for j in 0..e.nnode() {
                let values = f(&e.node_position(j));
                for (field, v) in values.into_iter().take(nfield).enumerate() {
                    e.set_nodal_value(j, field, v);
                }
            }
        }
    }
}

impl<E: GeomElement> MeshAccess for ElementMesh<E> {
    type Element = E;

    #[inline]
    fn dimension(&self) -> usize {
        self.dim
    }

    #[inline]
    fn nelement(&self) -> usize {
        self.order.len()
    }

    fn element_at(&self, i: usize) -> Option<(ElementIndex, &E)> {
        let idx = *self.order.get(i)?;
        self.elements.get(idx).map(|e| (idx, e))
    }

    #[inline]
    fn element(&self, idx: ElementIndex) -> Option<&E> {
        self.elements.get(idx)
    }

    #[inline]
    fn mesh_id(&self) -> u64 {
        self.id
    }

    #[inline]
    fn revision(&self) -> u64 {
        self.revision
    }

    fn element_indices(&self) -> Vec<ElementIndex> {
        self.order.clone()
    }
}

impl<E: GeomElement> MeshAccessMut for ElementMesh<E> {
    #[inline]
    fn element_mut(&mut self, idx: ElementIndex) -> Option<&mut E> {
        self.elements.get_mut(idx)
    }
}
