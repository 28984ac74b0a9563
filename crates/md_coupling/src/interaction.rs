// crates/md_coupling/src/interaction.rs

//! 外部交互存储
//!
//! 消费网格的每个单元为每个 (交互槽位, 积分点) 保存一条记录，
//! 指向生产网格中定位到的单元及其局部坐标。记录只引用生产单元，不拥有它；
//! 生产网格细分或重分布后，记录需由耦合驱动重新生成。
//!
//! 存储按 `slot * nipt + ipt` 平铺。

use md_foundation::ElementIndex;
use md_geo::{Coord, Jacobian};
use md_mesh::{ElementMesh, GeomElement, MeshResult, NodalElement, Refineable};
use serde::{Deserialize, Serialize};

use crate::error::{CouplingError, CouplingResult};

// ============================================================
// 记录
// ============================================================

/// 定位成功的交互记录
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    /// 生产单元所在进程（串行时为 0）
    pub rank: usize,
    /// 生产单元
    pub element: ElementIndex,
    /// 生产单元中的局部坐标
    pub local: Coord,
}

/// 一个 (槽位, 积分点) 的交互状态
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ExternalInteraction {
    /// 尚未设置
    #[default]
    Unset,
    /// 点不在生产网格内
    NotFound,
    /// 已定位
    Located(InteractionRecord),
}

impl ExternalInteraction {
    /// 是否已定位
    #[inline]
    pub fn is_located(&self) -> bool {
        matches!(self, Self::Located(_))
    }

    /// 定位记录
    #[inline]
    pub fn record(&self) -> Option<&InteractionRecord> {
        match self {
            Self::Located(record) => Some(record),
            _ => None,
        }
    }
}

/// 交互状态计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteractionCounts {
    /// 已定位
    pub located: usize,
    /// 未找到
    pub not_found: usize,
    /// 未设置
    pub unset: usize,
}

// ============================================================
// 存储
// ============================================================

/// 单个消费单元的交互存储
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalInteractionStore {
    n_interactions: usize,
    nipt: usize,
    source_dim: usize,
    entries: Vec<ExternalInteraction>,
}

impl ExternalInteractionStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 分配 `n_interactions × nipt` 条记录
    ///
    /// 积分点数和源局部维度不变时保留已有槽位的记录，否则全部重置为 `Unset`。
    pub fn reserve(&mut self, n_interactions: usize, nipt: usize, source_dim: usize) {
        let keep = nipt == self.nipt && source_dim == self.source_dim;
        let mut entries = vec![ExternalInteraction::Unset; n_interactions * nipt];
        if keep {
            let n = self.n_interactions.min(n_interactions) * nipt;
            entries[..n].copy_from_slice(&self.entries[..n]);
        }
        self.n_interactions = n_interactions;
        self.nipt = nipt;
        self.source_dim = source_dim;
        self.entries = entries;
    }

    /// 交互槽位数
    #[inline]
    pub fn n_interactions(&self) -> usize {
        self.n_interactions
    }

    /// 积分点数
    #[inline]
    pub fn n_integration_points(&self) -> usize {
        self.nipt
    }

    /// 源单元局部坐标维度
    #[inline]
    pub fn source_dim(&self) -> usize {
        self.source_dim
    }

    /// 是否满足给定的形状
    pub fn fits(&self, n_interactions: usize, nipt: usize, source_dim: usize) -> bool {
        self.n_interactions >= n_interactions && self.nipt == nipt && self.source_dim == source_dim
    }

    fn offset(&self, slot: usize, ipt: usize) -> CouplingResult<usize> {
        if slot >= self.n_interactions || ipt >= self.nipt {
            return Err(CouplingError::OutOfRange {
                slot,
                ipt,
                n_slots: self.n_interactions,
                n_ipt: self.nipt,
            });
        }
        Ok(slot * self.nipt + ipt)
    }

    /// 写入定位记录（重复写入以最后一次为准）
    pub fn set(
        &mut self,
        slot: usize,
        ipt: usize,
        element: ElementIndex,
        local: Coord,
    ) -> CouplingResult<()> {
        self.set_record(
            slot,
            ipt,
            InteractionRecord {
                rank: 0,
                element,
                local,
            },
        )
    }

    /// 写入带进程号的定位记录
    pub fn set_record(
        &mut self,
        slot: usize,
        ipt: usize,
        record: InteractionRecord,
    ) -> CouplingResult<()> {
        if record.local.dim() != self.source_dim {
            return Err(CouplingError::LocalDimMismatch {
                expected: self.source_dim,
                actual: record.local.dim(),
            });
        }
        let k = self.offset(slot, ipt)?;
        self.entries[k] = ExternalInteraction::Located(record);
        Ok(())
    }

    /// 标记为未找到
    pub fn set_not_found(&mut self, slot: usize, ipt: usize) -> CouplingResult<()> {
        let k = self.offset(slot, ipt)?;
        self.entries[k] = ExternalInteraction::NotFound;
        Ok(())
    }

    /// 读取定位记录；未设置、未找到或越界时返回 None
    pub fn get(&self, slot: usize, ipt: usize) -> Option<&InteractionRecord> {
        self.entry(slot, ipt).ok()?.record()
    }

    /// 读取交互状态
    pub fn entry(&self, slot: usize, ipt: usize) -> CouplingResult<&ExternalInteraction> {
        let k = self.offset(slot, ipt)?;
        Ok(&self.entries[k])
    }

    /// 某个槽位的全部积分点
    pub fn slot_entries(&self, slot: usize) -> &[ExternalInteraction] {
        if slot >= self.n_interactions {
            return &[];
        }
        &self.entries[slot * self.nipt..(slot + 1) * self.nipt]
    }

    /// 把所有记录重置为 `Unset`，保留形状
    pub fn invalidate(&mut self) {
        self.entries.fill(ExternalInteraction::Unset);
    }

    /// 统计各状态的数量
    pub fn counts(&self) -> InteractionCounts {
        let mut counts = InteractionCounts::default();
        for entry in &self.entries {
            match entry {
                ExternalInteraction::Unset => counts.unset += 1,
                ExternalInteraction::NotFound => counts.not_found += 1,
                ExternalInteraction::Located(_) => counts.located += 1,
            }
        }
        counts
    }
}

// ============================================================
// 带交互存储的单元
// ============================================================

/// 持有外部交互存储的单元
pub trait ElementWithExternalElement: GeomElement {
    /// 交互存储
    fn interaction_store(&self) -> &ExternalInteractionStore;

    /// 可变交互存储
    fn interaction_store_mut(&mut self) -> &mut ExternalInteractionStore;

    /// 为 `n_interactions` 个交互分配存储，积分点数取自单元
    fn reserve_interaction_storage(&mut self, n_interactions: usize, source_dim: usize) {
        let nipt = self.n_integration_points();
        self.interaction_store_mut()
            .reserve(n_interactions, nipt, source_dim);
    }

    /// 读取 (槽位, 积分点) 的定位记录
    fn get_interaction(&self, slot: usize, ipt: usize) -> Option<&InteractionRecord> {
        self.interaction_store().get(slot, ipt)
    }
}

/// 给任意几何单元附加交互存储
///
/// 几何、节点与细分都委托给内部单元；细分得到的子单元交互存储为空。
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalElement<E> {
    inner: E,
    store: ExternalInteractionStore,
}

impl<E> ExternalElement<E> {
    /// 包装单元
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            store: ExternalInteractionStore::new(),
        }
    }

    /// 内部单元
    #[inline]
    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// 可变内部单元
    #[inline]
    pub fn inner_mut(&mut self) -> &mut E {
        &mut self.inner
    }

    /// 取出内部单元
    pub fn into_inner(self) -> E {
        self.inner
    }
}

impl<E: GeomElement + Clone> ExternalElement<E> {
    /// 把网格中的每个单元包装为带交互存储的单元（网格顺序不变）
    pub fn wrap_mesh(mesh: &ElementMesh<E>) -> MeshResult<ElementMesh<Self>> {
        ElementMesh::from_elements(
            md_mesh::MeshAccess::dimension(mesh),
            mesh.iter().map(|(_, e)| Self::new(e.clone())),
        )
    }
}

impl<E: GeomElement> GeomElement for ExternalElement<E> {
    #[inline]
    fn nlocal(&self) -> usize {
        self.inner.nlocal()
    }

    #[inline]
    fn ndim(&self) -> usize {
        self.inner.ndim()
    }

    #[inline]
    fn position_at(&self, t: usize, s: &Coord) -> Coord {
        self.inner.position_at(t, s)
    }

    #[inline]
    fn dposition(&self, s: &Coord) -> Jacobian {
        self.inner.dposition(s)
    }

    #[inline]
    fn n_integration_points(&self) -> usize {
        self.inner.n_integration_points()
    }

    #[inline]
    fn integration_point(&self, i: usize) -> Coord {
        self.inner.integration_point(i)
    }

    #[inline]
    fn integration_weight(&self, i: usize) -> f64 {
        self.inner.integration_weight(i)
    }

    fn characteristic_length(&self) -> f64 {
        self.inner.characteristic_length()
    }
}

impl<E: NodalElement> NodalElement for ExternalElement<E> {
    fn nnode(&self) -> usize {
        self.inner.nnode()
    }

    fn node_position(&self, j: usize) -> Coord {
        self.inner.node_position(j)
    }

    fn set_node_position(&mut self, j: usize, x: Coord) {
        self.inner.set_node_position(j, x);
    }

    fn node_local_coord(&self, j: usize) -> Coord {
        self.inner.node_local_coord(j)
    }

    fn nfield(&self) -> usize {
        self.inner.nfield()
    }

    fn resize_fields(&mut self, nfield: usize) {
        self.inner.resize_fields(nfield);
    }

    fn nodal_value(&self, j: usize, field: usize) -> f64 {
        self.inner.nodal_value(j, field)
    }

    fn set_nodal_value(&mut self, j: usize, field: usize, value: f64) {
        self.inner.set_nodal_value(j, field, value);
    }

    fn eqn_number(&self, j: usize, field: usize) -> Option<usize> {
        self.inner.eqn_number(j, field)
    }

    fn set_eqn_number(&mut self, j: usize, field: usize, eqn: Option<usize>) {
        self.inner.set_eqn_number(j, field, eqn);
    }

    fn push_history(&mut self) {
        self.inner.push_history();
    }
}

impl<E: Refineable> Refineable for ExternalElement<E> {
    fn split(&self) -> Vec<Self> {
        self.inner.split().into_iter().map(Self::new).collect()
    }
}

impl<E: GeomElement> ElementWithExternalElement for ExternalElement<E> {
    #[inline]
    fn interaction_store(&self) -> &ExternalInteractionStore {
        &self.store
    }

    #[inline]
    fn interaction_store_mut(&mut self) -> &mut ExternalInteractionStore {
        &mut self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use md_mesh::generation::rectangular_quad_mesh;
    use md_mesh::{MeshAccess, QElement};

    #[test]
    fn test_set_and_get() {
        let mut store = ExternalInteractionStore::new();
        store.reserve(2, 4, 2);
        let e = ElementIndex::new(3, 1);
        store.set(1, 2, e, Coord::new2(0.1, -0.2)).unwrap();

        let record = store.get(1, 2).unwrap();
        assert_eq!(record.element, e);
        assert_eq!(record.rank, 0);
        assert!(store.get(0, 2).is_none());
        assert_eq!(store.counts().located, 1);
        assert_eq!(store.counts().unset, 7);
    }

    #[test]
    fn test_last_write_wins() {
        let mut store = ExternalInteractionStore::new();
        store.reserve(1, 1, 1);
        store.set(0, 0, ElementIndex::new(0, 1), Coord::new1(0.5)).unwrap();
        store.set(0, 0, ElementIndex::new(1, 1), Coord::new1(-0.5)).unwrap();
        assert_eq!(store.get(0, 0).map(|r| r.element), Some(ElementIndex::new(1, 1)));
        store.set_not_found(0, 0).unwrap();
        assert_eq!(store.entry(0, 0).unwrap(), &ExternalInteraction::NotFound);
    }

    #[test]
    fn test_out_of_range_and_dim_checked() {
        let mut store = ExternalInteractionStore::new();
        store.reserve(1, 2, 2);
        let e = ElementIndex::new(0, 1);
        assert!(matches!(
            store.set(1, 0, e, Coord::new2(0.0, 0.0)),
            Err(CouplingError::OutOfRange { .. })
        ));
        assert!(matches!(
            store.set(0, 0, e, Coord::new1(0.0)),
            Err(CouplingError::LocalDimMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_reserve_keeps_compatible_slots() {
        let mut store = ExternalInteractionStore::new();
        store.reserve(1, 2, 1);
        store.set(0, 1, ElementIndex::new(0, 1), Coord::new1(0.0)).unwrap();
        store.reserve(2, 2, 1);
        assert!(store.get(0, 1).is_some());
        store.reserve(2, 3, 1);
        assert!(store.get(0, 1).is_none());
    }

    #[test]
    fn test_invalidate() {
        let mut store = ExternalInteractionStore::new();
        store.reserve(1, 2, 1);
        store.set_not_found(0, 0).unwrap();
        store.invalidate();
        assert_eq!(store.counts().unset, 2);
        assert_eq!(store.slot_entries(0).len(), 2);
    }

    #[test]
    fn test_wrapped_element_delegates() {
        let mesh = rectangular_quad_mesh(2, 1, 2.0, 1.0, 2).unwrap();
        let wrapped = ExternalElement::wrap_mesh(&mesh).unwrap();
        assert_eq!(wrapped.nelement(), 2);
        let (_, a) = mesh.element_at(1).unwrap();
        let (_, b) = wrapped.element_at(1).unwrap();
        let s = Coord::new2(0.3, -0.7);
        assert_eq!(a.position(&s), b.position(&s));
        assert_eq!(a.n_integration_points(), b.n_integration_points());
    }

    #[test]
    fn test_split_children_have_empty_store() {
        let inner = QElement::from_map(2, 2, |s| *s).unwrap();
        let mut element = ExternalElement::new(inner);
        element.reserve_interaction_storage(1, 2);
        element
            .interaction_store_mut()
            .set(0, 0, ElementIndex::new(0, 1), Coord::new2(0.0, 0.0))
            .unwrap();
        assert!(element.get_interaction(0, 0).is_some());

        let children = element.split();
        assert_eq!(children.len(), 4);
        assert!(children
            .iter()
            .all(|c| c.interaction_store().n_interactions() == 0));
    }
}
