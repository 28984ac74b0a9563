// crates/md_mesh/src/locator.rs

//! 螺旋点定位器
//!
//! 给定物理坐标，在另一套网格的分箱索引上逐环搜索，找到包含该点的单元及局部坐标。
//!
//! # 搜索过程
//!
//! 1. 点在包围盒（加 `bounds_margin` × 对角线）外时直接返回 `NotFound(OutsideBounds)`
//! 2. 从点所在分箱开始，第 k 环为 Chebyshev 距离等于 k 的分箱
//! 3. 一环内的候选单元按最近采样点距离排序（距离相同按单元索引），
//!    以该采样点的局部坐标作为 Newton 初值反演；第一个成功者即为结果
//! 4. 环数达到 `max_spiral_rings` 或覆盖整个分箱网格后返回 `NotFound(SearchExhausted)`
//!
//! 每次定位中每个单元只尝试一次。搜索状态全部是局部变量，定位器本身只读，可并发查询。
//!
//! # 示例
//!
//! ```
//! use md_config::{BinConfig, LocateConfig};
//! use md_geo::Coord;
//! use md_mesh::generation::rectangular_quad_mesh;
//! use md_mesh::locator::PointLocator;
//! use md_mesh::spatial_index::SpatialBinIndex;
//!
//! let mesh = rectangular_quad_mesh(4, 4, 1.0, 1.0, 2).unwrap();
//! let index = SpatialBinIndex::build(&mesh, &BinConfig::default()).unwrap();
//! let locator = PointLocator::new(&mesh, &index, LocateConfig::default()).unwrap();
//!
//! assert!(locator.locate(&Coord::new2(0.3, 0.7)).is_found());
//! assert!(!locator.locate(&Coord::new2(1.3, 0.7)).is_found());
//! ```

use std::cell::Cell;
use std::collections::{HashMap, HashSet};

use md_config::{CouplingConfig, LocateConfig};
use md_foundation::ElementIndex;
use md_geo::Coord;

use crate::error::{MeshError, MeshResult};
use crate::spatial_index::SpatialBinIndex;
use crate::traits::{GeomElement, InversionFailure, MeshAccess};

// ============================================================
// 定位结果
// ============================================================

/// 未找到的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    /// 点在网格包围盒（含容差）之外，未进行搜索
    OutsideBounds,
    /// 搜索完所有允许的环仍未找到
    SearchExhausted,
    /// 索引中没有任何记录
    EmptyIndex,
}

/// 定位结果
///
/// `NotFound` 是正常结果（如点位于另一网格的区域之外），不应中止耦合过程。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocateResult {
    /// 找到包含点的单元
    Found {
        /// 单元索引
        element: ElementIndex,
        /// 局部坐标（已截断到参考域）
        local: Coord,
        /// 命中时所在的螺旋环
        ring: usize,
    },
    /// 未找到
    NotFound(NotFoundReason),
}

impl LocateResult {
    /// 是否找到
    #[inline]
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }

    /// 单元索引
    pub fn element(&self) -> Option<ElementIndex> {
        match self {
            Self::Found { element, .. } => Some(*element),
            Self::NotFound(_) => None,
        }
    }

    /// 局部坐标
    pub fn local(&self) -> Option<Coord> {
        match self {
            Self::Found { local, .. } => Some(*local),
            Self::NotFound(_) => None,
        }
    }

    /// 转为 (单元, 局部坐标)
    pub fn found(&self) -> Option<(ElementIndex, Coord)> {
        match self {
            Self::Found { element, local, .. } => Some((*element, *local)),
            Self::NotFound(_) => None,
        }
    }
}

// ============================================================
// PointLocator
// ============================================================

/// 螺旋点定位器
///
/// 借用网格与对应的分箱索引；构造时检查索引是否对应网格当前版本。
#[derive(Debug)]
pub struct PointLocator<'a, M: MeshAccess> {
    mesh: &'a M,
    index: &'a SpatialBinIndex,
    config: LocateConfig,
}

impl<'a, M: MeshAccess> PointLocator<'a, M> {
    /// 创建定位器
    ///
    /// 索引维度与网格不符返回 `DimensionMismatch`，
    /// 索引基于其他网格或旧版本构建时返回 `StaleIndex`。
    pub fn new(mesh: &'a M, index: &'a SpatialBinIndex, config: LocateConfig) -> MeshResult<Self> {
        if index.dim() != mesh.dimension() {
            return Err(MeshError::dimension_mismatch(
                "PointLocator::new",
                mesh.dimension(),
                index.dim(),
            ));
        }
        if !index.is_current_for(mesh) {
            tracing::warn!(
                index_mesh = index.mesh_id(),
                index_revision = index.revision(),
                mesh = mesh.mesh_id(),
                revision = mesh.revision(),
                "分箱索引已过期，需要重建"
            );
            return Err(MeshError::StaleIndex {
                index_mesh: index.mesh_id(),
                index_revision: index.revision(),
                mesh: mesh.mesh_id(),
                revision: mesh.revision(),
            });
        }
        Ok(Self {
            mesh,
            index,
            config,
        })
    }

    /// 网格
    #[inline]
    pub fn mesh(&self) -> &'a M {
        self.mesh
    }

    /// 分箱索引
    #[inline]
    pub fn index(&self) -> &'a SpatialBinIndex {
        self.index
    }

    /// 定位配置
    #[inline]
    pub fn config(&self) -> &LocateConfig {
        &self.config
    }

    /// 在单个单元上尝试反演
    pub fn try_element(&self, element: ElementIndex, x: &Coord, guess: &Coord) -> Option<Coord> {
        let e = self.mesh.element(element)?;
        match e.locate_local(x, guess, &self.config) {
            Ok(local) => Some(local),
            Err(InversionFailure::Singular) => {
                tracing::debug!(element = %element, "单元雅可比奇异，跳过");
                None
            }
            Err(_) => None,
        }
    }

    /// 定位单个点
    pub fn locate(&self, x: &Coord) -> LocateResult {
        if self.index.is_empty() {
            return LocateResult::NotFound(NotFoundReason::EmptyIndex);
        }
        let bbox = self.index.bounding_box();
        let margin = self.config.bounds_margin * bbox.diagonal();
        if !bbox.contains(x, margin) {
            return LocateResult::NotFound(NotFoundReason::OutsideBounds);
        }

        let start = self.index.bin_of_clamped(x);
        let full = self.index.max_ring_level(start);
        let last_ring = self
            .config
            .max_spiral_rings
            .map_or(full, |cap| cap.min(full));

        let mut tried: HashSet<ElementIndex> = HashSet::new();
        for ring in 0..=last_ring {
            for (element, guess) in self.ring_candidates(x, start, ring, &tried) {
                tried.insert(element);
                if let Some(local) = self.try_element(element, x, &guess) {
                    return LocateResult::Found {
                        element,
                        local,
                        ring,
                    };
                }
            }
        }
        LocateResult::NotFound(NotFoundReason::SearchExhausted)
    }

    /// 第 `ring` 环上尚未尝试的候选单元及其初值
    ///
    /// 每个单元取离 x 最近的采样点作为初值；按 (距离, 单元索引) 排序。
    fn ring_candidates(
        &self,
        x: &Coord,
        start: usize,
        ring: usize,
        tried: &HashSet<ElementIndex>,
    ) -> Vec<(ElementIndex, Coord)> {
        let mut best: Vec<(f64, ElementIndex, Coord)> = Vec::new();
        let mut slot_of: HashMap<ElementIndex, usize> = HashMap::new();

        for bin in self.index.neighbour_bins(start, ring) {
            for rec in self.index.bin_contents(bin) {
                if tried.contains(&rec.element) {
                    continue;
                }
                let d = rec.position.distance_squared(x);
                match slot_of.get(&rec.element) {
                    Some(&k) => {
                        if d < best[k].0 {
                            best[k].0 = d;
                            best[k].2 = rec.local;
                        }
                    }
                    None => {
                        slot_of.insert(rec.element, best.len());
                        best.push((d, rec.element, rec.local));
                    }
                }
            }
        }

        best.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        best.into_iter().map(|(_, e, s)| (e, s)).collect()
    }

    /// 批量定位
    pub fn locate_batch(&self, points: &[Coord]) -> Vec<LocateResult> {
        points.iter().map(|x| self.locate(x)).collect()
    }

    /// 并行批量定位
    #[cfg(feature = "parallel")]
    pub fn locate_batch_parallel(&self, points: &[Coord]) -> Vec<LocateResult>
    where
        M: Sync,
    {
        use rayon::prelude::*;
        points.par_iter().map(|x| self.locate(x)).collect()
    }
}

// ============================================================
// 带缓存的定位器
// ============================================================

/// 定位统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocatorStats {
    /// 查询总数
    pub total: u64,
    /// 上次命中单元直接命中的次数
    pub cache_hits: u64,
    /// 执行螺旋搜索的次数
    pub global_searches: u64,
}

impl LocatorStats {
    /// 缓存命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total as f64
        }
    }
}

/// 带缓存的定位器
///
/// 先在上一次命中的单元上尝试（从单元中心出发），失败再做螺旋搜索。
/// 适合连续查询相邻点（如同一单元的积分点）。
pub struct CachedLocator<'a, M: MeshAccess> {
    inner: PointLocator<'a, M>,
    last: Cell<Option<ElementIndex>>,
    total: Cell<u64>,
    cache_hits: Cell<u64>,
    global_searches: Cell<u64>,
}

impl<'a, M: MeshAccess> CachedLocator<'a, M> {
    /// 创建
    pub fn new(inner: PointLocator<'a, M>) -> Self {
        Self {
            inner,
            last: Cell::new(None),
            total: Cell::new(0),
            cache_hits: Cell::new(0),
            global_searches: Cell::new(0),
        }
    }

    /// 定位
    pub fn locate(&self, x: &Coord) -> LocateResult {
        self.total.set(self.total.get() + 1);

        if let Some(last) = self.last.get() {
            if let Some(e) = self.inner.mesh.element(last) {
                let centre = Coord::zeros(e.nlocal());
                if let Some(local) = self.inner.try_element(last, x, &centre) {
                    self.cache_hits.set(self.cache_hits.get() + 1);
                    return LocateResult::Found {
                        element: last,
                        local,
                        ring: 0,
                    };
                }
            }
        }

        self.global_searches.set(self.global_searches.get() + 1);
        let result = self.inner.locate(x);
        if let Some(element) = result.element() {
            self.last.set(Some(element));
        }
        result
    }

    /// 统计
    pub fn stats(&self) -> LocatorStats {
        LocatorStats {
            total: self.total.get(),
            cache_hits: self.cache_hits.get(),
            global_searches: self.global_searches.get(),
        }
    }

    /// 清空缓存与统计
    pub fn reset(&self) {
        self.last.set(None);
        self.total.set(0);
        self.cache_hits.set(0);
        self.global_searches.set(0);
    }

    /// 内部定位器
    pub fn inner(&self) -> &PointLocator<'a, M> {
        &self.inner
    }
}

// ============================================================
// 网格作为几何对象
// ============================================================

/// 把整个网格当作几何对象使用
pub trait MeshLocateExt: MeshAccess + Sized {
    /// 构建临时索引并定位一个点
    fn locate_zeta(&self, x: &Coord, config: &CouplingConfig) -> MeshResult<LocateResult> {
        let index = SpatialBinIndex::build(self, &config.bins)?;
        let locator = PointLocator::new(self, &index, config.locate.clone())?;
        Ok(locator.locate(x))
    }

    /// 先按当前位置定位 `x`，再返回该物质点在时间层 `t` 的位置
    ///
    /// 点不在网格内时返回 `PointNotFound`。
    fn position_of(&self, t: usize, x: &Coord, config: &CouplingConfig) -> MeshResult<Coord> {
        match self.locate_zeta(x, config)? {
            LocateResult::Found { element, local, .. } => self
                .element(element)
                .map(|e| e.position_at(t, &local))
                .ok_or(MeshError::ElementNotFound(element)),
            LocateResult::NotFound(_) => Err(MeshError::PointNotFound { point: *x }),
        }
    }
}

impl<M: MeshAccess> MeshLocateExt for M {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::QElement;
    use crate::generation::{brick_mesh, rectangular_quad_mesh, structured_line_mesh};
    use crate::mesh::ElementMesh;
    use md_config::BinConfig;

    fn locate_in(mesh: &ElementMesh<QElement>, bins: BinConfig, x: Coord) -> LocateResult {
        let index = SpatialBinIndex::build(mesh, &bins).unwrap();
        let locator = PointLocator::new(mesh, &index, LocateConfig::default()).unwrap();
        locator.locate(&x)
    }

    #[test]
    fn test_locate_result_accessors() {
        let r = LocateResult::NotFound(NotFoundReason::OutsideBounds);
        assert!(!r.is_found());
        assert!(r.element().is_none());
        assert!(r.found().is_none());
    }

    #[test]
    fn test_locate_interior_point() {
        let mesh = rectangular_quad_mesh(4, 4, 1.0, 1.0, 2).unwrap();
        let x = Coord::new2(0.6, 0.35);
        let result = locate_in(&mesh, BinConfig::default(), x);
        let (element, local) = result.found().unwrap();
        let back = mesh.element(element).unwrap().position(&local);
        assert!(back.distance(&x) < 1e-10);
    }

    #[test]
    fn test_outside_bounds_not_searched() {
        let mesh = rectangular_quad_mesh(2, 2, 1.0, 1.0, 2).unwrap();
        let result = locate_in(&mesh, BinConfig::default(), Coord::new2(1.5, 0.5));
        assert_eq!(result, LocateResult::NotFound(NotFoundReason::OutsideBounds));
    }

    #[test]
    fn test_bounds_margin_allows_search() {
        let mesh = rectangular_quad_mesh(2, 2, 1.0, 1.0, 2).unwrap();
        let index = SpatialBinIndex::build(&mesh, &BinConfig::default()).unwrap();
        let config = LocateConfig {
            bounds_margin: 0.1,
            ..LocateConfig::default()
        };
        let locator = PointLocator::new(&mesh, &index, config).unwrap();
        // 在包围盒容差内但不在任何单元内：搜索后仍找不到
        let result = locator.locate(&Coord::new2(1.05, 0.5));
        assert_eq!(result, LocateResult::NotFound(NotFoundReason::SearchExhausted));
    }

    #[test]
    fn test_ring_cap_limits_search() {
        // 一个大单元跨越全部 8 个分箱，只在两端采样
        let mesh = structured_line_mesh(1, 0.0, 8.0, 2).unwrap();
        let bins = BinConfig {
            counts: Some(vec![8]),
            samples_per_axis: 2,
            ..BinConfig::default()
        };
        let index = SpatialBinIndex::build(&mesh, &bins).unwrap();
        let x = Coord::new1(4.2);

        let capped = LocateConfig {
            max_spiral_rings: Some(1),
            ..LocateConfig::default()
        };
        let locator = PointLocator::new(&mesh, &index, capped).unwrap();
        assert_eq!(
            locator.locate(&x),
            LocateResult::NotFound(NotFoundReason::SearchExhausted)
        );

        let locator = PointLocator::new(&mesh, &index, LocateConfig::default()).unwrap();
        match locator.locate(&x) {
            LocateResult::Found { ring, local, .. } => {
                // x=8 端点采样落在最后一个分箱，距起始分箱 3 环
                assert_eq!(ring, 3);
                assert!((local[0] - 0.05).abs() < 1e-10);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_stale_index_rejected() {
        let mut mesh = rectangular_quad_mesh(2, 2, 1.0, 1.0, 2).unwrap();
        let index = SpatialBinIndex::build(&mesh, &BinConfig::default()).unwrap();
        mesh.map_nodes(|x| *x * 2.0);
        let err = PointLocator::new(&mesh, &index, LocateConfig::default()).unwrap_err();
        assert!(matches!(err, MeshError::StaleIndex { .. }));
    }

    #[test]
    fn test_empty_index() {
        let mesh: ElementMesh<QElement> = ElementMesh::new(2);
        let result = locate_in(&mesh, BinConfig::default(), Coord::new2(0.0, 0.0));
        assert_eq!(result, LocateResult::NotFound(NotFoundReason::EmptyIndex));
    }

    #[test]
    fn test_locate_in_brick() {
        let mesh = brick_mesh([3, 3, 3], [1.0, 1.0, 1.0], 3).unwrap();
        let x = Coord::new3(0.51, 0.12, 0.93);
        let result = locate_in(&mesh, BinConfig::default(), x);
        let (element, local) = result.found().unwrap();
        assert!(mesh.element(element).unwrap().position(&local).distance(&x) < 1e-10);
    }

    #[test]
    fn test_cached_locator_hits() {
        let mesh = rectangular_quad_mesh(4, 4, 1.0, 1.0, 2).unwrap();
        let index = SpatialBinIndex::build(&mesh, &BinConfig::default()).unwrap();
        let locator = PointLocator::new(&mesh, &index, LocateConfig::default()).unwrap();
        let cached = CachedLocator::new(locator);

        let a = cached.locate(&Coord::new2(0.1, 0.1));
        let b = cached.locate(&Coord::new2(0.15, 0.2));
        assert_eq!(a.element(), b.element());
        let c = cached.locate(&Coord::new2(0.9, 0.9));
        assert!(c.is_found());

        let stats = cached.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.global_searches, 2);
        assert!((stats.hit_rate() - 1.0 / 3.0).abs() < 1e-12);

        cached.reset();
        assert_eq!(cached.stats(), LocatorStats::default());
    }

    #[test]
    fn test_locate_batch() {
        let mesh = rectangular_quad_mesh(2, 2, 1.0, 1.0, 2).unwrap();
        let index = SpatialBinIndex::build(&mesh, &BinConfig::default()).unwrap();
        let locator = PointLocator::new(&mesh, &index, LocateConfig::default()).unwrap();
        let points = [Coord::new2(0.2, 0.2), Coord::new2(2.0, 0.2), Coord::new2(0.7, 0.8)];
        let results = locator.locate_batch(&points);
        assert_eq!(
            results.iter().map(LocateResult::is_found).collect::<Vec<_>>(),
            vec![true, false, true]
        );
    }

    #[test]
    fn test_position_of_history() {
        let mut mesh = rectangular_quad_mesh(2, 2, 1.0, 1.0, 2).unwrap();
        mesh.push_history();
        mesh.map_nodes(|x| Coord::new2(x[0] + 1.0, x[1]));
        let config = CouplingConfig::default();

        // 当前位置 (1.5, 0.5) 在上一时间层位于 (0.5, 0.5)
        let previous = mesh.position_of(1, &Coord::new2(1.5, 0.5), &config).unwrap();
        assert!(previous.distance(&Coord::new2(0.5, 0.5)) < 1e-10);

        let err = mesh.position_of(0, &Coord::new2(0.5, 0.5), &config).unwrap_err();
        assert!(matches!(err, MeshError::PointNotFound { .. }));
    }
}
