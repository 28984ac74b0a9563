// crates/md_coupling/src/driver.rs

//! 跨网格耦合驱动
//!
//! `set_sources(consuming, producing)` 对消费网格每个单元的每个积分点，
//! 在生产网格上定位其物理位置，并把结果写入该单元的交互存储。
//!
//! # 状态
//!
//! ```text
//! Unbuilt ──set_sources──> Built ──网格变化──> Stale ──set_sources──> Built
//! ```
//!
//! 状态由两套网格的 (mesh_id, revision) 推出，不需要网格主动通知。
//! 任一网格细分、移动节点或增删单元后，都必须重新调用 `set_sources`。

use md_config::CouplingConfig;
use md_mesh::{
    CachedLocator, GeomElement, LocateResult, MeshAccess, MeshAccessMut, PointLocator,
    SpatialBinIndex,
};

use crate::error::{CouplingError, CouplingResult};
use crate::interaction::{ElementWithExternalElement, InteractionRecord};

/// 耦合状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouplingState {
    /// 尚未执行过 set_sources
    Unbuilt,
    /// 交互记录对应两套网格的当前状态
    Built,
    /// 至少一套网格在上次 set_sources 之后发生了变化
    Stale,
}

/// 一次耦合的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CouplingReport {
    /// 处理的积分点数
    pub n_points: usize,
    /// 定位成功
    pub n_found: usize,
    /// 未找到
    pub n_not_found: usize,
    /// 由上次命中单元直接命中的次数
    pub n_cache_hits: usize,
    /// 本次是否重建了分箱索引
    pub index_rebuilt: bool,
}

impl CouplingReport {
    /// 是否所有积分点都已定位
    pub fn all_found(&self) -> bool {
        self.n_not_found == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MeshStamp {
    id: u64,
    revision: u64,
}

impl MeshStamp {
    fn of<M: MeshAccess>(mesh: &M) -> Self {
        Self {
            id: mesh.mesh_id(),
            revision: mesh.revision(),
        }
    }
}

/// 单向耦合驱动
///
/// 持有生产网格的分箱索引，网格未变化时跨多次 `set_sources` 复用。
#[derive(Debug)]
pub struct CouplingDriver {
    config: CouplingConfig,
    slot: usize,
    rank: usize,
    index: Option<SpatialBinIndex>,
    stamps: Option<(MeshStamp, MeshStamp)>,
}

impl CouplingDriver {
    /// 创建驱动，结果写入交互槽位 `slot`
    pub fn new(config: CouplingConfig, slot: usize) -> CouplingResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            slot,
            rank: 0,
            index: None,
            stamps: None,
        })
    }

    /// 设置写入记录的进程号
    pub fn with_rank(mut self, rank: usize) -> Self {
        self.rank = rank;
        self
    }

    /// 配置
    #[inline]
    pub fn config(&self) -> &CouplingConfig {
        &self.config
    }

    /// 交互槽位
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// 进程号
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// 当前持有的分箱索引
    #[inline]
    pub fn index(&self) -> Option<&SpatialBinIndex> {
        self.index.as_ref()
    }

    /// 丢弃索引与状态
    pub fn invalidate(&mut self) {
        self.index = None;
        self.stamps = None;
    }

    /// 相对两套网格的状态
    pub fn state<C: MeshAccess, P: MeshAccess>(&self, consuming: &C, producing: &P) -> CouplingState {
        match self.stamps {
            None => CouplingState::Unbuilt,
            Some((c, p)) if c == MeshStamp::of(consuming) && p == MeshStamp::of(producing) => {
                CouplingState::Built
            }
            Some(_) => CouplingState::Stale,
        }
    }

    /// 为消费网格的全部积分点在生产网格上定位并写入交互记录
    ///
    /// 维度不一致是致命错误；单个点未找到只记为 `NotFound`，不影响其他点。
    pub fn set_sources<C, P>(&mut self, consuming: &mut C, producing: &P) -> CouplingResult<CouplingReport>
    where
        C: MeshAccessMut,
        C::Element: ElementWithExternalElement,
        P: MeshAccess,
    {
        if consuming.dimension() != producing.dimension() {
            return Err(CouplingError::DimensionMismatch {
                consuming: consuming.dimension(),
                producing: producing.dimension(),
            });
        }

        let reuse = self.config.driver.reuse_index
            && self
                .index
                .as_ref()
                .is_some_and(|index| index.is_current_for(producing));
        let index = match self.index.take() {
            Some(index) if reuse => index,
            _ => SpatialBinIndex::build(producing, &self.config.bins)?,
        };

        let result = self.locate_all(consuming, producing, &index);
        self.index = Some(index);
        let mut report = result?;
        report.index_rebuilt = !reuse;
        self.stamps = Some((MeshStamp::of(consuming), MeshStamp::of(producing)));

        if self.config.driver.quiet {
            tracing::debug!(
                slot = self.slot,
                points = report.n_points,
                found = report.n_found,
                not_found = report.n_not_found,
                "耦合完成"
            );
        } else {
            tracing::info!(
                slot = self.slot,
                points = report.n_points,
                found = report.n_found,
                not_found = report.n_not_found,
                cache_hits = report.n_cache_hits,
                index_rebuilt = report.index_rebuilt,
                "耦合完成"
            );
        }
        Ok(report)
    }

    fn locate_all<C, P>(
        &self,
        consuming: &mut C,
        producing: &P,
        index: &SpatialBinIndex,
    ) -> CouplingResult<CouplingReport>
    where
        C: MeshAccessMut,
        C::Element: ElementWithExternalElement,
        P: MeshAccess,
    {
        let locator = PointLocator::new(producing, index, self.config.locate.clone())?;
        let cached = CachedLocator::new(locator);
        let source_dim = producing
            .element_at(0)
            .map_or(producing.dimension(), |(_, e)| e.nlocal());
        let use_cache = self.config.driver.use_cached_guess;

        let mut report = CouplingReport::default();
        for idx in consuming.element_indices() {
            let Some(element) = consuming.element_mut(idx) else {
                continue;
            };
            let nipt = element.n_integration_points();
            let n_interactions = element
                .interaction_store()
                .n_interactions()
                .max(self.slot + 1);
            if !element
                .interaction_store()
                .fits(n_interactions, nipt, source_dim)
            {
                element.reserve_interaction_storage(n_interactions, source_dim);
            }

            for ipt in 0..nipt {
                let x = element.position(&element.integration_point(ipt));
                let result = if use_cache {
                    cached.locate(&x)
                } else {
                    cached.inner().locate(&x)
                };
                let store = element.interaction_store_mut();
                match result {
                    LocateResult::Found {
                        element: found,
                        local,
                        ..
                    } => {
                        store.set_record(
                            self.slot,
                            ipt,
                            InteractionRecord {
                                rank: self.rank,
                                element: found,
                                local,
                            },
                        )?;
                        report.n_found += 1;
                    }
                    LocateResult::NotFound(_) => {
                        store.set_not_found(self.slot, ipt)?;
                        report.n_not_found += 1;
                    }
                }
                report.n_points += 1;
            }
        }
        report.n_cache_hits = cached.stats().cache_hits as usize;
        Ok(report)
    }
}

/// 双向耦合：两套网格互为生产者与消费者
#[derive(Debug)]
pub struct TwoWayCoupling {
    forward: CouplingDriver,
    backward: CouplingDriver,
}

impl TwoWayCoupling {
    /// 创建，两侧都写入交互槽位 `slot`
    pub fn new(config: CouplingConfig, slot: usize) -> CouplingResult<Self> {
        Ok(Self {
            forward: CouplingDriver::new(config.clone(), slot)?,
            backward: CouplingDriver::new(config, slot)?,
        })
    }

    /// a 的积分点在 b 上定位，b 的积分点在 a 上定位
    pub fn set_sources<A, B>(
        &mut self,
        a: &mut A,
        b: &mut B,
    ) -> CouplingResult<(CouplingReport, CouplingReport)>
    where
        A: MeshAccessMut,
        A::Element: ElementWithExternalElement,
        B: MeshAccessMut,
        B::Element: ElementWithExternalElement,
    {
        let forward = self.forward.set_sources(a, &*b)?;
        let backward = self.backward.set_sources(b, &*a)?;
        Ok((forward, backward))
    }

    /// 两个方向的状态（取较差者）
    pub fn state<A: MeshAccess, B: MeshAccess>(&self, a: &A, b: &B) -> CouplingState {
        match (self.forward.state(a, b), self.backward.state(b, a)) {
            (CouplingState::Built, CouplingState::Built) => CouplingState::Built,
            (CouplingState::Unbuilt, _) | (_, CouplingState::Unbuilt) => CouplingState::Unbuilt,
            _ => CouplingState::Stale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::ExternalElement;
    use md_mesh::generation::rectangular_quad_mesh;
    use md_mesh::{ElementMesh, QElement};

    fn consumer(nx: usize, ny: usize) -> ElementMesh<ExternalElement<QElement>> {
        ExternalElement::wrap_mesh(&rectangular_quad_mesh(nx, ny, 1.0, 1.0, 2).unwrap()).unwrap()
    }

    #[test]
    fn test_state_machine() {
        let mut consuming = consumer(2, 2);
        let mut producing = rectangular_quad_mesh(3, 3, 1.0, 1.0, 2).unwrap();
        let mut driver = CouplingDriver::new(CouplingConfig::default(), 0).unwrap();
        assert_eq!(driver.state(&consuming, &producing), CouplingState::Unbuilt);

        let report = driver.set_sources(&mut consuming, &producing).unwrap();
        assert_eq!(report.n_points, 16);
        assert!(report.all_found());
        assert!(report.index_rebuilt);
        assert_eq!(driver.state(&consuming, &producing), CouplingState::Built);

        producing.map_nodes(|x| *x * 1.01);
        assert_eq!(driver.state(&consuming, &producing), CouplingState::Stale);

        let report = driver.set_sources(&mut consuming, &producing).unwrap();
        assert!(report.index_rebuilt);
        assert_eq!(driver.state(&consuming, &producing), CouplingState::Built);
    }

    #[test]
    fn test_index_reused_when_unchanged() {
        let mut consuming = consumer(2, 2);
        let producing = rectangular_quad_mesh(3, 3, 1.0, 1.0, 2).unwrap();
        let mut driver = CouplingDriver::new(CouplingConfig::default(), 0).unwrap();
        driver.set_sources(&mut consuming, &producing).unwrap();
        let report = driver.set_sources(&mut consuming, &producing).unwrap();
        assert!(!report.index_rebuilt);
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let mut consuming = consumer(2, 2);
        let producing = md_mesh::generation::structured_line_mesh(3, 0.0, 1.0, 2).unwrap();
        let mut driver = CouplingDriver::new(CouplingConfig::default(), 0).unwrap();
        let err = driver.set_sources(&mut consuming, &producing).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(driver.state(&consuming, &producing), CouplingState::Unbuilt);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = CouplingConfig::default();
        config.locate.inversion_tolerance = -1.0;
        assert!(CouplingDriver::new(config, 0).is_err());
    }

    #[test]
    fn test_second_slot_keeps_first() {
        let mut consuming = consumer(1, 1);
        let near = rectangular_quad_mesh(1, 1, 1.0, 1.0, 2).unwrap();
        let far = rectangular_quad_mesh(1, 1, 0.1, 0.1, 2).unwrap();

        CouplingDriver::new(CouplingConfig::default(), 0)
            .unwrap()
            .set_sources(&mut consuming, &near)
            .unwrap();
        let report = CouplingDriver::new(CouplingConfig::default(), 1)
            .unwrap()
            .set_sources(&mut consuming, &far)
            .unwrap();
        assert_eq!(report.n_found, 0);

        let (_, e) = consuming.element_at(0).unwrap();
        let counts = e.interaction_store().counts();
        assert_eq!(counts.located, 4);
        assert_eq!(counts.not_found, 4);
    }

    #[test]
    fn test_cache_disabled_matches() {
        let producing = rectangular_quad_mesh(2, 2, 1.0, 1.0, 2).unwrap();
        let mut a = consumer(3, 3);
        let mut b = consumer(3, 3);

        let mut config = CouplingConfig::default();
        let with_cache = CouplingDriver::new(config.clone(), 0)
            .unwrap()
            .set_sources(&mut a, &producing)
            .unwrap();
        config.driver.use_cached_guess = false;
        let without = CouplingDriver::new(config, 0)
            .unwrap()
            .set_sources(&mut b, &producing)
            .unwrap();
        assert!(with_cache.n_cache_hits > 0);
        assert_eq!(without.n_cache_hits, 0);
        assert_eq!(with_cache.n_found, without.n_found);
    }

    #[test]
    fn test_two_way() {
        let mut a = consumer(2, 2);
        let mut b = consumer(3, 1);
        let mut coupling = TwoWayCoupling::new(CouplingConfig::default(), 0).unwrap();
        assert_eq!(coupling.state(&a, &b), CouplingState::Unbuilt);
        let (ab, ba) = coupling.set_sources(&mut a, &mut b).unwrap();
        assert_eq!(ab.n_points, 16);
        assert_eq!(ba.n_points, 12);
        assert!(ab.all_found() && ba.all_found());
        assert_eq!(coupling.state(&a, &b), CouplingState::Built);
    }
}
