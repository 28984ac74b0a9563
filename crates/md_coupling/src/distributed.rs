// crates/md_coupling/src/distributed.rs

//! 分布式耦合
//!
//! 生产网格被划分到多个进程，每个进程只持有本地单元并只查询本地分箱。
//! `set_sources` 是集合操作，所有进程必须一起调用：
//!
//! 1. 收集各进程的网格维度，任一进程不一致则所有进程一起返回错误
//! 2. 本地耦合：在本地生产单元上定位本地消费积分点
//! 3. 收集各进程本地未找到的点
//! 4. 每个进程在本地索引上查找其他进程的待定点
//! 5. 收集匹配结果；同一点被多个进程找到时取进程号最小者
//! 6. 屏障，所有进程完成后才能组装
//!
//! 本地找到的点不再参与跨进程匹配。

use std::any::Any;
use std::sync::{Arc, Barrier};

use md_config::CouplingConfig;
use md_foundation::ElementIndex;
use md_geo::Coord;
use md_mesh::{GeomElement, MeshAccess, MeshAccessMut, PointLocator};
use parking_lot::Mutex;

use crate::driver::{CouplingDriver, CouplingReport};
use crate::error::{CouplingError, CouplingResult};
use crate::interaction::{ElementWithExternalElement, ExternalInteraction, InteractionRecord};

// ============================================================
// 通信
// ============================================================

/// 进程组通信接口
pub trait Communicator {
    /// 本进程号
    fn rank(&self) -> usize;

    /// 进程数
    fn size(&self) -> usize;

    /// 收集每个进程的值，结果按进程号排列
    fn all_gather<T: Clone + Send + 'static>(&self, value: T) -> CouplingResult<Vec<T>>;

    /// 屏障
    fn barrier(&self);
}

/// 单进程通信器
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather<T: Clone + Send + 'static>(&self, value: T) -> CouplingResult<Vec<T>> {
        Ok(vec![value])
    }

    fn barrier(&self) {}
}

struct ThreadShared {
    size: usize,
    barrier: Barrier,
    slots: Mutex<Vec<Option<Box<dyn Any + Send>>>>,
}

/// 进程内线程组通信器，每个线程扮演一个进程
#[derive(Clone)]
pub struct ThreadCommunicator {
    rank: usize,
    shared: Arc<ThreadShared>,
}

impl ThreadCommunicator {
    /// 创建 `size` 个成员的通信组
    pub fn group(size: usize) -> Vec<Self> {
        let size = size.max(1);
        let shared = Arc::new(ThreadShared {
            size,
            barrier: Barrier::new(size),
            slots: Mutex::new((0..size).map(|_| None).collect()),
        });
        (0..size)
            .map(|rank| Self {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl std::fmt::Debug for ThreadCommunicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadCommunicator")
            .field("rank", &self.rank)
            .field("size", &self.shared.size)
            .finish()
    }
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    // 写入本槽位 -> 屏障 -> 读取全部 -> 屏障；下一次写入前所有读取已完成
    fn all_gather<T: Clone + Send + 'static>(&self, value: T) -> CouplingResult<Vec<T>> {
        self.shared.slots.lock()[self.rank] = Some(Box::new(value));
        self.shared.barrier.wait();

        let gathered = {
            let slots = self.shared.slots.lock();
            slots
                .iter()
                .enumerate()
                .map(|(r, slot)| {
                    slot.as_ref()
                        .and_then(|v| v.downcast_ref::<T>())
                        .cloned()
                        .ok_or_else(|| {
                            CouplingError::communication(format!("进程 {r} 的数据类型不符"))
                        })
                })
                .collect::<CouplingResult<Vec<T>>>()
        };

        self.shared.barrier.wait();
        gathered
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }
}

// ============================================================
// 分布式驱动
// ============================================================

/// 分布式耦合统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistributedReport {
    /// 本地耦合统计
    pub local: CouplingReport,
    /// 由其他进程找到的点
    pub n_remote_found: usize,
    /// 最终仍未找到的点
    pub n_not_found: usize,
    /// 被多个进程同时找到的点
    pub n_conflicts: usize,
}

/// 待定点在某个进程上的匹配结果
#[derive(Debug, Clone, Copy)]
struct RemoteMatch {
    target: usize,
    point: usize,
    owner: usize,
    element: ElementIndex,
    local: Coord,
}

/// 分布式耦合驱动
#[derive(Debug)]
pub struct DistributedCouplingDriver<C: Communicator> {
    comm: C,
    driver: CouplingDriver,
}

impl<C: Communicator> DistributedCouplingDriver<C> {
    /// 创建
    pub fn new(comm: C, config: CouplingConfig, slot: usize) -> CouplingResult<Self> {
        let driver = CouplingDriver::new(config, slot)?.with_rank(comm.rank());
        Ok(Self { comm, driver })
    }

    /// 通信器
    pub fn communicator(&self) -> &C {
        &self.comm
    }

    /// 本地驱动
    pub fn local_driver(&self) -> &CouplingDriver {
        &self.driver
    }

    /// 集合耦合：所有进程必须同时调用
    pub fn set_sources<Cm, P>(
        &mut self,
        consuming: &mut Cm,
        producing_local: &P,
    ) -> CouplingResult<DistributedReport>
    where
        Cm: MeshAccessMut,
        Cm::Element: ElementWithExternalElement,
        P: MeshAccess,
    {
        let rank = self.comm.rank();
        let slot = self.driver.slot();

        // 1. 维度一致性
        let dims = self
            .comm
            .all_gather((consuming.dimension(), producing_local.dimension()))?;
        if let Some(&(c, p)) = dims.iter().find(|&&(c, p)| c != p || c != dims[0].0) {
            return Err(CouplingError::DimensionMismatch {
                consuming: c,
                producing: p,
            });
        }

        // 2. 本地耦合，失败时通知其他进程一起退出
        let local = self.driver.set_sources(consuming, producing_local);
        let ok = self.comm.all_gather(local.is_ok())?;
        let local = local?;
        if let Some(failed) = ok.iter().position(|&flag| !flag) {
            return Err(CouplingError::communication(format!(
                "进程 {failed} 本地耦合失败"
            )));
        }

        // 3. 本地未找到的点
        let mut pending: Vec<(ElementIndex, usize)> = Vec::new();
        let mut positions: Vec<Coord> = Vec::new();
        for idx in consuming.element_indices() {
            let Some(element) = consuming.element(idx) else {
                continue;
            };
            for (ipt, entry) in element.interaction_store().slot_entries(slot).iter().enumerate() {
                if *entry == ExternalInteraction::NotFound {
                    pending.push((idx, ipt));
                    positions.push(element.position(&element.integration_point(ipt)));
                }
            }
        }
        let all_pending = self.comm.all_gather(positions)?;

        // 4. 查找其他进程的待定点
        let mut matches: Vec<RemoteMatch> = Vec::new();
        let locator = self.driver.index().map(|index| {
            PointLocator::new(producing_local, index, self.driver.config().locate.clone())
        });
        match locator {
            Some(Ok(locator)) => {
                for (target, points) in all_pending.iter().enumerate() {
                    if target == rank {
                        continue;
                    }
                    for (point, x) in points.iter().enumerate() {
                        if let Some((element, local)) = locator.locate(x).found() {
                            matches.push(RemoteMatch {
                                target,
                                point,
                                owner: rank,
                                element,
                                local,
                            });
                        }
                    }
                }
            }
            Some(Err(e)) => tracing::warn!(rank, error = %e, "本地索引不可用，跳过跨进程匹配"),
            None => {}
        }
        let all_matches = self.comm.all_gather(matches)?;

        // 5. 写入匹配结果，按进程号顺序第一个匹配者胜出
        let mut report = DistributedReport {
            local,
            ..DistributedReport::default()
        };
        let mut resolved: Vec<Option<RemoteMatch>> = vec![None; pending.len()];
        for m in all_matches.iter().flatten().filter(|m| m.target == rank) {
            match &resolved[m.point] {
                None => resolved[m.point] = Some(*m),
                Some(_) => report.n_conflicts += 1,
            }
        }
        let mut write_error = None;
        for (&(idx, ipt), found) in pending.iter().zip(&resolved) {
            match found {
                Some(m) => {
                    let record = InteractionRecord {
                        rank: m.owner,
                        element: m.element,
                        local: m.local,
                    };
                    if let Some(element) = consuming.element_mut(idx) {
                        if let Err(e) = element.interaction_store_mut().set_record(slot, ipt, record) {
                            write_error.get_or_insert(e);
                            continue;
                        }
                    }
                    report.n_remote_found += 1;
                }
                None => report.n_not_found += 1,
            }
        }

        // 6. 屏障（写入失败也要先到达屏障）
        self.comm.barrier();
        if let Some(e) = write_error {
            return Err(e);
        }

        tracing::debug!(
            rank,
            local_found = report.local.n_found,
            remote_found = report.n_remote_found,
            not_found = report.n_not_found,
            conflicts = report.n_conflicts,
            "分布式耦合完成"
        );
        Ok(report)
    }
}
