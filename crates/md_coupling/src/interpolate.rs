// crates/md_coupling/src/interpolate.rs

//! 插值能力接口与外部场访问
//!
//! 生产单元实现 [`Interpolatable`]，给出局部坐标处的场值以及
//! (全局方程编号, 插值权重) 形式的导数敏感度，供消费方组装跨网格 Jacobian。
//! [`ExternalSource`] 把消费单元中保存的交互记录解析为生产单元上的场值。

use md_geo::Coord;
use md_mesh::{MeshAccess, NodalElement, QElement};

use crate::error::{CouplingError, CouplingResult};
use crate::interaction::{ElementWithExternalElement, ExternalElement, ExternalInteraction};

/// 可插值的生产单元
pub trait Interpolatable {
    /// 场变量数
    fn nfield(&self) -> usize;

    /// 局部坐标处的场值
    fn interpolate(&self, field: usize, s: &Coord) -> f64;

    /// 场值对全局未知量的导数：(方程编号, 权重)，被钉住的节点不出现
    fn interpolate_derivatives(&self, field: usize, s: &Coord) -> Vec<(usize, f64)>;
}

impl Interpolatable for QElement {
    fn nfield(&self) -> usize {
        NodalElement::nfield(self)
    }

    fn interpolate(&self, field: usize, s: &Coord) -> f64 {
        if field >= NodalElement::nfield(self) {
            return f64::NAN;
        }
        self.interpolate_field(field, s)
    }

    fn interpolate_derivatives(&self, field: usize, s: &Coord) -> Vec<(usize, f64)> {
        if field >= NodalElement::nfield(self) {
            return Vec::new();
        }
        let Some(shape) = self.shape(s) else {
            return Vec::new();
        };
        (0..self.nnode())
            .filter_map(|j| self.eqn_number(j, field).map(|eqn| (eqn, shape.psi(j))))
            .collect()
    }
}

impl<E: Interpolatable> Interpolatable for ExternalElement<E> {
    fn nfield(&self) -> usize {
        self.inner().nfield()
    }

    fn interpolate(&self, field: usize, s: &Coord) -> f64 {
        self.inner().interpolate(field, s)
    }

    fn interpolate_derivatives(&self, field: usize, s: &Coord) -> Vec<(usize, f64)> {
        self.inner().interpolate_derivatives(field, s)
    }
}

/// 外部场值及其敏感度
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalValue {
    /// 插值结果
    pub value: f64,
    /// (生产网格方程编号, 权重)
    pub sensitivities: Vec<(usize, f64)>,
}

/// 从消费单元的交互记录读取生产网格上的场
///
/// 只解析属于本进程的记录；单元索引经代际检查，网格细分后未重新耦合会得到
/// `StaleInteraction`。
pub struct ExternalSource<'a, P: MeshAccess> {
    producing: &'a P,
    rank: usize,
}

impl<'a, P> ExternalSource<'a, P>
where
    P: MeshAccess,
    P::Element: Interpolatable,
{
    /// 创建（串行，进程号 0）
    pub fn new(producing: &'a P) -> Self {
        Self { producing, rank: 0 }
    }

    /// 设置本进程号
    pub fn with_rank(mut self, rank: usize) -> Self {
        self.rank = rank;
        self
    }

    /// 把 (槽位, 积分点) 解析为生产单元与局部坐标
    pub fn resolve<C: ElementWithExternalElement>(
        &self,
        consumer: &C,
        slot: usize,
        ipt: usize,
    ) -> CouplingResult<(&'a P::Element, Coord)> {
        let record = match consumer.interaction_store().entry(slot, ipt)? {
            ExternalInteraction::Located(record) => *record,
            ExternalInteraction::NotFound => {
                return Err(CouplingError::InteractionNotFound { slot, ipt })
            }
            ExternalInteraction::Unset => {
                return Err(CouplingError::InteractionUnset { slot, ipt })
            }
        };
        if record.rank != self.rank {
            return Err(CouplingError::RemoteInteraction {
                owner: record.rank,
                rank: self.rank,
            });
        }
        let element = self
            .producing
            .element(record.element)
            .ok_or(CouplingError::StaleInteraction {
                slot,
                ipt,
                element: record.element,
            })?;
        Ok((element, record.local))
    }

    /// 场值
    pub fn value<C: ElementWithExternalElement>(
        &self,
        consumer: &C,
        slot: usize,
        ipt: usize,
        field: usize,
    ) -> CouplingResult<f64> {
        let (element, local) = self.resolve(consumer, slot, ipt)?;
        Ok(element.interpolate(field, &local))
    }

    /// 场值及对生产网格未知量的敏感度
    pub fn value_with_derivatives<C: ElementWithExternalElement>(
        &self,
        consumer: &C,
        slot: usize,
        ipt: usize,
        field: usize,
    ) -> CouplingResult<ExternalValue> {
        let (element, local) = self.resolve(consumer, slot, ipt)?;
        Ok(ExternalValue {
            value: element.interpolate(field, &local),
            sensitivities: element.interpolate_derivatives(field, &local),
        })
    }
}
