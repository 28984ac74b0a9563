// crates/md_mesh/src/spatial_index.rs

//! 网格分箱空间索引
//!
//! 把网格包围盒划分为均匀的 Nx × Ny (× Nz) 分箱网格。每个单元在局部坐标上取
//! 粗采样网格（每轴固定点数，与单元阶次无关），映射到物理空间后把
//! (单元, 采样局部坐标) 记录放入所在分箱。
//!
//! # 存储布局
//!
//! 全部记录存放在一个平铺数组中，按分箱编号排序；`bin_start[b]..bin_start[b+1]`
//! 给出分箱 b 的记录范围。同一分箱内记录保持网格遍历顺序，构建结果是确定的。
//!
//! # 完备性
//!
//! 采样是尽力而为的：高度弯曲或远大于分箱的单元可能穿过某个分箱而没有
//! 采样点落入其中。点定位的螺旋搜索会逐环扩大，通常仍能找到该单元，
//! 必要时可提高 `samples_per_axis`。
//!
//! # 示例
//!
//! ```
//! use md_config::BinConfig;
//! use md_mesh::generation::rectangular_quad_mesh;
//! use md_mesh::spatial_index::SpatialBinIndex;
//! use md_geo::Coord;
//!
//! let mesh = rectangular_quad_mesh(4, 4, 1.0, 1.0, 2).unwrap();
//! let index = SpatialBinIndex::build(&mesh, &BinConfig::default()).unwrap();
//! assert_eq!(index.counts(), &[4, 4]);
//! assert!(index.bin_of(&Coord::new2(0.9, 0.1)).is_some());
//! assert!(index.bin_of(&Coord::new2(1.5, 0.1)).is_none());
//! ```

use std::io::Write;

use md_config::BinConfig;
use md_foundation::ElementIndex;
use md_geo::{BoundingBox, Coord, MAX_DIM};
use serde::{Deserialize, Serialize};

use crate::error::{MeshError, MeshResult};
use crate::traits::{GeomElement, MeshAccess};

/// 快照格式版本号
const SNAPSHOT_VERSION: u32 = 1;

/// 分箱记录：单元及其一个采样点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinRecord {
    /// 单元索引
    pub element: ElementIndex,
    /// 采样点局部坐标
    pub local: Coord,
    /// 采样点物理坐标
    pub position: Coord,
}

/// 分箱占用统计
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BinOccupancy {
    /// 分箱总数
    pub n_bins: usize,
    /// 记录总数
    pub n_records: usize,
    /// 空分箱数
    pub n_empty: usize,
    /// 单个分箱最大记录数
    pub max_per_bin: usize,
    /// 非空分箱平均记录数
    pub mean_per_nonempty_bin: f64,
}

/// 可序列化的索引快照
///
/// 可缓存到文件；加载后需用 `is_current_for` 确认网格未变化。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinIndexSnapshot {
    /// 版本号
    pub version: u32,
    /// 维度
    pub dim: usize,
    /// 各轴分箱数
    pub counts: Vec<usize>,
    /// 包围盒
    pub bbox: BoundingBox,
    /// 各分箱起始偏移（长度为分箱数 + 1）
    pub bin_start: Vec<usize>,
    /// 记录
    pub records: Vec<BinRecord>,
    /// 每轴采样数
    pub samples_per_axis: usize,
    /// 网格 id
    pub mesh_id: u64,
    /// 网格版本
    pub revision: u64,
    /// 构建时的单元数
    pub nelement: usize,
}

/// 网格分箱空间索引
#[derive(Debug, Clone)]
pub struct SpatialBinIndex {
    dim: usize,
    counts: [usize; MAX_DIM],
    bbox: BoundingBox,
    bin_start: Vec<usize>,
    records: Vec<BinRecord>,
    samples_per_axis: usize,
    mesh_id: u64,
    revision: u64,
    nelement: usize,
}

impl SpatialBinIndex {
    /// 构建索引
    ///
    /// 分箱数由 `config.counts` 给出，未给出时按单元数估计。
    /// 分箱数为零或长度与网格维度不符时返回配置错误。
    pub fn build<M: MeshAccess>(mesh: &M, config: &BinConfig) -> MeshResult<Self> {
        let dim = mesh.dimension();
        if dim == 0 || dim > MAX_DIM {
            return Err(MeshError::dimension_mismatch("SpatialBinIndex::build", MAX_DIM, dim));
        }
        let resolved = config.resolve_counts(dim, mesh.nelement())?;
        let mut counts = [1usize; MAX_DIM];
        counts[..dim].copy_from_slice(&resolved);

        let samples_per_axis = config.samples_per_axis.max(2);
        let samples = sample_mesh(mesh, samples_per_axis)?;

        let bbox = if samples.is_empty() {
            BoundingBox::from_corners(Coord::zeros(dim), Coord::zeros(dim))
        } else {
            BoundingBox::from_points(dim, samples.iter().map(|r| &r.position))
        };
        for a in 0..dim {
            if !samples.is_empty() && bbox.extent(a) <= 0.0 {
                tracing::warn!(axis = a, mesh = mesh.mesh_id(), "网格包围盒在该轴上退化，所有采样落入同一层分箱");
            }
        }

        let mut index = Self {
            dim,
            counts,
            bbox,
            bin_start: Vec::new(),
            records: Vec::new(),
            samples_per_axis,
            mesh_id: mesh.mesh_id(),
            revision: mesh.revision(),
            nelement: mesh.nelement(),
        };
        index.fill(samples);

        tracing::debug!(
            mesh = index.mesh_id,
            revision = index.revision,
            bins = ?index.counts(),
            records = index.records.len(),
            min = ?index.bbox.min.as_slice(),
            max = ?index.bbox.max.as_slice(),
            "分箱索引构建完成"
        );
        Ok(index)
    }

    /// 重新构建（包围盒与分箱数一并重算）
    pub fn rebuild<M: MeshAccess>(&mut self, mesh: &M, config: &BinConfig) -> MeshResult<()> {
        self.flush();
        *self = Self::build(mesh, config)?;
        Ok(())
    }

    /// 清空所有分箱内容，保留包围盒与分箱网格
    pub fn flush(&mut self) {
        self.records.clear();
        self.bin_start = vec![0; self.n_bins() + 1];
    }

    /// 按分箱编号稳定排序后写入平铺存储
    fn fill(&mut self, samples: Vec<BinRecord>) {
        let nbin = self.n_bins();
        let bins: Vec<usize> = samples
            .iter()
            .map(|r| self.bin_of_clamped(&r.position))
            .collect();

        let mut bin_start = vec![0usize; nbin + 1];
        for &b in &bins {
            bin_start[b + 1] += 1;
        }
        for b in 0..nbin {
            bin_start[b + 1] += bin_start[b];
        }

        let mut order: Vec<usize> = (0..samples.len()).collect();
        order.sort_by_key(|&i| bins[i]);
        self.records = order.into_iter().map(|i| samples[i]).collect();
        self.bin_start = bin_start;
    }

    // ========================================================================
    // 基本查询
    // ========================================================================

    /// 维度
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// 各轴分箱数
    #[inline]
    pub fn counts(&self) -> &[usize] {
        &self.counts[..self.dim]
    }

    /// 分箱总数
    #[inline]
    pub fn n_bins(&self) -> usize {
        self.counts[..self.dim].iter().product()
    }

    /// 记录总数
    #[inline]
    pub fn n_records(&self) -> usize {
        self.records.len()
    }

    /// 是否没有任何记录（空网格或已清空）
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 包围盒
    #[inline]
    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bbox
    }

    /// 每轴采样数
    #[inline]
    pub fn samples_per_axis(&self) -> usize {
        self.samples_per_axis
    }

    /// 构建时的网格 id
    #[inline]
    pub fn mesh_id(&self) -> u64 {
        self.mesh_id
    }

    /// 构建时的网格版本
    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// 索引是否对应网格的当前状态
    pub fn is_current_for<M: MeshAccess>(&self, mesh: &M) -> bool {
        self.mesh_id == mesh.mesh_id() && self.revision == mesh.revision()
    }

    // ========================================================================
    // 分箱编号
    // ========================================================================

    fn axis_bin(&self, a: usize, v: f64) -> usize {
        let n = self.counts[a];
        let extent = self.bbox.extent(a);
        if !(extent > 0.0) {
            return 0;
        }
        let f = (v - self.bbox.min[a]) / extent * n as f64;
        if f <= 0.0 {
            0
        } else {
            (f as usize).min(n - 1)
        }
    }

    /// 点所在分箱；点在包围盒外返回 None
    pub fn bin_of(&self, x: &Coord) -> Option<usize> {
        if !self.bbox.contains(x, 0.0) {
            return None;
        }
        Some(self.bin_of_clamped(x))
    }

    /// 点所在分箱，包围盒外的点截断到最近的边界分箱
    pub fn bin_of_clamped(&self, x: &Coord) -> usize {
        let mut multi = [0usize; MAX_DIM];
        for (a, m) in multi.iter_mut().enumerate().take(self.dim.min(x.dim())) {
            *m = self.axis_bin(a, x[a]);
        }
        self.bin_from_multi_index(&multi)
    }

    /// 分箱线性编号 -> 各轴编号（x 最快）
    pub fn bin_multi_index(&self, bin: usize) -> [usize; MAX_DIM] {
        let mut out = [0usize; MAX_DIM];
        let mut rest = bin;
        for (a, slot) in out.iter_mut().enumerate().take(self.dim) {
            *slot = rest % self.counts[a];
            rest /= self.counts[a];
        }
        out
    }

    /// 各轴编号 -> 分箱线性编号
    pub fn bin_from_multi_index(&self, multi: &[usize; MAX_DIM]) -> usize {
        let mut linear = 0;
        let mut stride = 1;
        for a in 0..self.dim {
            linear += multi[a] * stride;
            stride *= self.counts[a];
        }
        linear
    }

    /// 分箱的物理范围
    pub fn bin_extent(&self, bin: usize) -> BoundingBox {
        let multi = self.bin_multi_index(bin);
        let mut lo = self.bbox.min;
        let mut hi = self.bbox.min;
        for a in 0..self.dim {
            let h = self.bbox.extent(a) / self.counts[a] as f64;
            lo[a] += multi[a] as f64 * h;
            hi[a] += (multi[a] + 1) as f64 * h;
        }
        BoundingBox::from_corners(lo, hi)
    }

    /// 分箱内的记录
    pub fn bin_contents(&self, bin: usize) -> &[BinRecord] {
        if bin + 1 >= self.bin_start.len() {
            return &[];
        }
        &self.records[self.bin_start[bin]..self.bin_start[bin + 1]]
    }

    // ========================================================================
    // 螺旋环
    // ========================================================================

    /// 与 `bin` 的 Chebyshev 距离恰为 `level` 的所有分箱（按编号升序）
    ///
    /// 超出网格的部分被截掉，不回绕。环完全落在网格外时返回空集。
    pub fn neighbour_bins(&self, bin: usize, level: usize) -> Vec<usize> {
        if bin >= self.n_bins() {
            return Vec::new();
        }
        if level == 0 {
            return vec![bin];
        }
        let centre = self.bin_multi_index(bin);
        let mut lo = [0usize; MAX_DIM];
        let mut hi = [0usize; MAX_DIM];
        for a in 0..self.dim {
            lo[a] = centre[a].saturating_sub(level);
            hi[a] = (centre[a] + level).min(self.counts[a] - 1);
        }

        let mut out = Vec::new();
        for k in lo[2]..=hi[2] {
            for j in lo[1]..=hi[1] {
                for i in lo[0]..=hi[0] {
                    let m = [i, j, k];
                    let cheb = (0..self.dim)
                        .map(|a| m[a].abs_diff(centre[a]))
                        .max()
                        .unwrap_or(0);
                    if cheb == level {
                        out.push(self.bin_from_multi_index(&m));
                    }
                }
            }
        }
        out
    }

    /// 从 `bin` 出发覆盖整个网格所需的最大环数
    pub fn max_ring_level(&self, bin: usize) -> usize {
        let m = self.bin_multi_index(bin);
        (0..self.dim)
            .map(|a| m[a].max(self.counts[a] - 1 - m[a]))
            .max()
            .unwrap_or(0)
    }

    // ========================================================================
    // 诊断
    // ========================================================================

    /// 分箱占用统计
    pub fn occupancy(&self) -> BinOccupancy {
        let n_bins = self.n_bins();
        let mut n_empty = 0;
        let mut max_per_bin = 0;
        for b in 0..n_bins {
            let n = self.bin_contents(b).len();
            if n == 0 {
                n_empty += 1;
            }
            max_per_bin = max_per_bin.max(n);
        }
        let nonempty = n_bins - n_empty;
        BinOccupancy {
            n_bins,
            n_records: self.records.len(),
            n_empty,
            max_per_bin,
            mean_per_nonempty_bin: if nonempty == 0 {
                0.0
            } else {
                self.records.len() as f64 / nonempty as f64
            },
        }
    }

    /// 输出全部记录，每行: 分箱 单元 局部坐标... 物理坐标...
    pub fn write_bins<W: Write>(&self, writer: &mut W) -> MeshResult<()> {
        for b in 0..self.n_bins() {
            for rec in self.bin_contents(b) {
                write!(writer, "{} {}", b, rec.element)?;
                for v in rec.local.as_slice() {
                    write!(writer, " {v:.12e}")?;
                }
                for v in rec.position.as_slice() {
                    write!(writer, " {v:.12e}")?;
                }
                writeln!(writer)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // 快照
    // ========================================================================

    /// 导出快照
    pub fn to_snapshot(&self) -> BinIndexSnapshot {
        BinIndexSnapshot {
            version: SNAPSHOT_VERSION,
            dim: self.dim,
            counts: self.counts().to_vec(),
            bbox: self.bbox,
            bin_start: self.bin_start.clone(),
            records: self.records.clone(),
            samples_per_axis: self.samples_per_axis,
            mesh_id: self.mesh_id,
            revision: self.revision,
            nelement: self.nelement,
        }
    }

    /// 从快照恢复，校验结构一致性
    pub fn from_snapshot(snapshot: BinIndexSnapshot) -> MeshResult<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(MeshError::invalid_snapshot(format!(
                "不支持的版本 {}",
                snapshot.version
            )));
        }
        let dim = snapshot.dim;
        if dim == 0 || dim > MAX_DIM || snapshot.counts.len() != dim || snapshot.bbox.dim() != dim {
            return Err(MeshError::invalid_snapshot("维度与分箱数不一致"));
        }
        if snapshot.counts.iter().any(|&n| n == 0) {
            return Err(MeshError::invalid_snapshot("分箱数必须为正"));
        }
        let nbin: usize = snapshot.counts.iter().product();
        let starts = &snapshot.bin_start;
        if starts.len() != nbin + 1
            || starts[0] != 0
            || starts.windows(2).any(|w| w[0] > w[1])
            || starts[nbin] != snapshot.records.len()
        {
            return Err(MeshError::invalid_snapshot("分箱偏移表无效"));
        }

        let mut counts = [1usize; MAX_DIM];
        counts[..dim].copy_from_slice(&snapshot.counts);
        Ok(Self {
            dim,
            counts,
            bbox: snapshot.bbox,
            bin_start: snapshot.bin_start,
            records: snapshot.records,
            samples_per_axis: snapshot.samples_per_axis,
            mesh_id: snapshot.mesh_id,
            revision: snapshot.revision,
            nelement: snapshot.nelement,
        })
    }

    /// 快照序列化为 JSON
    pub fn to_json_string(&self) -> MeshResult<String> {
        serde_json::to_string(&self.to_snapshot())
            .map_err(|e| MeshError::invalid_snapshot(e.to_string()))
    }

    /// 从 JSON 快照恢复
    pub fn from_json_str(json: &str) -> MeshResult<Self> {
        let snapshot: BinIndexSnapshot =
            serde_json::from_str(json).map_err(|e| MeshError::invalid_snapshot(e.to_string()))?;
        Self::from_snapshot(snapshot)
    }
}

/// 对网格中每个单元在局部坐标网格上采样
fn sample_mesh<M: MeshAccess>(mesh: &M, samples_per_axis: usize) -> MeshResult<Vec<BinRecord>> {
    let dim = mesh.dimension();
    let mut samples = Vec::new();
    for i in 0..mesh.nelement() {
        let Some((element, e)) = mesh.element_at(i) else {
            continue;
        };
        if e.ndim() != dim {
            return Err(MeshError::dimension_mismatch(
                "SpatialBinIndex::build",
                dim,
                e.ndim(),
            ));
        }
        for local in e.reference_samples(samples_per_axis) {
            let position = e.position(&local);
            if !position.is_finite() {
                tracing::warn!(element = %element, "单元采样得到非有限坐标，已跳过");
                continue;
            }
            samples.push(BinRecord {
                element,
                local,
                position,
            });
        }
    }
    Ok(samples)
}
