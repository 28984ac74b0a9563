// apps/md_cli/src/commands/run.rs

//! 耦合命令
//!
//! 生成生产网格与消费网格（消费网格可平移），先耦合一次；给出 `--refine` 时
//! 在域中心细分生产网格，此时耦合状态变为 Stale，再次耦合并统计生产单元发生变化的记录。

use anyhow::{ensure, Context, Result};
use clap::Args;
use md_coupling::prelude::*;
use md_geo::Coord;
use md_mesh::algorithms::refine_near;
use md_mesh::generation::BoxMeshGenerator;
use md_mesh::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use super::load_config;

/// 耦合参数
#[derive(Args)]
pub struct RunArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 生产网格 x 方向单元数
    #[arg(long, default_value = "8")]
    pub nx: usize,

    /// 生产网格 y 方向单元数
    #[arg(long, default_value = "8")]
    pub ny: usize,

    /// 域长度 x
    #[arg(long, default_value = "1.0")]
    pub lx: f64,

    /// 域长度 y
    #[arg(long, default_value = "1.0")]
    pub ly: f64,

    /// 消费网格每轴单元数
    #[arg(long, default_value = "5")]
    pub consumer: usize,

    /// 消费网格 x 方向平移
    #[arg(long, default_value = "0.0")]
    pub offset_x: f64,

    /// 每轴节点数（2 线性，3 二次）
    #[arg(long, default_value = "2")]
    pub nnode_1d: usize,

    /// 首次耦合后在域中心附近细分生产网格的次数
    #[arg(long, default_value = "0")]
    pub refine: usize,

    /// 输出分箱内容的文件
    #[arg(long)]
    pub bins_out: Option<PathBuf>,

    /// 输出分箱索引快照（JSON）的文件
    #[arg(long)]
    pub snapshot: Option<PathBuf>,
}

/// 执行耦合命令
pub fn execute(args: RunArgs) -> Result<()> {
    info!("=== MultiDomain 耦合启动 ===");
    ensure!(args.nx > 0 && args.ny > 0 && args.consumer > 0, "单元数必须为正");
    ensure!(args.lx > 0.0 && args.ly > 0.0, "域长度必须为正");

    let config = load_config(args.config.as_deref())?;

    let mut producing = BoxMeshGenerator::new(&[args.nx, args.ny], &[args.lx, args.ly])
        .with_nnode_1d(args.nnode_1d)
        .build()
        .context("生成生产网格失败")?;
    let consumer = BoxMeshGenerator::new(&[args.consumer, args.consumer], &[args.lx, args.ly])
        .with_origin(Coord::new2(args.offset_x, 0.0))
        .with_nnode_1d(args.nnode_1d)
        .build()
        .context("生成消费网格失败")?;
    let mut consuming = ExternalElement::wrap_mesh(&consumer)?;

    info!(
        "网格: 生产 {} 单元, 消费 {} 单元",
        producing.nelement(),
        consuming.nelement()
    );

    let start = Instant::now();
    let mut driver = CouplingDriver::new(config, 0)?;
    let centre = Coord::new2(0.5 * args.lx, 0.5 * args.ly);
    let cycle = run_cycle(&mut driver, &mut consuming, &mut producing, args.refine, &centre)?;
    let elapsed = start.elapsed();

    print_report("首次耦合", &cycle.first);
    if let Some(second) = &cycle.second {
        println!("\n细分后耦合状态: {:?}", cycle.state_after_refine);
        print_report("重新耦合", second);
        println!("生产单元变化的记录: {}", cycle.n_changed);
    }
    println!("\n耗时: {:.3} ms", elapsed.as_secs_f64() * 1e3);

    let last = cycle.second.as_ref().unwrap_or(&cycle.first);
    if !last.all_found() {
        warn!("{} 个积分点不在生产网格内", last.n_not_found);
    }

    if let Some(index) = driver.index() {
        let occ = index.occupancy();
        println!("\n=== 分箱 ===");
        println!("分箱数: {:?} = {}", index.counts(), occ.n_bins);
        println!("记录数: {}", occ.n_records);
        println!("空箱: {}", occ.n_empty);
        println!("单箱最大记录: {}", occ.max_per_bin);
        println!("非空箱平均记录: {:.2}", occ.mean_per_nonempty_bin);

        if let Some(path) = &args.bins_out {
            write_bins_file(index, path)?;
            info!("分箱内容已写入 {}", path.display());
        }
        if let Some(path) = &args.snapshot {
            std::fs::write(path, index.to_json_string()?)
                .with_context(|| format!("无法写入 {}", path.display()))?;
            info!("分箱快照已写入 {}", path.display());
        }
    }

    Ok(())
}

// ============================================================
// 耦合 -> 细分 -> 重新耦合
// ============================================================

/// 一轮耦合循环的统计
#[derive(Debug)]
struct CouplingCycle {
    first: CouplingReport,
    state_after_refine: CouplingState,
    second: Option<CouplingReport>,
    n_changed: usize,
}

type ProducingMesh = ElementMesh<QElement>;
type ConsumingMesh = ElementMesh<ExternalElement<QElement>>;

/// 耦合一次；`refine > 0` 时细分生产网格后重新耦合
fn run_cycle(
    driver: &mut CouplingDriver,
    consuming: &mut ConsumingMesh,
    producing: &mut ProducingMesh,
    refine: usize,
    centre: &Coord,
) -> Result<CouplingCycle> {
    let first = driver.set_sources(consuming, producing)?;
    let mut cycle = CouplingCycle {
        first,
        state_after_refine: driver.state(consuming, producing),
        second: None,
        n_changed: 0,
    };
    if refine == 0 {
        return Ok(cycle);
    }

    let before = source_elements(consuming, driver.slot());
    for _ in 0..refine {
        let stats = refine_near(producing, centre).context("细分生产网格失败")?;
        info!("细分: {} 个单元 -> {} 个子单元", stats.n_refined, stats.n_created);
    }
    cycle.state_after_refine = driver.state(consuming, producing);

    cycle.second = Some(driver.set_sources(consuming, producing)?);
    let after = source_elements(consuming, driver.slot());
    cycle.n_changed = before.iter().zip(&after).filter(|(a, b)| a != b).count();
    Ok(cycle)
}

/// 按单元与积分点顺序列出每个记录指向的生产单元
fn source_elements(consuming: &ConsumingMesh, slot: usize) -> Vec<Option<ElementIndex>> {
    consuming
        .iter()
        .flat_map(|(_, e)| {
            e.interaction_store()
                .slot_entries(slot)
                .iter()
                .map(|entry| entry.record().map(|r| r.element))
                .collect::<Vec<_>>()
        })
        .collect()
}

fn print_report(title: &str, report: &CouplingReport) {
    println!("\n=== {} ===", title);
    println!("积分点: {}", report.n_points);
    println!("找到: {}", report.n_found);
    println!("未找到: {}", report.n_not_found);
    println!("缓存命中: {}", report.n_cache_hits);
    println!("重建索引: {}", report.index_rebuilt);
}

fn write_bins_file(index: &SpatialBinIndex, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("无法创建 {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    index.write_bins(&mut writer)?;
    writer
        .flush()
        .with_context(|| format!("无法写入 {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use md_config::CouplingConfig;
    use md_mesh::generation::rectangular_quad_mesh;

    fn meshes() -> (ProducingMesh, ConsumingMesh) {
        let producing = rectangular_quad_mesh(2, 2, 1.0, 1.0, 2).unwrap();
        let consuming =
            ExternalElement::wrap_mesh(&rectangular_quad_mesh(3, 3, 1.0, 1.0, 2).unwrap()).unwrap();
        (producing, consuming)
    }

    #[test]
    fn test_refine_then_recouple() {
        let (mut producing, mut consuming) = meshes();
        let mut driver = CouplingDriver::new(CouplingConfig::default(), 0).unwrap();
        let centre = Coord::new2(0.5, 0.5);

        let cycle = run_cycle(&mut driver, &mut consuming, &mut producing, 1, &centre).unwrap();
        assert!(cycle.first.all_found());
        assert_eq!(cycle.state_after_refine, CouplingState::Stale);

        let second = cycle.second.unwrap();
        assert!(second.index_rebuilt);
        assert!(second.all_found());
        assert!(cycle.n_changed > 0);
        assert_eq!(driver.state(&consuming, &producing), CouplingState::Built);
    }

    #[test]
    fn test_without_refine_couples_once() {
        let (mut producing, mut consuming) = meshes();
        let mut driver = CouplingDriver::new(CouplingConfig::default(), 0).unwrap();

        let cycle =
            run_cycle(&mut driver, &mut consuming, &mut producing, 0, &Coord::new2(0.5, 0.5))
                .unwrap();
        assert_eq!(cycle.first.n_points, 36);
        assert_eq!(cycle.state_after_refine, CouplingState::Built);
        assert!(cycle.second.is_none());
        assert_eq!(cycle.n_changed, 0);
    }

    #[test]
    fn test_write_bins_file() {
        let (producing, _) = meshes();
        let index = SpatialBinIndex::build(&producing, &md_config::BinConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bins.txt");

        write_bins_file(&index, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), index.n_records());
    }
}
