//! 分布式耦合测试
//!
//! 用线程模拟两个进程：生产网格 [0,2]x[0,1] 按 x=1 划分，
//! 进程 r 拥有 [r, r+1]x[0,1]；消费网格进程 r 拥有 [r+0.5, r+1.5]x[0,1]。

use std::thread;

use md_config::CouplingConfig;
use md_coupling::prelude::*;
use md_coupling::DistributedReport;
use md_geo::Coord;
use md_mesh::generation::BoxMeshGenerator;
use md_mesh::prelude::*;

fn partition(x0: f64) -> ElementMesh<QElement> {
    BoxMeshGenerator::new(&[2, 2], &[1.0, 1.0])
        .with_origin(Coord::new2(x0, 0.0))
        .build()
        .unwrap()
}

type RankOutput = (DistributedReport, Vec<(Coord, ExternalInteraction)>);

fn run_rank(comm: ThreadCommunicator) -> RankOutput {
    let rank = comm.rank();
    let producing = partition(rank as f64);
    let mut consuming = ExternalElement::wrap_mesh(&partition(rank as f64 + 0.5)).unwrap();

    let mut driver = DistributedCouplingDriver::new(comm, CouplingConfig::default(), 0).unwrap();
    let report = driver.set_sources(&mut consuming, &producing).unwrap();

    let mut records = Vec::new();
    for (_, e) in consuming.iter() {
        for ipt in 0..e.n_integration_points() {
            let x = e.position(&e.integration_point(ipt));
            records.push((x, *e.interaction_store().entry(0, ipt).unwrap()));
        }
    }
    (report, records)
}

#[test]
fn points_on_other_partition_are_matched_remotely() {
    let handles: Vec<_> = ThreadCommunicator::group(2)
        .into_iter()
        .map(|comm| thread::spawn(move || run_rank(comm)))
        .collect();
    let outputs: Vec<RankOutput> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // 进程 0：x<1 本地找到，x>1 由进程 1 找到
    let (report0, records0) = &outputs[0];
    assert_eq!(report0.local.n_points, 16);
    assert_eq!(report0.local.n_found, 8);
    assert_eq!(report0.n_remote_found, 8);
    assert_eq!(report0.n_not_found, 0);
    for (x, entry) in records0 {
        let record = entry.record().unwrap();
        assert_eq!(record.rank, if x[0] < 1.0 { 0 } else { 1 });
    }

    // 进程 1：x<2 本地找到，x>2 在任何分区都不存在
    let (report1, records1) = &outputs[1];
    assert_eq!(report1.local.n_found, 8);
    assert_eq!(report1.n_remote_found, 0);
    assert_eq!(report1.n_not_found, 8);
    for (x, entry) in records1 {
        if x[0] < 2.0 {
            assert_eq!(entry.record().map(|r| r.rank), Some(1));
        } else {
            assert_eq!(*entry, ExternalInteraction::NotFound);
        }
    }
}

#[test]
fn serial_communicator_matches_plain_driver() {
    let producing = partition(0.0);
    let mut a = ExternalElement::wrap_mesh(&partition(0.5)).unwrap();
    let mut b = ExternalElement::wrap_mesh(&partition(0.5)).unwrap();

    let mut distributed =
        DistributedCouplingDriver::new(SerialCommunicator, CouplingConfig::default(), 0).unwrap();
    let report = distributed.set_sources(&mut a, &producing).unwrap();
    let plain = CouplingDriver::new(CouplingConfig::default(), 0)
        .unwrap()
        .set_sources(&mut b, &producing)
        .unwrap();

    assert_eq!(report.local, plain);
    assert_eq!(report.n_remote_found, 0);
    assert_eq!(report.n_not_found, plain.n_not_found);
}

#[test]
fn dimension_mismatch_fails_on_every_rank() {
    let handles: Vec<_> = ThreadCommunicator::group(2)
        .into_iter()
        .map(|comm| {
            thread::spawn(move || {
                let rank = comm.rank();
                let mut consuming = ExternalElement::wrap_mesh(&partition(0.0)).unwrap();
                let mut driver =
                    DistributedCouplingDriver::new(comm, CouplingConfig::default(), 0).unwrap();
                if rank == 0 {
                    let producing = partition(0.0);
                    driver.set_sources(&mut consuming, &producing).is_err()
                } else {
                    let producing =
                        md_mesh::generation::structured_line_mesh(2, 0.0, 1.0, 2).unwrap();
                    driver.set_sources(&mut consuming, &producing).is_err()
                }
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }
}
