// crates/md_mesh/src/algorithms/refine.rs

//! 网格细分
//!
//! 按判据选择单元并把每个单元均匀细分为 2^d 个子单元。细分后新节点没有方程编号，
//! 可调用 [`renumber_equations`] 按节点位置重新编号（位置重合的节点共享编号）。
//!
//! 细分会使网格版本号递增，原先基于该网格构建的分箱索引与交互记录都需要重建。

use std::collections::HashMap;

use md_foundation::ElementIndex;
use md_geo::{BoundingBox, Coord};

use crate::error::MeshResult;
use crate::mesh::ElementMesh;
use crate::traits::{GeomElement, MeshAccess, NodalElement, Refineable};

/// 节点合并容差（相对网格包围盒对角线）
pub const NODE_MERGE_TOLERANCE: f64 = 1e-9;

/// 细分统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefineStats {
    /// 被细分的单元数
    pub n_refined: usize,
    /// 新产生的单元数
    pub n_created: usize,
}

/// 细分满足判据的单元
///
/// 判据在细分开始前对全部单元求值，新产生的子单元本轮不再参与。
pub fn refine_where<E, P>(mesh: &mut ElementMesh<E>, predicate: P) -> MeshResult<RefineStats>
where
    E: GeomElement + Refineable,
    P: Fn(ElementIndex, &E) -> bool,
{
    let marked: Vec<ElementIndex> = mesh
        .iter()
        .filter(|(idx, e)| predicate(*idx, e))
        .map(|(idx, _)| idx)
        .collect();

    let mut stats = RefineStats::default();
    for idx in marked {
        let children = mesh.split_element(idx)?;
        stats.n_refined += 1;
        stats.n_created += children.len();
    }

    tracing::debug!(
        mesh = mesh.mesh_id(),
        refined = stats.n_refined,
        created = stats.n_created,
        "网格细分完成"
    );
    Ok(stats)
}

/// 一致细分所有单元
pub fn refine_uniform<E>(mesh: &mut ElementMesh<E>) -> MeshResult<RefineStats>
where
    E: GeomElement + Refineable,
{
    refine_where(mesh, |_, _| true)
}

/// 细分包含给定物理点的单元（按角点包围盒判断）
pub fn refine_near<E>(mesh: &mut ElementMesh<E>, point: &Coord) -> MeshResult<RefineStats>
where
    E: GeomElement + Refineable,
{
    refine_where(mesh, |_, e| e.bounding_box(2).contains(point, 0.0))
}

/// 按节点位置重新分配方程编号，返回自由度总数
///
/// 位置重合（在合并容差内）的节点共享编号；`pinned(x)` 为 true 的节点不分配编号。
pub fn renumber_equations<E, P>(mesh: &mut ElementMesh<E>, pinned: P) -> usize
where
    E: GeomElement + NodalElement,
    P: Fn(&Coord) -> bool,
{
    let dim = mesh.dimension();
    let mut bbox = BoundingBox::empty(dim);
    for (_, e) in mesh.iter() {
        for j in 0..e.nnode() {
            bbox.expand(&e.node_position(j));
        }
    }
    let tol = (NODE_MERGE_TOLERANCE * bbox.diagonal()).max(f64::MIN_POSITIVE);

    let mut node_dofs: HashMap<[i64; 3], Option<usize>> = HashMap::new();
    let mut next = 0usize;
    mesh.for_each_mut(|_, e| {
        let nfield = e.nfield();
        for j in 0..e.nnode() {
            let x = e.node_position(j);
            let mut key = [0i64; 3];
            for (a, k) in key.iter_mut().enumerate().take(x.dim()) {
                *k = (x[a] / tol).round() as i64;
            }
            let first = *node_dofs.entry(key).or_insert_with(|| {
                if pinned(&x) || nfield == 0 {
                    None
                } else {
                    let base = next;
                    next += nfield;
                    Some(base)
                }
            });
            for f in 0..nfield {
                e.set_eqn_number(j, f, first.map(|base| base + f));
            }
        }
    });
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{rectangular_quad_mesh, BoxMeshGenerator};

    #[test]
    fn test_uniform_refine_counts() {
        let mut mesh = rectangular_quad_mesh(2, 2, 1.0, 1.0, 2).unwrap();
        let stats = refine_uniform(&mut mesh).unwrap();
        assert_eq!(stats.n_refined, 4);
        assert_eq!(stats.n_created, 16);
        assert_eq!(mesh.nelement(), 16);
    }

    #[test]
    fn test_refine_near_point() {
        let mut mesh = rectangular_quad_mesh(2, 1, 2.0, 1.0, 2).unwrap();
        let stats = refine_near(&mut mesh, &Coord::new2(0.25, 0.5)).unwrap();
        assert_eq!(stats.n_refined, 1);
        assert_eq!(mesh.nelement(), 5);
    }

    #[test]
    fn test_renumber_after_refine() {
        let mut mesh = BoxMeshGenerator::new(&[1, 1], &[1.0, 1.0])
            .build_with_field(1, |x| vec![x[0]], |_| false)
            .unwrap();
        refine_uniform(&mut mesh).unwrap();
        let ndof = renumber_equations(&mut mesh, |_| false);
        // 3x3 个全局节点
        assert_eq!(ndof, 9);
        for (_, e) in mesh.iter() {
            for j in 0..e.nnode() {
                assert!(e.eqn_number(j, 0).is_some());
            }
        }
    }

    #[test]
    fn test_renumber_respects_pinned() {
        let mut mesh = BoxMeshGenerator::new(&[2], &[1.0])
            .build_with_field(2, |_| vec![0.0, 0.0], |_| false)
            .unwrap();
        let ndof = renumber_equations(&mut mesh, |x| x[0] > 0.99);
        assert_eq!(ndof, 4);
    }
}
