//! Balanced k-means tree partition.
//!
//! Every node except the root is centered on a real sample, so a full
//! traversal of one tree visits each sample exactly once. A node's children
//! are stored contiguously in `child_start..child_end`; leaves have an empty
//! range.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::error::{AnnError, Result};
use crate::types::{DistCalcMethod, IndexAlgoType, SizeType, VecId, VectorValue};

use super::distance::{distance, widen};
use super::params::TreeParams;
use super::samples::{Candidate, Samples};
use super::tree_index::Partitioner;

const KMEANS_ITERATIONS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
struct BktNode {
    /// Center sample, `-1` for the root.
    center: SizeType,
    child_start: SizeType,
    child_end: SizeType,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct BktTree {
    nodes: Vec<BktNode>,
}

/// A set of balanced k-means trees over the samples.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BktForest {
    trees: Vec<BktTree>,
}

impl BktTree {
    fn build<T: VectorValue>(samples: &Samples<T>, params: &TreeParams, seed: usize) -> Self {
        let mut nodes = vec![BktNode {
            center: -1,
            child_start: 0,
            child_end: 0,
        }];
        if samples.is_empty() {
            return Self { nodes };
        }

        let mut stack: Vec<(usize, Vec<VecId>)> = vec![(0, (0..samples.len()).collect())];
        while let Some((parent, ids)) = stack.pop() {
            let groups = if ids.len() <= params.bkt_leaf_size {
                ids.iter().map(|&id| vec![id]).collect()
            } else {
                kmeans(samples, &ids, params, seed)
            };

            let start = nodes.len();
            for group in groups {
                let center = medoid(samples, &group, params.dist_calc_method);
                let node = nodes.len();
                nodes.push(BktNode {
                    center: center as SizeType,
                    child_start: 0,
                    child_end: 0,
                });
                let rest: Vec<VecId> = group.into_iter().filter(|&id| id != center).collect();
                if !rest.is_empty() {
                    stack.push((node, rest));
                }
            }
            nodes[parent].child_start = start as SizeType;
            nodes[parent].child_end = nodes.len() as SizeType;
        }
        Self { nodes }
    }

    fn seeds<T: VectorValue>(
        &self,
        samples: &Samples<T>,
        query: &[f32],
        method: DistCalcMethod,
        limit: usize,
        out: &mut Vec<VecId>,
    ) {
        let mut heap = BinaryHeap::new();
        heap.push(Reverse(Candidate { dist: 0.0, id: 0 }));
        let mut taken = 0;
        while let Some(Reverse(c)) = heap.pop() {
            let node = self.nodes[c.id];
            if node.center >= 0 {
                out.push(node.center as VecId);
                taken += 1;
                if taken >= limit {
                    break;
                }
            }
            for child in node.child_start..node.child_end {
                let center = self.nodes[child as usize].center as VecId;
                heap.push(Reverse(Candidate {
                    dist: distance(samples.row(center), query, method),
                    id: child as usize,
                }));
            }
        }
    }
}

/// Splits `ids` into at most `k` clusters with a few Lloyd iterations.
/// Initial centroids are spread evenly over `ids`, shifted by `seed` so
/// each tree partitions differently.
fn kmeans<T: VectorValue>(
    samples: &Samples<T>,
    ids: &[VecId],
    params: &TreeParams,
    seed: usize,
) -> Vec<Vec<VecId>> {
    let k = params.bkt_kmeans_k.min(ids.len());
    let dim = samples.dim();
    let mut centroids: Vec<Vec<f32>> = (0..k)
        .map(|i| {
            let id = ids[(i * ids.len() / k + seed) % ids.len()];
            widen(samples.row(id))
        })
        .collect();

    let mut assignment = vec![0usize; ids.len()];
    for _ in 0..KMEANS_ITERATIONS {
        let mut changed = false;
        for (slot, &id) in ids.iter().enumerate() {
            let row = samples.row(id);
            let best = centroids
                .iter()
                .enumerate()
                .map(|(c, centroid)| Candidate {
                    dist: distance(row, centroid, params.dist_calc_method),
                    id: c,
                })
                .min()
                .map_or(0, |c| c.id);
            if assignment[slot] != best {
                assignment[slot] = best;
                changed = true;
            }
        }

        let mut sums = vec![vec![0.0f32; dim]; k];
        let mut counts = vec![0usize; k];
        for (slot, &id) in ids.iter().enumerate() {
            let c = assignment[slot];
            counts[c] += 1;
            for (acc, v) in sums[c].iter_mut().zip(samples.row(id)) {
                *acc += v.to_f32();
            }
        }
        for (c, sum) in sums.into_iter().enumerate() {
            if counts[c] > 0 {
                centroids[c] = sum.into_iter().map(|s| s / counts[c] as f32).collect();
            }
        }
        if !changed {
            break;
        }
    }

    let mut groups = vec![Vec::new(); k];
    for (slot, &id) in ids.iter().enumerate() {
        groups[assignment[slot]].push(id);
    }
    groups.retain(|g: &Vec<VecId>| !g.is_empty());

    // Identical points collapse into one cluster; split them evenly instead.
    if groups.len() < 2 {
        let chunk = ids.len().div_ceil(k.max(2));
        return ids.chunks(chunk).map(<[VecId]>::to_vec).collect();
    }
    groups
}

/// Member of `group` closest to the group mean; lowest id on ties.
fn medoid<T: VectorValue>(samples: &Samples<T>, group: &[VecId], method: DistCalcMethod) -> VecId {
    if group.len() <= 2 {
        return group[0];
    }
    let mut mean = vec![0.0f32; samples.dim()];
    for &id in group {
        for (acc, v) in mean.iter_mut().zip(samples.row(id)) {
            *acc += v.to_f32();
        }
    }
    for m in &mut mean {
        *m /= group.len() as f32;
    }
    group
        .iter()
        .map(|&id| Candidate {
            dist: distance(samples.row(id), &mean, method),
            id,
        })
        .min()
        .map_or(group[0], |c| c.id)
}

impl Partitioner for BktForest {
    const ALGO: IndexAlgoType = IndexAlgoType::BKT;

    fn build<T: VectorValue>(samples: &Samples<T>, params: &TreeParams) -> Self {
        let trees = (0..params.tree_number)
            .map(|t| BktTree::build(samples, params, t))
            .collect();
        Self { trees }
    }

    fn seeds<T: VectorValue>(
        &self,
        samples: &Samples<T>,
        query: &[f32],
        method: DistCalcMethod,
        limit: usize,
    ) -> Vec<VecId> {
        let per_tree = limit.div_ceil(self.trees.len().max(1));
        let mut out = Vec::with_capacity(limit);
        for tree in &self.trees {
            tree.seeds(samples, query, method, per_tree, &mut out);
        }
        out
    }

    fn node_count(&self) -> usize {
        self.trees.iter().map(|t| t.nodes.len()).sum()
    }

    fn validate(&self, rows: usize, _dim: usize) -> Result<()> {
        for tree in &self.trees {
            let n = tree.nodes.len() as SizeType;
            let bad = tree.nodes.iter().enumerate().any(|(i, node)| {
                (i > 0 && (node.center < 0 || node.center as usize >= rows))
                    || node.child_start < 0
                    || node.child_start > node.child_end
                    || node.child_end > n
                    || (node.child_start < node.child_end && node.child_start as usize <= i)
            });
            if tree.nodes.is_empty() || bad {
                return Err(AnnError::parse("BKT segment is inconsistent"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encode_row;

    fn grid(n: usize) -> Samples<f32> {
        let mut s = Samples::new(2);
        for i in 0..n {
            s.push_encoded(&encode_row(&[(i % 10) as f32, (i / 10) as f32]));
        }
        s
    }

    fn small_params() -> TreeParams {
        TreeParams {
            bkt_kmeans_k: 4,
            bkt_leaf_size: 3,
            tree_number: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_every_sample_is_a_center_once() {
        let samples = grid(57);
        let forest = BktForest::build(&samples, &small_params());
        assert_eq!(forest.trees.len(), 2);
        for tree in &forest.trees {
            let mut centers: Vec<SizeType> =
                tree.nodes.iter().skip(1).map(|n| n.center).collect();
            centers.sort_unstable();
            assert_eq!(centers, (0..57).collect::<Vec<SizeType>>());
        }
        assert_eq!(forest.node_count(), 2 * 58);
        assert!(forest.validate(57, 2).is_ok());
        assert!(forest.validate(10, 2).is_err());
    }

    #[test]
    fn test_seeds_start_near_query() {
        let samples = grid(100);
        let forest = BktForest::build(&samples, &small_params());
        let seeds = forest.seeds(&samples, &[3.0, 4.0], DistCalcMethod::L2, 200);
        // A full traversal reaches every sample.
        let mut unique = seeds.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 100);
        assert!(seeds.contains(&43));
    }

    #[test]
    fn test_identical_points_still_partition() {
        let mut samples = Samples::<u8>::new(2);
        for _ in 0..40 {
            samples.push_encoded(&[7, 7]);
        }
        let forest = BktForest::build(&samples, &small_params());
        assert!(forest.validate(40, 2).is_ok());
        assert_eq!(forest.node_count(), 2 * 41);
    }

    #[test]
    fn test_empty_samples() {
        let forest = BktForest::build(&Samples::<f32>::new(4), &small_params());
        let seeds = forest.seeds(&Samples::<f32>::new(4), &[0.0; 4], DistCalcMethod::L2, 5);
        assert!(seeds.is_empty());
    }
}
