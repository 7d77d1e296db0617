//! KD-tree partition.
//!
//! Each tree splits at the median of one of the highest-variance
//! dimensions; trees rotate through those dimensions so the forest does
//! not share split planes. A negative child `c` is the leaf sample
//! `-(c + 1)`.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::error::{AnnError, Result};
use crate::types::{DistCalcMethod, IndexAlgoType, SizeType, VecId, VectorValue};

use super::params::TreeParams;
use super::samples::{Candidate, Samples};
use super::tree_index::Partitioner;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
struct KdtNode {
    left: SizeType,
    right: SizeType,
    split_dim: SizeType,
    split_value: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct KdtTree {
    nodes: Vec<KdtNode>,
    /// Root child, encoded like `left`/`right`. Meaningless when empty.
    root: SizeType,
}

/// A set of KD-trees over the samples.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KdtForest {
    trees: Vec<KdtTree>,
}

fn leaf(id: VecId) -> SizeType {
    -(id as SizeType) - 1
}

/// Indices of the `ntop` highest-variance dimensions, widest first.
fn top_dimensions<T: VectorValue>(samples: &Samples<T>, ids: &[VecId], ntop: usize) -> Vec<usize> {
    let dim = samples.dim();
    let n = ids.len() as f32;
    let mut mean = vec![0.0f32; dim];
    for &id in ids {
        for (m, v) in mean.iter_mut().zip(samples.row(id)) {
            *m += v.to_f32();
        }
    }
    mean.iter_mut().for_each(|m| *m /= n);

    let mut var = vec![0.0f32; dim];
    for &id in ids {
        for ((acc, v), m) in var.iter_mut().zip(samples.row(id)).zip(&mean) {
            let d = v.to_f32() - m;
            *acc += d * d;
        }
    }

    let mut order: Vec<Candidate> = var
        .into_iter()
        .enumerate()
        .map(|(d, v)| Candidate { dist: -v, id: d })
        .collect();
    order.sort();
    order.into_iter().take(ntop.max(1)).map(|c| c.id).collect()
}

impl KdtTree {
    fn build<T: VectorValue>(samples: &Samples<T>, params: &TreeParams, tree: usize) -> Self {
        let mut out = Self::default();
        if samples.is_empty() {
            return out;
        }
        let mut ids: Vec<VecId> = (0..samples.len()).collect();
        out.root = out.split(samples, &mut ids, params.num_top_dimension_kdt_split, tree);
        out
    }

    /// Builds the subtree over `ids` and returns its encoded child pointer.
    fn split<T: VectorValue>(
        &mut self,
        samples: &Samples<T>,
        ids: &mut [VecId],
        ntop: usize,
        depth: usize,
    ) -> SizeType {
        if ids.len() == 1 {
            return leaf(ids[0]);
        }
        let dims = top_dimensions(samples, ids, ntop);
        let split_dim = dims[depth % dims.len()];
        let mid = ids.len() / 2;
        ids.select_nth_unstable_by(mid, |&a, &b| {
            samples.row(a)[split_dim]
                .to_f32()
                .total_cmp(&samples.row(b)[split_dim].to_f32())
                .then(a.cmp(&b))
        });
        let split_value = samples.row(ids[mid])[split_dim].to_f32();

        let node = self.nodes.len();
        self.nodes.push(KdtNode {
            left: 0,
            right: 0,
            split_dim: split_dim as SizeType,
            split_value,
        });
        let (lo, hi) = ids.split_at_mut(mid);
        let left = self.split(samples, lo, ntop, depth + 1);
        let right = self.split(samples, hi, ntop, depth + 1);
        self.nodes[node].left = left;
        self.nodes[node].right = right;
        node as SizeType
    }

    fn seeds(&self, query: &[f32], limit: usize, out: &mut Vec<VecId>) {
        if self.root >= 0 && self.nodes.is_empty() {
            return;
        }
        // Lower bound of the squared distance from the query to each
        // unexplored branch.
        let mut heap = BinaryHeap::new();
        heap.push(Reverse((Candidate { dist: 0.0, id: 0 }, self.root)));
        let mut taken = 0;
        while let Some(Reverse((bound, child))) = heap.pop() {
            let mut child = child;
            let bound = bound.dist;
            while child >= 0 {
                let node = self.nodes[child as usize];
                let diff = query[node.split_dim as usize] - node.split_value;
                let (near, far) = if diff < 0.0 {
                    (node.left, node.right)
                } else {
                    (node.right, node.left)
                };
                heap.push(Reverse((
                    Candidate {
                        dist: bound + diff * diff,
                        id: 0,
                    },
                    far,
                )));
                child = near;
            }
            out.push((-(child + 1)) as VecId);
            taken += 1;
            if taken >= limit {
                break;
            }
        }
    }
}

impl Partitioner for KdtForest {
    const ALGO: IndexAlgoType = IndexAlgoType::KDT;

    fn build<T: VectorValue>(samples: &Samples<T>, params: &TreeParams) -> Self {
        let trees = (0..params.tree_number)
            .map(|t| KdtTree::build(samples, params, t))
            .collect();
        Self { trees }
    }

    fn seeds<T: VectorValue>(
        &self,
        samples: &Samples<T>,
        query: &[f32],
        _method: DistCalcMethod,
        limit: usize,
    ) -> Vec<VecId> {
        let mut out = Vec::with_capacity(limit);
        if samples.is_empty() {
            return out;
        }
        let per_tree = limit.div_ceil(self.trees.len().max(1));
        for tree in &self.trees {
            tree.seeds(query, per_tree, &mut out);
        }
        out
    }

    fn node_count(&self) -> usize {
        self.trees.iter().map(|t| t.nodes.len()).sum()
    }

    fn validate(&self, rows: usize, dim: usize) -> Result<()> {
        let bad_child = |tree: &KdtTree, parent: Option<usize>, c: SizeType| {
            if c < 0 {
                (-(c as i64) - 1) as usize >= rows
            } else {
                (c as usize) >= tree.nodes.len() || parent.is_some_and(|p| c as usize <= p)
            }
        };
        for tree in &self.trees {
            if rows == 0 {
                continue;
            }
            let bad = bad_child(tree, None, tree.root)
                || tree.nodes.iter().enumerate().any(|(i, n)| {
                    bad_child(tree, Some(i), n.left)
                        || bad_child(tree, Some(i), n.right)
                        || n.split_dim < 0
                        || n.split_dim as usize >= dim
                });
            if bad {
                return Err(AnnError::parse("KDT segment is inconsistent"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encode_row;

    fn line(n: usize) -> Samples<f32> {
        let mut s = Samples::new(3);
        for i in 0..n {
            s.push_encoded(&encode_row(&[i as f32, 0.5, 0.25]));
        }
        s
    }

    #[test]
    fn test_first_seed_is_nearest_leaf() {
        let samples = line(64);
        let params = TreeParams {
            tree_number: 1,
            num_top_dimension_kdt_split: 1,
            ..Default::default()
        };
        let forest = KdtForest::build(&samples, &params);
        assert_eq!(forest.node_count(), 63);
        let seeds = forest.seeds(&samples, &[20.2, 0.5, 2.0], DistCalcMethod::L2, 1);
        assert_eq!(seeds, vec![20]);
        assert!(forest.validate(64, 3).is_ok());
        assert!(forest.validate(32, 3).is_err());
        assert!(forest.validate(64, 0).is_err());
    }

    #[test]
    fn test_full_traversal_reaches_all_samples() {
        let samples = line(37);
        let params = TreeParams {
            tree_number: 3,
            num_top_dimension_kdt_split: 2,
            ..Default::default()
        };
        let forest = KdtForest::build(&samples, &params);
        let mut seeds = forest.seeds(&samples, &[0.0, 0.0, 0.0], DistCalcMethod::L2, 3 * 37);
        seeds.sort_unstable();
        seeds.dedup();
        assert_eq!(seeds, (0..37).collect::<Vec<_>>());
    }

    #[test]
    fn test_single_sample() {
        let samples = line(1);
        let forest = KdtForest::build(&samples, &TreeParams::default());
        assert_eq!(forest.node_count(), 0);
        assert_eq!(forest.seeds(&samples, &[9.0, 9.0, 9.0], DistCalcMethod::L2, 4), vec![0]);
    }
}
