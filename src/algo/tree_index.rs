//! Tree-seeded graph index, generic over element type and partition.
//!
//! A forest of partition trees supplies entry points; a fixed-degree
//! neighborhood graph is then walked best-first until `MaxCheck` distance
//! evaluations have been spent. Small indexes are scanned exhaustively.
//!
//! # Segments
//!
//! ```text
//! vectors.bin  samples       [rows][dim][row-major elements]
//! tree.bin     partition     bincode
//! graph.bin    neighbors     [rows][m][rows × m ids, -1 = empty]
//! deletes.bin  soft deletes  [num_deleted][rows][rows × u8 flag]
//! ```

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::ops::Range;
use std::path::Path;
use std::sync::RwLock;

use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::byte_array::ByteArray;
use crate::config::{write_param, IniReader, INDEX_SECTION};
use crate::error::{AnnError, Result};
use crate::types::{
    decode_row, encode_row, DistCalcMethod, IndexAlgoType, SizeType, VecId, VectorValue,
    VectorValueType,
};
use crate::vector_set::StridedView;

use super::bkt::BktForest;
use super::distance::{distance, widen};
use super::graph::NeighborhoodGraph;
use super::kdt::KdtForest;
use super::params::TreeParams;
use super::samples::{read_count, read_exact_vec, write_i32, Candidate, Samples};
use super::IndexAlgorithm;

/// File names of the four data segments, in blob order.
pub const SEGMENT_FILES: [&str; 4] = ["vectors.bin", "tree.bin", "graph.bin", "deletes.bin"];

/// Partition structure that proposes search entry points.
pub trait Partitioner:
    Clone + Default + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Algorithm tag written to the config.
    const ALGO: IndexAlgoType;

    /// Builds the partition over every sample.
    fn build<T: VectorValue>(samples: &Samples<T>, params: &TreeParams) -> Self;

    /// Up to `limit` sample ids close to `query`, most promising first.
    fn seeds<T: VectorValue>(
        &self,
        samples: &Samples<T>,
        query: &[f32],
        method: DistCalcMethod,
        limit: usize,
    ) -> Vec<VecId>;

    /// Total node count across trees.
    fn node_count(&self) -> usize;

    /// Checks a loaded partition against the sample shape.
    fn validate(&self, rows: usize, dim: usize) -> Result<()>;
}

/// Balanced k-means tree index over `T`.
pub type BktIndex<T> = TreeIndex<T, BktForest>;

/// KD-tree index over `T`.
pub type KdtIndex<T> = TreeIndex<T, KdtForest>;

struct Inner<T, F> {
    samples: Samples<T>,
    deleted: Vec<bool>,
    num_deleted: usize,
    forest: F,
    graph: NeighborhoodGraph,
}

impl<T: VectorValue, F: Partitioner> Inner<T, F> {
    fn empty(params: &TreeParams) -> Self {
        Self {
            samples: Samples::new(0),
            deleted: Vec::new(),
            num_deleted: 0,
            forest: F::default(),
            graph: NeighborhoodGraph::new(params.neighborhood_size),
        }
    }

    /// Builds the forest and the neighborhood graph. Up to `MaxCheck`
    /// samples the graph is exact; beyond that each row starts from the
    /// forest's seeds and is refined once through its neighbors' rows.
    fn build(samples: Samples<T>, params: &TreeParams) -> Self {
        let n = samples.len();
        let forest = F::build(&samples, params);
        let rows = if n <= params.max_check {
            exact_rows(&samples, params)
        } else {
            seeded_rows(&samples, &forest, params)
        };

        let mut graph = NeighborhoodGraph::new(params.neighborhood_size);
        for (id, row) in rows.iter().enumerate() {
            graph.push_row();
            graph.set_neighbors(id, row);
        }

        Self {
            samples,
            deleted: vec![false; n],
            num_deleted: 0,
            forest,
            graph,
        }
    }

    /// Nearest ids to `query` for which `keep` holds, nearest first.
    fn search(
        &self,
        query: &[f32],
        k: usize,
        params: &TreeParams,
        keep: impl Fn(VecId) -> bool,
    ) -> Vec<Candidate> {
        let n = self.samples.len();
        if n == 0 || k == 0 {
            return Vec::new();
        }
        let method = params.dist_calc_method;

        if n <= params.max_check {
            let mut hits: Vec<Candidate> = (0..n)
                .filter(|&id| keep(id))
                .map(|id| Candidate {
                    dist: distance(self.samples.row(id), query, method),
                    id,
                })
                .collect();
            hits.sort();
            hits.truncate(k);
            return hits;
        }

        let mut walk = Walk {
            visited: vec![false; n],
            frontier: BinaryHeap::new(),
            pool: BinaryHeap::new(),
            pool_size: k.max(params.neighborhood_size),
            checked: 0,
        };
        let limit = (params.max_check / 4).max(k);
        for seed in self.forest.seeds(&self.samples, query, method, limit) {
            walk.visit(self, query, method, seed, &keep);
        }
        while let Some(Reverse(next)) = walk.frontier.pop() {
            if walk.checked >= params.max_check {
                break;
            }
            if walk.pool.len() >= walk.pool_size && walk.pool.peek().is_some_and(|w| next > *w) {
                break;
            }
            for id in self.graph.neighbors(next.id) {
                walk.visit(self, query, method, id, &keep);
            }
        }

        let mut hits = walk.pool.into_sorted_vec();
        hits.truncate(k);
        hits
    }

    /// Appends rows and links each one into the graph.
    fn append(&mut self, rows: StridedView<'_>, params: &TreeParams) -> Range<VecId> {
        let start = self.samples.len();
        for row in rows.rows() {
            self.samples.push_encoded(row);
            self.deleted.push(false);
            self.graph.push_row();
        }
        let end = self.samples.len();
        let m = self.graph.degree();
        let method = params.dist_calc_method;

        for id in start..end {
            let probe = widen(self.samples.row(id));
            let hits = self.search(&probe, m, params, |other| other != id);
            self.graph.set_neighbors(id, &hits);

            for hit in &hits {
                let anchor = widen(self.samples.row(hit.id));
                let current: Vec<Candidate> = self
                    .graph
                    .neighbors(hit.id)
                    .map(|nb| Candidate {
                        dist: distance(self.samples.row(nb), &anchor, method),
                        id: nb,
                    })
                    .collect();
                self.graph.offer(
                    hit.id,
                    Candidate {
                        dist: hit.dist,
                        id,
                    },
                    &current,
                );
            }
        }
        start..end
    }

    fn write_deletes(&self, out: &mut dyn Write) -> Result<()> {
        write_i32(out, self.num_deleted as SizeType)?;
        write_i32(out, self.deleted.len() as SizeType)?;
        let flags: Vec<u8> = self.deleted.iter().map(|&d| u8::from(d)).collect();
        out.write_all(&flags)?;
        Ok(())
    }

    fn read_segments(inputs: &mut [&mut dyn Read]) -> Result<Self> {
        let [vectors, tree, graph, deletes] = inputs else {
            return Err(AnnError::fail(format!(
                "Expected {} index segments, got {}",
                SEGMENT_FILES.len(),
                inputs.len()
            )));
        };

        let samples = Samples::<T>::read_from(&mut **vectors)?;
        let mut raw = Vec::new();
        tree.read_to_end(&mut raw)?;
        let forest: F = bincode::deserialize(&raw)?;
        let graph = NeighborhoodGraph::read_from(&mut **graph)?;

        let num_deleted = read_count(&mut **deletes, "deleted count")?;
        let rows = read_count(&mut **deletes, "deleted rows")?;
        let deleted: Vec<bool> = read_exact_vec(&mut **deletes, rows)?
            .into_iter()
            .map(|b| b != 0)
            .collect();

        let n = samples.len();
        if graph.rows() != n || rows != n {
            return Err(AnnError::parse(format!(
                "Segment row counts disagree: samples {}, graph {}, deletes {}",
                n,
                graph.rows(),
                rows
            )));
        }
        if deleted.iter().filter(|&&d| d).count() != num_deleted {
            return Err(AnnError::parse("Deleted count does not match deleted flags"));
        }
        forest.validate(n, samples.dim())?;

        Ok(Self {
            samples,
            deleted,
            num_deleted,
            forest,
            graph,
        })
    }
}

/// The `m` nearest of `candidates` to row `id`, nearest first, excluding
/// `id` itself and duplicates.
fn nearest_of<T: VectorValue>(
    samples: &Samples<T>,
    id: VecId,
    candidates: impl IntoIterator<Item = VecId>,
    m: usize,
    method: DistCalcMethod,
) -> Vec<Candidate> {
    let probe = widen(samples.row(id));
    let mut ids: Vec<VecId> = candidates.into_iter().filter(|&c| c != id).collect();
    ids.sort_unstable();
    ids.dedup();
    let mut hits: Vec<Candidate> = ids
        .into_iter()
        .map(|other| Candidate {
            dist: distance(samples.row(other), &probe, method),
            id: other,
        })
        .collect();
    if hits.len() > m && m > 0 {
        hits.select_nth_unstable(m - 1);
    }
    hits.truncate(m);
    hits.sort();
    hits
}

fn exact_rows<T: VectorValue>(samples: &Samples<T>, params: &TreeParams) -> Vec<Vec<Candidate>> {
    let n = samples.len();
    (0..n)
        .into_par_iter()
        .map(|id| nearest_of(samples, id, 0..n, params.neighborhood_size, params.dist_calc_method))
        .collect()
}

/// Graph rows for large builds. Distance evaluations per row are bounded
/// by the seed budget plus `m * (m + 2)` for the refinement pass.
fn seeded_rows<T: VectorValue, F: Partitioner>(
    samples: &Samples<T>,
    forest: &F,
    params: &TreeParams,
) -> Vec<Vec<Candidate>> {
    let n = samples.len();
    let m = params.neighborhood_size;
    let method = params.dist_calc_method;
    let budget = (m * 8).min(params.max_check).max(m + 1);

    let initial: Vec<Vec<Candidate>> = (0..n)
        .into_par_iter()
        .map(|id| {
            let probe = widen(samples.row(id));
            let seeds = forest.seeds(samples, &probe, method, budget);
            nearest_of(samples, id, seeds, m, method)
        })
        .collect();

    let mut reverse: Vec<Vec<VecId>> = vec![Vec::new(); n];
    for (id, row) in initial.iter().enumerate() {
        for c in row {
            if reverse[c.id].len() < m {
                reverse[c.id].push(id);
            }
        }
    }

    (0..n)
        .into_par_iter()
        .map(|id| {
            let direct = initial[id].iter().map(|c| c.id);
            let second = initial[id]
                .iter()
                .flat_map(|c| initial[c.id].iter().map(|cc| cc.id));
            let candidates = direct.chain(second).chain(reverse[id].iter().copied());
            nearest_of(samples, id, candidates, m, method)
        })
        .collect()
}

struct Walk {
    visited: Vec<bool>,
    frontier: BinaryHeap<Reverse<Candidate>>,
    pool: BinaryHeap<Candidate>,
    pool_size: usize,
    checked: usize,
}

impl Walk {
    fn visit<T: VectorValue, F: Partitioner>(
        &mut self,
        inner: &Inner<T, F>,
        query: &[f32],
        method: DistCalcMethod,
        id: VecId,
        keep: &impl Fn(VecId) -> bool,
    ) {
        if id >= self.visited.len() || self.visited[id] {
            return;
        }
        self.visited[id] = true;
        self.checked += 1;
        let c = Candidate {
            dist: distance(inner.samples.row(id), query, method),
            id,
        };
        self.frontier.push(Reverse(c));
        if keep(id) {
            self.pool.push(c);
            if self.pool.len() > self.pool_size {
                self.pool.pop();
            }
        }
    }
}

/// Tree-seeded graph index over element type `T` and partition `F`.
///
/// All methods take `&self`; reads share the state lock and mutations
/// serialize on it.
pub struct TreeIndex<T, F> {
    params: RwLock<TreeParams>,
    inner: RwLock<Inner<T, F>>,
    _marker: PhantomData<fn() -> (T, F)>,
}

impl<T: VectorValue, F: Partitioner> Default for TreeIndex<T, F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: VectorValue, F: Partitioner> TreeIndex<T, F> {
    /// Creates an empty index with default parameters.
    pub fn new() -> Self {
        Self::with_params(TreeParams::default())
    }

    /// Creates an empty index with `params`.
    pub fn with_params(params: TreeParams) -> Self {
        let inner = Inner::empty(&params);
        Self {
            params: RwLock::new(params),
            inner: RwLock::new(inner),
            _marker: PhantomData,
        }
    }

    /// Current parameters.
    pub fn params(&self) -> Result<TreeParams> {
        self.params
            .read()
            .map(|p| p.clone())
            .map_err(|_| AnnError::fail("Index params lock poisoned"))
    }

    fn read_inner(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner<T, F>>> {
        self.inner
            .read()
            .map_err(|_| AnnError::fail("Index state lock poisoned"))
    }

    fn write_inner(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner<T, F>>> {
        self.inner
            .write()
            .map_err(|_| AnnError::fail("Index state lock poisoned"))
    }

    fn check_type(&self, view: &StridedView<'_>) -> Result<()> {
        if view.value_type() != T::VALUE_TYPE {
            return Err(AnnError::fail(format!(
                "Vector type {} does not match index type {}",
                view.value_type(),
                T::VALUE_TYPE
            )));
        }
        Ok(())
    }

    fn samples_from(view: StridedView<'_>) -> Samples<T> {
        let mut samples = Samples::new(view.dimension());
        for row in view.rows() {
            samples.push_encoded(row);
        }
        samples
    }

    fn load_segments(&self, inputs: &mut [&mut dyn Read]) -> Result<()> {
        let loaded = Inner::<T, F>::read_segments(inputs)?;
        debug!(
            samples = loaded.samples.len(),
            deleted = loaded.num_deleted,
            nodes = loaded.forest.node_count(),
            "Loaded index segments"
        );
        *self.write_inner()? = loaded;
        Ok(())
    }
}

impl<T: VectorValue, F: Partitioner> IndexAlgorithm for TreeIndex<T, F> {
    #[instrument(skip_all, fields(algo = %F::ALGO, count = vectors.count()))]
    fn build_index(&self, vectors: StridedView<'_>) -> Result<()> {
        self.check_type(&vectors)?;
        let params = self.params()?;
        let built = Inner::<T, F>::build(Self::samples_from(vectors), &params);
        info!(
            samples = built.samples.len(),
            nodes = built.forest.node_count(),
            "Index built"
        );
        *self.write_inner()? = built;
        Ok(())
    }

    fn add_index(&self, vectors: StridedView<'_>) -> Result<Range<VecId>> {
        self.check_type(&vectors)?;
        let params = self.params()?;
        let mut inner = self.write_inner()?;
        if inner.samples.is_empty() {
            let start = inner.samples.len();
            *inner = Inner::build(Self::samples_from(vectors), &params);
            return Ok(start..inner.samples.len());
        }
        if vectors.dimension() != inner.samples.dim() {
            return Err(AnnError::fail(format!(
                "Vector dimension mismatch: expected {}, got {}",
                inner.samples.dim(),
                vectors.dimension()
            )));
        }
        Ok(inner.append(vectors, &params))
    }

    fn delete_index(&self, id: VecId) -> Result<()> {
        let mut inner = self.write_inner()?;
        match inner.deleted.get_mut(id) {
            Some(flag) if !*flag => {
                *flag = true;
                inner.num_deleted += 1;
                Ok(())
            }
            Some(_) => Err(AnnError::not_found(format!("Vector {} already deleted", id))),
            None => Err(AnnError::not_found(format!("Vector {} does not exist", id))),
        }
    }

    fn search_index(&self, query: &[u8], k: usize) -> Result<Vec<(VecId, f32)>> {
        let params = self.params()?;
        let inner = self.read_inner()?;
        let expected = inner.samples.dim() * T::VALUE_TYPE.size();
        if inner.samples.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != expected {
            return Err(AnnError::fail(format!(
                "Query holds {} bytes, expected {}",
                query.len(),
                expected
            )));
        }
        let probe: Vec<f32> = decode_row::<T>(query).into_iter().map(T::to_f32).collect();
        let hits = inner.search(&probe, k, &params, |id| !inner.deleted[id]);
        Ok(hits.into_iter().map(|c| (c.id, c.dist)).collect())
    }

    fn get_sample(&self, id: VecId) -> Option<ByteArray> {
        let inner = self.inner.read().ok()?;
        (id < inner.samples.len()).then(|| ByteArray::Owned(encode_row(inner.samples.row(id))))
    }

    fn contain_sample(&self, id: VecId) -> bool {
        let inner = self.inner.read().ok();
        inner.is_some_and(|s| s.deleted.get(id).is_some_and(|&d| !d))
    }

    fn num_samples(&self) -> usize {
        self.inner.read().map_or(0, |s| s.samples.len())
    }

    fn num_deleted(&self) -> usize {
        self.inner.read().map_or(0, |s| s.num_deleted)
    }

    fn feature_dim(&self) -> usize {
        self.inner.read().map_or(0, |s| s.samples.dim())
    }

    fn vector_value_type(&self) -> VectorValueType {
        T::VALUE_TYPE
    }

    fn index_algo_type(&self) -> IndexAlgoType {
        F::ALGO
    }

    fn need_refine(&self) -> bool {
        let Ok(params) = self.params() else {
            return false;
        };
        self.inner.read().is_ok_and(|s| {
            s.num_deleted > 0
                && s.num_deleted as f32 > s.samples.len() as f32 * params.delete_percentage_for_refine
        })
    }

    #[instrument(skip_all, fields(algo = %F::ALGO))]
    fn refine(&self) -> Result<(Box<dyn IndexAlgorithm>, Vec<VecId>)> {
        let params = self.params()?;
        let inner = self.read_inner()?;
        let kept: Vec<VecId> = (0..inner.samples.len())
            .filter(|&id| !inner.deleted[id])
            .collect();
        let mut samples = Samples::new(inner.samples.dim());
        for &id in &kept {
            samples.push_encoded(&encode_row(inner.samples.row(id)));
        }
        drop(inner);

        info!(kept = kept.len(), "Compacting index");
        let refined = Self::with_params(params.clone());
        *refined.write_inner()? = Inner::build(samples, &params);
        Ok((Box::new(refined), kept))
    }

    fn buffer_size(&self) -> Vec<u64> {
        let Ok(inner) = self.inner.read() else {
            return vec![0; SEGMENT_FILES.len()];
        };
        vec![
            inner.samples.buffer_size(),
            bincode::serialized_size(&inner.forest).unwrap_or(0),
            inner.graph.buffer_size(),
            (2 * std::mem::size_of::<SizeType>() + inner.deleted.len()) as u64,
        ]
    }

    fn get_parameter(&self, name: &str) -> Result<String> {
        self.params()?.get(F::ALGO, name)
    }

    fn set_parameter(&self, name: &str, value: &str) -> Result<()> {
        self.params
            .write()
            .map_err(|_| AnnError::fail("Index params lock poisoned"))?
            .set(F::ALGO, name, value)
    }

    fn load_config(&self, reader: &IniReader) -> Result<()> {
        let mut params = self
            .params
            .write()
            .map_err(|_| AnnError::fail("Index params lock poisoned"))?;
        for key in TreeParams::keys(F::ALGO) {
            if let Some(value) = reader.get_raw(INDEX_SECTION, key) {
                params.set(F::ALGO, key, value)?;
            }
        }
        Ok(())
    }

    fn save_config(&self, out: &mut dyn Write) -> Result<()> {
        let params = self.params()?;
        for key in TreeParams::keys(F::ALGO) {
            write_param(out, key, params.get(F::ALGO, key)?)?;
        }
        Ok(())
    }

    fn load_index_data(&self, folder: &Path) -> Result<()> {
        let mut readers = Vec::with_capacity(SEGMENT_FILES.len());
        for name in SEGMENT_FILES {
            let path = folder.join(name);
            let file = File::open(&path).map_err(|e| AnnError::open_file(&path, e))?;
            readers.push(BufReader::new(file));
        }
        let mut inputs: Vec<&mut dyn Read> =
            readers.iter_mut().map(|r| r as &mut dyn Read).collect();
        self.load_segments(&mut inputs)
    }

    fn load_index_data_from_memory(&self, blobs: &[ByteArray]) -> Result<()> {
        if blobs.len() < SEGMENT_FILES.len() {
            return Err(AnnError::fail(format!(
                "Expected {} index blobs, got {}",
                SEGMENT_FILES.len(),
                blobs.len()
            )));
        }
        let mut slices: Vec<&[u8]> = blobs[..SEGMENT_FILES.len()]
            .iter()
            .map(ByteArray::as_slice)
            .collect();
        let mut inputs: Vec<&mut dyn Read> =
            slices.iter_mut().map(|s| s as &mut dyn Read).collect();
        self.load_segments(&mut inputs)
    }

    fn save_index_data(&self, folder: &Path) -> Result<()> {
        fs::create_dir_all(folder).map_err(|e| AnnError::create_file(folder, e))?;
        let mut writers = Vec::with_capacity(SEGMENT_FILES.len());
        for name in SEGMENT_FILES {
            let path = folder.join(name);
            let file = File::create(&path).map_err(|e| AnnError::create_file(&path, e))?;
            writers.push(BufWriter::new(file));
        }
        {
            let mut outputs: Vec<&mut dyn Write> =
                writers.iter_mut().map(|w| w as &mut dyn Write).collect();
            self.save_index_data_to(&mut outputs)?;
        }
        for w in &mut writers {
            w.flush()?;
        }
        Ok(())
    }

    fn save_index_data_to(&self, writers: &mut [&mut dyn Write]) -> Result<()> {
        let [vectors, tree, graph, deletes] = writers else {
            return Err(AnnError::fail(format!(
                "Expected {} index writers, got {}",
                SEGMENT_FILES.len(),
                writers.len()
            )));
        };
        let inner = self.read_inner()?;
        inner.samples.write_to(&mut **vectors)?;
        bincode::serialize_into(&mut **tree, &inner.forest)?;
        inner.graph.write_to(&mut **graph)?;
        inner.write_deletes(&mut **deletes)?;
        debug!(samples = inner.samples.len(), "Saved index segments");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_set::VectorSet;

    fn make_embedding(seed: u64, dim: usize) -> Vec<f32> {
        (0..dim)
            .map(|i| ((seed as f32 * 0.37) + (i as f32 * 1.13)).sin())
            .collect()
    }

    fn make_set(n: usize, dim: usize) -> VectorSet {
        let rows: Vec<Vec<f32>> = (0..n).map(|i| make_embedding(i as u64, dim)).collect();
        VectorSet::from_rows(&rows).unwrap()
    }

    fn query(seed: u64, dim: usize) -> Vec<u8> {
        encode_row(&make_embedding(seed, dim))
    }

    #[test]
    fn test_build_and_search_exact() {
        let index = BktIndex::<f32>::new();
        let set = make_set(50, 8);
        index.build_index(set.view()).unwrap();
        assert_eq!(index.num_samples(), 50);
        assert_eq!(index.feature_dim(), 8);

        let hits = index.search_index(&query(7, 8), 3).unwrap();
        assert_eq!(hits[0].0, 7);
        assert_eq!(hits[0].1, 0.0);
        assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn test_graph_walk_finds_exact_match() {
        for algo in [IndexAlgoType::BKT, IndexAlgoType::KDT] {
            let params = TreeParams {
                max_check: 64,
                neighborhood_size: 8,
                bkt_kmeans_k: 4,
                ..Default::default()
            };
            let index: Box<dyn IndexAlgorithm> = match algo {
                IndexAlgoType::BKT => Box::new(BktIndex::<f32>::with_params(params)),
                _ => Box::new(KdtIndex::<f32>::with_params(params)),
            };
            index.build_index(make_set(300, 4).view()).unwrap();
            let hits = index.search_index(&query(123, 4), 5).unwrap();
            assert_eq!(hits.len(), 5, "{}", algo);
            assert_eq!(hits[0].0, 123, "{}", algo);
        }
    }

    #[test]
    fn test_seeded_build_fills_rows_without_self_loops() {
        let params = TreeParams {
            max_check: 32,
            neighborhood_size: 6,
            ..Default::default()
        };
        let index = KdtIndex::<f32>::with_params(params);
        index.build_index(make_set(200, 4).view()).unwrap();

        let inner = index.read_inner().unwrap();
        assert_eq!(inner.graph.rows(), 200);
        for id in 0..200 {
            let row: Vec<VecId> = inner.graph.neighbors(id).collect();
            assert_eq!(row.len(), 6, "row {}", id);
            assert!(!row.contains(&id), "row {}", id);
        }
    }

    #[test]
    fn test_add_links_new_rows() {
        let index = KdtIndex::<f32>::new();
        index.build_index(make_set(20, 4).view()).unwrap();
        let extra = VectorSet::from_values(&make_embedding(500, 4), 4).unwrap();
        let range = index.add_index(extra.view()).unwrap();
        assert_eq!(range, 20..21);
        let hits = index.search_index(&query(500, 4), 1).unwrap();
        assert_eq!(hits[0].0, 20);
    }

    #[test]
    fn test_add_to_empty_adopts_dimension() {
        let index = BktIndex::<f32>::new();
        let range = index.add_index(make_set(5, 6).view()).unwrap();
        assert_eq!(range, 0..5);
        assert_eq!(index.feature_dim(), 6);

        let wrong = make_set(2, 3);
        assert!(index.add_index(wrong.view()).is_err());
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let index = BktIndex::<u8>::new();
        let err = index.build_index(make_set(4, 2).view()).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::Fail);
    }

    #[test]
    fn test_delete_filters_results() {
        let index = BktIndex::<f32>::new();
        index.build_index(make_set(30, 4).view()).unwrap();
        index.delete_index(3).unwrap();
        assert!(!index.contain_sample(3));
        assert_eq!(index.num_deleted(), 1);
        assert!(index.delete_index(3).unwrap_err().is_not_found());
        assert!(index.delete_index(30).unwrap_err().is_not_found());
        assert_eq!(index.num_deleted(), 1);

        let hits = index.search_index(&query(3, 4), 30).unwrap();
        assert_eq!(hits.len(), 29);
        assert!(hits.iter().all(|&(id, _)| id != 3));
    }

    #[test]
    fn test_refine_compacts() {
        let index = KdtIndex::<f32>::new();
        index.build_index(make_set(10, 4).view()).unwrap();
        for id in [0, 2, 4, 6, 8] {
            index.delete_index(id).unwrap();
        }
        assert!(index.need_refine());
        let (refined, kept) = index.refine().unwrap();
        assert_eq!(kept, vec![1, 3, 5, 7, 9]);
        assert_eq!(refined.num_samples(), 5);
        assert_eq!(refined.num_deleted(), 0);
        assert_eq!(refined.get_sample(1), index.get_sample(3));
    }

    #[test]
    fn test_segments_roundtrip_through_memory() {
        let index = BktIndex::<i16>::new();
        let rows: Vec<Vec<i16>> = (0..40).map(|i| vec![i, -i, i * 2]).collect();
        index.build_index(VectorSet::from_rows(&rows).unwrap().view()).unwrap();
        index.delete_index(5).unwrap();

        let sizes = index.buffer_size();
        let mut bufs: Vec<Vec<u8>> = sizes.iter().map(|&s| Vec::with_capacity(s as usize)).collect();
        {
            let mut outs: Vec<&mut dyn Write> = bufs.iter_mut().map(|b| b as &mut dyn Write).collect();
            index.save_index_data_to(&mut outs).unwrap();
        }
        for (buf, size) in bufs.iter().zip(&sizes) {
            assert_eq!(buf.len() as u64, *size);
        }

        let blobs: Vec<ByteArray> = bufs.into_iter().map(ByteArray::from).collect();
        let loaded = BktIndex::<i16>::new();
        loaded.load_index_data_from_memory(&blobs).unwrap();
        assert_eq!(loaded.num_samples(), 40);
        assert_eq!(loaded.num_deleted(), 1);
        assert!(!loaded.contain_sample(5));
        assert_eq!(loaded.get_sample(39), index.get_sample(39));
    }

    #[test]
    fn test_segments_roundtrip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let index = KdtIndex::<i8>::new();
        let rows: Vec<Vec<i8>> = (0..16).map(|i| vec![i, 1 - i]).collect();
        index.build_index(VectorSet::from_rows(&rows).unwrap().view()).unwrap();
        index.save_index_data(dir.path()).unwrap();

        let loaded = KdtIndex::<i8>::new();
        loaded.load_index_data(dir.path()).unwrap();
        assert_eq!(loaded.num_samples(), 16);

        let missing = KdtIndex::<i8>::new();
        let err = missing.load_index_data(&dir.path().join("nope")).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::FailedOpenFile);
    }

    #[test]
    fn test_corrupt_segments_rejected() {
        let index = BktIndex::<f32>::new();
        index.build_index(make_set(8, 2).view()).unwrap();
        let mut bufs = vec![Vec::new(); 4];
        {
            let mut outs: Vec<&mut dyn Write> = bufs.iter_mut().map(|b| b as &mut dyn Write).collect();
            index.save_index_data_to(&mut outs).unwrap();
        }
        bufs[3].truncate(10);
        let blobs: Vec<ByteArray> = bufs.into_iter().map(ByteArray::from).collect();
        assert!(BktIndex::<f32>::new().load_index_data_from_memory(&blobs).is_err());
        assert!(BktIndex::<f32>::new().load_index_data_from_memory(&blobs[..2]).is_err());
    }

    #[test]
    fn test_config_roundtrip() {
        let index = BktIndex::<f32>::new();
        index.set_parameter("BKTKmeansK", "12").unwrap();
        let mut out = Vec::new();
        index.save_config(&mut out).unwrap();
        let text = format!("[Index]\n{}", String::from_utf8(out).unwrap());

        let other = BktIndex::<f32>::new();
        other.load_config(&IniReader::parse(&text).unwrap()).unwrap();
        assert_eq!(other.get_parameter("bktkmeansk").unwrap(), "12");
        assert!(other.set_parameter("NumTopDimensionKDTSplit", "3").is_err());
    }
}
