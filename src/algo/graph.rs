//! Fixed-degree neighborhood graph.
//!
//! Each vertex keeps up to `m` neighbor ids, nearest first, padded with
//! `-1`. Segment layout:
//!
//! ```text
//! [rows: i32 LE][m: i32 LE][rows × m neighbor ids: i32 LE]
//! ```

use std::io::{Read, Write};

use crate::error::{AnnError, Result};
use crate::types::{SizeType, VecId};

use super::samples::{read_count, read_exact_vec, write_i32, Candidate};

const EMPTY: SizeType = -1;

/// Row-major adjacency with a fixed number of slots per vertex.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NeighborhoodGraph {
    m: usize,
    edges: Vec<SizeType>,
}

impl NeighborhoodGraph {
    /// Creates an empty graph with `m` slots per vertex.
    pub fn new(m: usize) -> Self {
        Self {
            m,
            edges: Vec::new(),
        }
    }

    /// Slots per vertex.
    pub fn degree(&self) -> usize {
        self.m
    }

    /// Number of vertices.
    pub fn rows(&self) -> usize {
        if self.m == 0 {
            0
        } else {
            self.edges.len() / self.m
        }
    }

    /// Appends a vertex with no neighbors.
    pub fn push_row(&mut self) {
        self.edges.extend(std::iter::repeat(EMPTY).take(self.m));
    }

    /// Neighbors of `id`, nearest first.
    pub fn neighbors(&self, id: VecId) -> impl Iterator<Item = VecId> + '_ {
        let row: &[SizeType] = if id < self.rows() {
            &self.edges[id * self.m..(id + 1) * self.m]
        } else {
            &[]
        };
        row.iter()
            .take_while(|&&n| n != EMPTY)
            .map(|&n| n as VecId)
    }

    /// Replaces the neighbors of `id` with `sorted`, truncated to the degree.
    pub fn set_neighbors(&mut self, id: VecId, sorted: &[Candidate]) {
        if id >= self.rows() {
            return;
        }
        let row = &mut self.edges[id * self.m..(id + 1) * self.m];
        for (slot, value) in row.iter_mut().enumerate() {
            *value = sorted.get(slot).map_or(EMPTY, |c| c.id as SizeType);
        }
    }

    /// Offers `candidate` as a neighbor of `id`. `current` holds the
    /// distances of the existing neighbors, in row order. Returns true if
    /// the row changed.
    pub fn offer(&mut self, id: VecId, candidate: Candidate, current: &[Candidate]) -> bool {
        if self.m == 0 || current.iter().any(|c| c.id == candidate.id) {
            return false;
        }
        if current.len() >= self.m
            && current.last().is_some_and(|worst| *worst <= candidate)
        {
            return false;
        }
        let mut row: Vec<Candidate> = current.to_vec();
        let at = row.partition_point(|c| *c < candidate);
        row.insert(at, candidate);
        row.truncate(self.m);
        self.set_neighbors(id, &row);
        true
    }

    /// Serialized size of the graph segment.
    pub fn buffer_size(&self) -> u64 {
        ((2 + self.edges.len()) * std::mem::size_of::<SizeType>()) as u64
    }

    /// Writes the graph segment.
    pub fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        write_i32(out, self.rows() as SizeType)?;
        write_i32(out, self.m as SizeType)?;
        let mut buf = Vec::with_capacity(self.edges.len() * 4);
        for e in &self.edges {
            buf.extend_from_slice(&e.to_le_bytes());
        }
        out.write_all(&buf)?;
        Ok(())
    }

    /// Reads a graph segment.
    pub fn read_from(input: &mut dyn Read) -> Result<Self> {
        let rows = read_count(input, "graph rows")?;
        let m = read_count(input, "graph degree")?;
        let len = rows
            .checked_mul(m)
            .and_then(|n| n.checked_mul(std::mem::size_of::<SizeType>()))
            .ok_or_else(|| AnnError::parse("Graph segment size overflows"))?;
        let bytes = read_exact_vec(input, len)?;
        let edges: Vec<SizeType> = bytes
            .chunks_exact(4)
            .map(|c| SizeType::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        if edges
            .iter()
            .any(|&e| e < EMPTY || (e >= 0 && e as usize >= rows))
        {
            return Err(AnnError::parse("Graph segment references unknown vertices"));
        }
        Ok(Self { m, edges })
    }
}
