//! Flat row storage shared by the tree variants, plus the little-endian
//! segment helpers their persistence uses.
//!
//! Sample segment layout:
//!
//! ```text
//! [rows: i32 LE][dim: i32 LE][rows × dim elements, LE]
//! ```

use std::cmp::Ordering;
use std::io::{Read, Write};

use crate::error::{AnnError, Result};
use crate::types::{DimensionType, SizeType, VecId, VectorValue};

/// Row-major vector storage.
#[derive(Clone, Debug, Default)]
pub struct Samples<T> {
    data: Vec<T>,
    dim: usize,
}

impl<T: VectorValue> Samples<T> {
    /// Creates empty storage for rows of `dim` elements.
    pub fn new(dim: usize) -> Self {
        Self {
            data: Vec::new(),
            dim,
        }
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    /// Returns true if there are no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements per row.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Row `id`. Panics past the end, like slice indexing.
    #[inline]
    pub fn row(&self, id: VecId) -> &[T] {
        &self.data[id * self.dim..(id + 1) * self.dim]
    }

    /// Appends a little-endian encoded row.
    pub fn push_encoded(&mut self, bytes: &[u8]) {
        self.data
            .extend(bytes.chunks_exact(T::VALUE_TYPE.size()).map(T::read_le));
    }

    /// Serialized size of the sample segment.
    pub fn buffer_size(&self) -> u64 {
        (2 * std::mem::size_of::<SizeType>() + self.data.len() * T::VALUE_TYPE.size()) as u64
    }

    /// Writes the sample segment.
    pub fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        write_i32(out, self.len() as SizeType)?;
        write_i32(out, self.dim as DimensionType)?;
        let mut buf = Vec::with_capacity(self.dim * T::VALUE_TYPE.size());
        for id in 0..self.len() {
            buf.clear();
            for v in self.row(id) {
                v.write_le(&mut buf);
            }
            out.write_all(&buf)?;
        }
        Ok(())
    }

    /// Reads a sample segment.
    pub fn read_from(input: &mut dyn Read) -> Result<Self> {
        let rows = read_count(input, "sample rows")?;
        let dim = read_count(input, "sample dimension")?;
        if rows > 0 && dim == 0 {
            return Err(AnnError::parse("Sample segment has zero dimension"));
        }
        let len = rows
            .checked_mul(dim)
            .and_then(|n| n.checked_mul(T::VALUE_TYPE.size()))
            .ok_or_else(|| AnnError::parse("Sample segment size overflows"))?;
        let bytes = read_exact_vec(input, len)?;
        let mut samples = Self::new(dim);
        samples.push_encoded(&bytes);
        Ok(samples)
    }
}

/// A scored id; orders by distance, then by id.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    /// Distance to the probe.
    pub dist: f32,
    /// Sample id or node index.
    pub id: usize,
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then_with(|| self.id.cmp(&other.id))
    }
}

pub(crate) fn write_i32(out: &mut dyn Write, v: i32) -> Result<()> {
    out.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub(crate) fn read_i32(input: &mut dyn Read) -> Result<i32> {
    let mut raw = [0u8; 4];
    input.read_exact(&mut raw)?;
    Ok(i32::from_le_bytes(raw))
}

/// Reads a non-negative `i32` count.
pub(crate) fn read_count(input: &mut dyn Read, what: &str) -> Result<usize> {
    let v = read_i32(input)?;
    usize::try_from(v).map_err(|_| AnnError::parse(format!("Negative {}: {}", what, v)))
}

/// Reads exactly `len` bytes without trusting `len` for the allocation.
pub(crate) fn read_exact_vec(input: &mut dyn Read, len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    input.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(AnnError::parse(format!(
            "Segment truncated: expected {} bytes, found {}",
            len,
            buf.len()
        )));
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encode_row;

    #[test]
    fn test_rows() {
        let mut s = Samples::<f32>::new(2);
        s.push_encoded(&encode_row(&[1.0f32, 2.0]));
        s.push_encoded(&encode_row(&[3.0f32, 4.0]));
        assert_eq!(s.len(), 2);
        assert_eq!(s.row(1), &[3.0, 4.0]);
    }

    #[test]
    fn test_segment_roundtrip() {
        let mut s = Samples::<i16>::new(3);
        s.push_encoded(&encode_row(&[1i16, -2, 3]));
        let mut buf = Vec::new();
        s.write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, s.buffer_size());

        let loaded = Samples::<i16>::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded.row(0), &[1, -2, 3]);
    }

    #[test]
    fn test_truncated_segment() {
        let mut buf = Vec::new();
        write_i32(&mut buf, 1000).unwrap();
        write_i32(&mut buf, 4).unwrap();
        let err = Samples::<f32>::read_from(&mut buf.as_slice()).unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_candidate_order_breaks_ties_by_id() {
        let mut c = vec![
            Candidate { dist: 1.0, id: 9 },
            Candidate { dist: 0.5, id: 4 },
            Candidate { dist: 1.0, id: 2 },
        ];
        c.sort();
        let ids: Vec<usize> = c.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![4, 2, 9]);
    }
}
