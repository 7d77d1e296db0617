//! Per-vector metadata storage and the metadata → vector reverse map.
//!
//! A [`MetadataSet`] keeps one opaque byte range per vector id as a single
//! concatenated blob plus an offset table. It persists as two paired
//! artifacts (files, streams or in-memory blobs):
//!
//! ```text
//! data:   [entry 0 bytes][entry 1 bytes]...[entry N-1 bytes]
//! index:  [count: i32 LE][offset 0: u64 LE]...[offset N: u64 LE]
//! ```
//!
//! Offsets are non-decreasing and `offset[N] - offset[0]` is the data length.
//! Loading from shared memory keeps the data blob as a zero-copy view;
//! entries appended afterwards go to a private tail buffer.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use bytes::Bytes;

use crate::byte_array::ByteArray;
use crate::error::{AnnError, Result};
use crate::types::{SizeType, VecId};

const OFFSET_BYTES: usize = std::mem::size_of::<u64>();
const COUNT_BYTES: usize = std::mem::size_of::<SizeType>();

/// Ordered metadata entries, one per vector id.
#[derive(Clone, Debug)]
pub struct MetadataSet {
    /// Shared blob; always ends exactly at the last base entry.
    base: Bytes,
    /// `count + 1` offsets. Positions at or past `base.len()` index `tail`.
    offsets: Vec<u64>,
    /// Entries appended after construction.
    tail: Vec<u8>,
}

impl Default for MetadataSet {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            base: Bytes::new(),
            offsets: vec![0],
            tail: Vec::new(),
        }
    }

    /// Creates an owned set from a sequence of entries.
    pub fn from_entries<I, B>(entries: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut set = Self::new();
        for entry in entries {
            set.push(entry.as_ref());
        }
        set
    }

    /// Creates a one-entry set viewing `meta` without copying it.
    pub fn single(meta: ByteArray) -> Self {
        let base = meta.into_bytes();
        let len = base.len() as u64;
        Self {
            base,
            offsets: vec![0, len],
            tail: Vec::new(),
        }
    }

    /// Creates a set over a data blob and a raw `u64` offset table holding
    /// at least `count + 1` offsets.
    ///
    /// `data` is shared, not copied, when it is a [`ByteArray::View`].
    pub fn from_parts(data: ByteArray, offset_table: &[u8], count: usize) -> Result<Self> {
        let needed = (count + 1) * OFFSET_BYTES;
        if offset_table.len() < needed {
            return Err(AnnError::fail(format!(
                "Metadata offset table holds {} bytes, expected at least {}",
                offset_table.len(),
                needed
            )));
        }
        let offsets: Vec<u64> = offset_table[..needed]
            .chunks_exact(OFFSET_BYTES)
            .map(|c| {
                let mut raw = [0u8; OFFSET_BYTES];
                raw.copy_from_slice(c);
                u64::from_le_bytes(raw)
            })
            .collect();

        if offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(AnnError::fail("Metadata offsets are not monotonic"));
        }
        let data = data.into_bytes();
        let end = offsets[count];
        if end > data.len() as u64 {
            return Err(AnnError::fail(format!(
                "Metadata offset {} exceeds blob length {}",
                end,
                data.len()
            )));
        }

        Ok(Self {
            base: data.slice(..end as usize),
            offsets,
            tail: Vec::new(),
        })
    }

    /// Creates a set from a data blob and an index blob
    /// (`[count: i32][offsets: u64 × (count + 1)]`), viewing both without
    /// copying.
    pub fn from_blobs(data: Bytes, index: Bytes) -> Result<Self> {
        if index.len() < COUNT_BYTES {
            return Err(AnnError::fail("Metadata index blob is too short"));
        }
        let mut raw = [0u8; COUNT_BYTES];
        raw.copy_from_slice(&index[..COUNT_BYTES]);
        let count = SizeType::from_le_bytes(raw);
        if count < 0 {
            return Err(AnnError::fail(format!("Negative metadata count {}", count)));
        }
        Self::from_parts(
            ByteArray::View(data),
            &index[COUNT_BYTES..],
            count as usize,
        )
    }

    /// Reads a set from a data stream and an index stream.
    pub fn read_from(data: &mut dyn Read, index: &mut dyn Read) -> Result<Self> {
        let mut data_buf = Vec::new();
        data.read_to_end(&mut data_buf)?;
        let mut index_buf = Vec::new();
        index.read_to_end(&mut index_buf)?;
        Self::from_blobs(Bytes::from(data_buf), Bytes::from(index_buf))
    }

    /// Loads a set from a data file and an index file.
    pub fn load_files(data_path: impl AsRef<Path>, index_path: impl AsRef<Path>) -> Result<Self> {
        let data_path = data_path.as_ref();
        let index_path = index_path.as_ref();
        let data = fs::read(data_path).map_err(|e| AnnError::open_file(data_path, e))?;
        let index = fs::read(index_path).map_err(|e| AnnError::open_file(index_path, e))?;
        Self::from_blobs(Bytes::from(data), Bytes::from(index))
    }

    /// Number of entries.
    pub fn count(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Entry for `id`, or `None` past the end.
    ///
    /// Entries of the loaded blob come back as [`ByteArray::View`]; entries
    /// appended later come back as [`ByteArray::Owned`] copies.
    pub fn get(&self, id: VecId) -> Option<ByteArray> {
        if id >= self.count() {
            return None;
        }
        let (start, end) = (self.offsets[id] as usize, self.offsets[id + 1] as usize);
        if start == end {
            return Some(ByteArray::Empty);
        }
        let base_len = self.base.len();
        if end <= base_len {
            Some(ByteArray::View(self.base.slice(start..end)))
        } else {
            Some(ByteArray::copy_from(
                &self.tail[start - base_len..end - base_len],
            ))
        }
    }

    /// Runs `f` on the bytes of entry `id` without copying.
    pub fn with_entry<R>(&self, id: VecId, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        if id >= self.count() {
            return None;
        }
        let (start, end) = (self.offsets[id] as usize, self.offsets[id + 1] as usize);
        let base_len = self.base.len();
        let bytes = if end <= base_len {
            &self.base[start..end]
        } else {
            &self.tail[start - base_len..end - base_len]
        };
        Some(f(bytes))
    }

    /// Appends one entry.
    pub fn push(&mut self, entry: &[u8]) {
        self.tail.extend_from_slice(entry);
        let last = *self.offsets.last().unwrap_or(&0);
        self.offsets.push(last + entry.len() as u64);
    }

    /// Appends every entry of `other`, in order.
    pub fn append(&mut self, other: &MetadataSet) {
        for id in 0..other.count() {
            other.with_entry(id, |bytes| self.push(bytes));
        }
    }

    /// Returns a compacted owned copy holding only `ids`, in the given
    /// order.
    pub fn refine(&self, ids: &[VecId]) -> MetadataSet {
        let mut out = MetadataSet::new();
        for &id in ids {
            match self.with_entry(id, |bytes| out.push(bytes)) {
                Some(()) => {}
                None => out.push(&[]),
            }
        }
        out
    }

    /// Serialized sizes `(data bytes, index bytes)`.
    pub fn buffer_size(&self) -> (u64, u64) {
        let data = self.offsets[self.count()] - self.offsets[0];
        let index = (COUNT_BYTES + self.offsets.len() * OFFSET_BYTES) as u64;
        (data, index)
    }

    /// Writes the data and index artifacts.
    pub fn write_to(&self, data_out: &mut dyn Write, index_out: &mut dyn Write) -> Result<()> {
        let first = self.offsets[0] as usize;
        data_out.write_all(&self.base[first.min(self.base.len())..])?;
        data_out.write_all(&self.tail)?;

        index_out.write_all(&(self.count() as SizeType).to_le_bytes())?;
        for &offset in &self.offsets {
            index_out.write_all(&(offset - self.offsets[0]).to_le_bytes())?;
        }
        Ok(())
    }

    /// Serializes into a `(data, index)` blob pair.
    pub fn to_blobs(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        let (data_len, index_len) = self.buffer_size();
        let mut data = Vec::with_capacity(data_len as usize);
        let mut index = Vec::with_capacity(index_len as usize);
        self.write_to(&mut data, &mut index)?;
        Ok((data, index))
    }

    /// Saves to a data file and an index file.
    pub fn save_files(&self, data_path: impl AsRef<Path>, index_path: impl AsRef<Path>) -> Result<()> {
        let data_path = data_path.as_ref();
        let index_path = index_path.as_ref();
        let mut data = BufWriter::new(
            File::create(data_path).map_err(|e| AnnError::create_file(data_path, e))?,
        );
        let mut index = BufWriter::new(
            File::create(index_path).map_err(|e| AnnError::create_file(index_path, e))?,
        );
        self.write_to(&mut data, &mut index)?;
        data.flush()?;
        index.flush()?;
        Ok(())
    }
}

/// Metadata content → vector id lookup.
///
/// Built on request and populated additively. Operations that change the
/// live id set without updating the map mark it stale; a stale map still
/// answers lookups but may point at deleted ids until rebuilt.
#[derive(Clone, Debug, Default)]
pub struct ReverseMap {
    map: HashMap<Vec<u8>, VecId>,
    stale: bool,
}

impl ReverseMap {
    /// Builds a map over every id of `metadata` for which `is_live`
    /// holds. For duplicate content the highest live id wins.
    pub fn build(metadata: &MetadataSet, mut is_live: impl FnMut(VecId) -> bool) -> Self {
        let mut map = HashMap::with_capacity(metadata.count());
        for id in 0..metadata.count() {
            if is_live(id) {
                metadata.with_entry(id, |bytes| map.insert(bytes.to_vec(), id));
            }
        }
        Self { map, stale: false }
    }

    /// Records `key → id`, replacing any previous mapping.
    pub fn insert(&mut self, key: &[u8], id: VecId) {
        self.map.insert(key.to_vec(), id);
    }

    /// Looks up the id for an exact byte match.
    pub fn get(&self, key: &[u8]) -> Option<VecId> {
        self.map.get(key).copied()
    }

    /// Flags the map as out of date.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Returns true if ids changed since the map was last built.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if there are no keys.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
