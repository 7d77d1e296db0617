//! Byte buffers with an explicit ownership mode.
//!
//! [`ByteArray`] is the unit of exchange for metadata entries and serialized
//! blobs. Ownership is part of the value:
//!
//! - `Owned` buffers are private copies and may be mutated by the holder.
//! - `View` buffers share a region of a larger buffer (`bytes::Bytes`), so an
//!   in-memory load can point into caller-supplied blobs without copying.
//!   The underlying memory lives as long as any view of it.
//! - `Empty` is the static empty value returned for absent metadata.

use std::ops::Deref;

use bytes::Bytes;

/// Immutable-or-owned byte buffer.
#[derive(Clone, Debug, Default)]
pub enum ByteArray {
    /// No bytes.
    #[default]
    Empty,
    /// A private copy.
    Owned(Vec<u8>),
    /// A shared zero-copy view into a larger buffer.
    View(Bytes),
}

impl ByteArray {
    /// Copies `data` into an owned buffer.
    pub fn copy_from(data: &[u8]) -> Self {
        if data.is_empty() {
            Self::Empty
        } else {
            Self::Owned(data.to_vec())
        }
    }

    /// Wraps a shared buffer without copying.
    pub fn view(data: Bytes) -> Self {
        Self::View(data)
    }

    /// Returns the bytes.
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Empty => &[],
            Self::Owned(v) => v,
            Self::View(b) => b,
        }
    }

    /// Number of bytes.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Returns true if there are no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if this buffer borrows from a shared region.
    pub fn is_view(&self) -> bool {
        matches!(self, Self::View(_))
    }

    /// Returns true if this buffer is a private copy.
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    /// Converts into a shared buffer.
    ///
    /// Views are re-shared (reference count bump); owned buffers move into
    /// a new shared allocation without copying.
    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Empty => Bytes::new(),
            Self::Owned(v) => Bytes::from(v),
            Self::View(b) => b,
        }
    }

    /// Returns a shared buffer without consuming `self`.
    ///
    /// Only `Owned` buffers are copied.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Empty => Bytes::new(),
            Self::Owned(v) => Bytes::copy_from_slice(v),
            Self::View(b) => b.clone(),
        }
    }

    /// Returns an owned copy of the bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }
}

impl Deref for ByteArray {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for ByteArray {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl PartialEq for ByteArray {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for ByteArray {}

impl From<Vec<u8>> for ByteArray {
    fn from(v: Vec<u8>) -> Self {
        Self::Owned(v)
    }
}

impl From<Bytes> for ByteArray {
    fn from(b: Bytes) -> Self {
        Self::View(b)
    }
}

impl From<&[u8]> for ByteArray {
    fn from(data: &[u8]) -> Self {
        Self::copy_from(data)
    }
}

impl From<&str> for ByteArray {
    fn from(s: &str) -> Self {
        Self::copy_from(s.as_bytes())
    }
}
