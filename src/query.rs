//! Search result slots.

use crate::byte_array::ByteArray;
use crate::types::VecId;

/// One slot of a search result.
///
/// Result buffers hold exactly `k` slots per query; slots beyond the
/// number of live matches stay empty (`vid == None`, `dist == f32::MAX`).
#[derive(Clone, Debug, PartialEq)]
pub struct BasicResult {
    /// Matched id, `None` for an empty slot.
    pub vid: Option<VecId>,
    /// Distance to the query.
    pub dist: f32,
    /// Metadata of the match, filled only when requested.
    pub meta: ByteArray,
}

impl Default for BasicResult {
    fn default() -> Self {
        Self {
            vid: None,
            dist: f32::MAX,
            meta: ByteArray::Empty,
        }
    }
}

impl BasicResult {
    /// A filled slot without metadata.
    pub fn hit(vid: VecId, dist: f32) -> Self {
        Self {
            vid: Some(vid),
            dist,
            meta: ByteArray::Empty,
        }
    }

    /// Returns true if the slot holds no match.
    pub fn is_empty(&self) -> bool {
        self.vid.is_none()
    }
}
