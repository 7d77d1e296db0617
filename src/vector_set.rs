//! Typed vector batches and checked strided views over flat buffers.

use crate::byte_array::ByteArray;
use crate::error::{AnnError, Result};
use crate::types::{encode_row, VectorValue, VectorValueType};

/// A batch of `count` vectors of `dim` elements stored as one flat
/// little-endian buffer.
#[derive(Clone, Debug)]
pub struct VectorSet {
    data: ByteArray,
    value_type: VectorValueType,
    dim: usize,
    count: usize,
}

impl VectorSet {
    /// Wraps a flat buffer, checking that its length matches
    /// `count * dim * value_type.size()`.
    pub fn new(
        data: ByteArray,
        value_type: VectorValueType,
        dim: usize,
        count: usize,
    ) -> Result<Self> {
        StridedView::new(data.as_slice(), value_type, dim, count)?;
        Ok(Self {
            data,
            value_type,
            dim,
            count,
        })
    }

    /// Builds an owned set from typed values laid out row by row.
    pub fn from_values<T: VectorValue>(values: &[T], dim: usize) -> Result<Self> {
        if dim == 0 || values.len() % dim != 0 {
            return Err(AnnError::fail(format!(
                "{} values do not form rows of dimension {}",
                values.len(),
                dim
            )));
        }
        Self::new(
            ByteArray::Owned(encode_row(values)),
            T::VALUE_TYPE,
            dim,
            values.len() / dim,
        )
    }

    /// Builds an owned set from equally sized rows.
    pub fn from_rows<T: VectorValue>(rows: &[Vec<T>]) -> Result<Self> {
        let dim = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != dim) {
            return Err(AnnError::fail("Rows have differing dimensions"));
        }
        let flat: Vec<T> = rows.iter().flatten().copied().collect();
        Self::from_values(&flat, dim)
    }

    /// Element type of the set.
    pub fn value_type(&self) -> VectorValueType {
        self.value_type
    }

    /// Number of vectors.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Elements per vector.
    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// The raw flat buffer.
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Returns a checked view over the set.
    pub fn view(&self) -> StridedView<'_> {
        StridedView {
            data: self.data.as_slice(),
            value_type: self.value_type,
            dim: self.dim,
            count: self.count,
        }
    }
}

/// A checked view of `count` fixed-stride rows over a flat byte buffer.
///
/// Bounds and stride are validated once at construction; row access is then
/// a plain slice.
#[derive(Clone, Copy, Debug)]
pub struct StridedView<'a> {
    data: &'a [u8],
    value_type: VectorValueType,
    dim: usize,
    count: usize,
}

impl<'a> StridedView<'a> {
    /// Creates a view of `count` rows of `dim` elements of `value_type`.
    ///
    /// The buffer must hold exactly `count` rows.
    pub fn new(
        data: &'a [u8],
        value_type: VectorValueType,
        dim: usize,
        count: usize,
    ) -> Result<Self> {
        if value_type == VectorValueType::Undefined {
            return Err(AnnError::fail("Vector value type is undefined"));
        }
        if dim == 0 && count > 0 {
            return Err(AnnError::fail("Vector dimension must be greater than 0"));
        }
        let expected = value_type
            .size()
            .checked_mul(dim)
            .and_then(|row| row.checked_mul(count))
            .ok_or_else(|| {
                AnnError::fail(format!("{} x {} {} overflows the buffer size", count, dim, value_type))
            })?;
        if data.len() != expected {
            return Err(AnnError::fail(format!(
                "Buffer holds {} bytes, expected {} for {} x {} {}",
                data.len(),
                expected,
                count,
                dim,
                value_type
            )));
        }
        Ok(Self {
            data,
            value_type,
            dim,
            count,
        })
    }

    /// Byte length of one row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.value_type.size() * self.dim
    }

    /// Number of rows.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Elements per row.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// Element type of the rows.
    #[inline]
    pub fn value_type(&self) -> VectorValueType {
        self.value_type
    }

    /// The whole underlying buffer.
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Row `i`, or `None` past the end.
    #[inline]
    pub fn get(&self, i: usize) -> Option<&'a [u8]> {
        if i >= self.count {
            return None;
        }
        let stride = self.stride();
        Some(&self.data[i * stride..(i + 1) * stride])
    }

    /// Iterates rows in order.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &'a [u8]> + 'a {
        let stride = self.stride();
        let count = self.count;
        let data = self.data;
        (0..count).map(move |i| &data[i * stride..(i + 1) * stride])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_values_shapes() {
        let set = VectorSet::from_values(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], 3).unwrap();
        assert_eq!(set.count(), 2);
        assert_eq!(set.dimension(), 3);
        assert_eq!(set.value_type(), VectorValueType::Float);
        assert_eq!(set.data().len(), 24);
    }

    #[test]
    fn test_from_values_rejects_ragged() {
        assert!(VectorSet::from_values(&[1u8, 2, 3], 2).is_err());
        assert!(VectorSet::from_values::<u8>(&[], 0).is_err());
    }

    #[test]
    fn test_from_rows() {
        let set = VectorSet::from_rows(&[vec![1i16, 2], vec![3, 4]]).unwrap();
        assert_eq!(set.count(), 2);
        assert!(VectorSet::from_rows(&[vec![1i16, 2], vec![3]]).is_err());
    }

    #[test]
    fn test_view_rows_and_bounds() {
        let data: Vec<u8> = (0..12).collect();
        let view = StridedView::new(&data, VectorValueType::Int16, 2, 3).unwrap();
        assert_eq!(view.stride(), 4);
        assert_eq!(view.get(1).unwrap(), &[4, 5, 6, 7]);
        assert!(view.get(3).is_none());
        assert_eq!(view.rows().count(), 3);
    }

    #[test]
    fn test_view_rejects_short_buffer() {
        let data = vec![0u8; 10];
        let err = StridedView::new(&data, VectorValueType::Float, 2, 2).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::Fail);
        assert!(StridedView::new(&data, VectorValueType::Undefined, 2, 1).is_err());
    }

    #[test]
    fn test_view_rejects_overflowing_shape() {
        let data = vec![0u8; 8];
        let err = StridedView::new(&data, VectorValueType::Float, usize::MAX / 2, 3).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::Fail);
        assert!(VectorSet::new(ByteArray::Empty, VectorValueType::Int16, usize::MAX, 2).is_err());
    }
}
