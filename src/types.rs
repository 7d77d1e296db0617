//! Core type definitions: vector identifiers, closed type tags, and the
//! element-type trait every stored vector value implements.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AnnError;

/// Dense, zero-based handle into a variant's vector storage.
pub type VecId = usize;

/// On-disk width of a vector count or identifier.
pub type SizeType = i32;

/// On-disk width of a dimension.
pub type DimensionType = i32;

/// Index algorithm tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexAlgoType {
    /// Balanced k-means tree partition.
    BKT,
    /// k-d tree partition.
    KDT,
    /// No algorithm; never instantiable.
    Undefined,
}

impl fmt::Display for IndexAlgoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BKT => "BKT",
            Self::KDT => "KDT",
            Self::Undefined => "Undefined",
        })
    }
}

impl FromStr for IndexAlgoType {
    type Err = AnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BKT" => Ok(Self::BKT),
            "KDT" => Ok(Self::KDT),
            "UNDEFINED" => Ok(Self::Undefined),
            _ => Err(AnnError::parse(format!("Unknown index algorithm '{}'", s))),
        }
    }
}

/// Element value type of stored vectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VectorValueType {
    /// Signed 8-bit integer.
    Int8,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Signed 16-bit integer.
    Int16,
    /// 32-bit float.
    Float,
    /// No element type; never instantiable.
    Undefined,
}

impl VectorValueType {
    /// Size in bytes of one element (0 for `Undefined`).
    #[inline]
    pub const fn size(&self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 => 2,
            Self::Float => 4,
            Self::Undefined => 0,
        }
    }
}

impl fmt::Display for VectorValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Int8 => "Int8",
            Self::UInt8 => "UInt8",
            Self::Int16 => "Int16",
            Self::Float => "Float",
            Self::Undefined => "Undefined",
        })
    }
}

impl FromStr for VectorValueType {
    type Err = AnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int8" => Ok(Self::Int8),
            "uint8" => Ok(Self::UInt8),
            "int16" => Ok(Self::Int16),
            "float" => Ok(Self::Float),
            "undefined" => Ok(Self::Undefined),
            _ => Err(AnnError::parse(format!("Unknown value type '{}'", s))),
        }
    }
}

/// Distance function used by a variant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistCalcMethod {
    /// Squared Euclidean distance.
    #[default]
    L2,
    /// Cosine distance: `1 - cos(a, b)`.
    Cosine,
    /// Not configured.
    Undefined,
}

impl fmt::Display for DistCalcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::L2 => "L2",
            Self::Cosine => "Cosine",
            Self::Undefined => "Undefined",
        })
    }
}

impl FromStr for DistCalcMethod {
    type Err = AnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l2" => Ok(Self::L2),
            "cosine" => Ok(Self::Cosine),
            "undefined" => Ok(Self::Undefined),
            _ => Err(AnnError::parse(format!("Unknown distance method '{}'", s))),
        }
    }
}

/// An element type vectors can be stored as.
///
/// Values are exchanged as little-endian bytes so blobs are portable across
/// hosts.
pub trait VectorValue:
    Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static
{
    /// Tag matching this element type.
    const VALUE_TYPE: VectorValueType;

    /// Widens the value for distance computation.
    fn to_f32(self) -> f32;

    /// Decodes one value from exactly `VALUE_TYPE.size()` bytes.
    fn read_le(bytes: &[u8]) -> Self;

    /// Appends the little-endian encoding of the value.
    fn write_le(self, out: &mut Vec<u8>);
}

macro_rules! impl_vector_value {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl VectorValue for $ty {
                const VALUE_TYPE: VectorValueType = VectorValueType::$tag;

                #[inline]
                fn to_f32(self) -> f32 {
                    self as f32
                }

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }

                #[inline]
                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_vector_value!(i8 => Int8, u8 => UInt8, i16 => Int16, f32 => Float);

/// Decodes a little-endian row into typed values.
pub fn decode_row<T: VectorValue>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(T::VALUE_TYPE.size())
        .map(T::read_le)
        .collect()
}

/// Encodes typed values as a little-endian row.
pub fn encode_row<T: VectorValue>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::VALUE_TYPE.size());
    for v in values {
        v.write_le(&mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algo_type_tags() {
        assert_eq!("BKT".parse::<IndexAlgoType>().unwrap(), IndexAlgoType::BKT);
        assert_eq!("kdt".parse::<IndexAlgoType>().unwrap(), IndexAlgoType::KDT);
        assert!("HNSW".parse::<IndexAlgoType>().unwrap_err().is_parse());
        assert_eq!(IndexAlgoType::KDT.to_string(), "KDT");
    }

    #[test]
    fn test_value_type_tags_and_sizes() {
        for vt in [
            VectorValueType::Int8,
            VectorValueType::UInt8,
            VectorValueType::Int16,
            VectorValueType::Float,
        ] {
            assert_eq!(vt.to_string().parse::<VectorValueType>().unwrap(), vt);
        }
        assert_eq!(VectorValueType::Int16.size(), 2);
        assert_eq!(VectorValueType::Float.size(), 4);
        assert_eq!(VectorValueType::Undefined.size(), 0);
        assert!("Double".parse::<VectorValueType>().is_err());
    }

    #[test]
    fn test_dist_method_parse() {
        assert_eq!("Cosine".parse::<DistCalcMethod>().unwrap(), DistCalcMethod::Cosine);
        assert_eq!(DistCalcMethod::default(), DistCalcMethod::L2);
        assert!("Manhattan".parse::<DistCalcMethod>().is_err());
    }

    #[test]
    fn test_row_encoding() {
        let row = [1.5f32, -2.0, 0.25];
        let bytes = encode_row(&row);
        assert_eq!(bytes.len(), 12);
        assert_eq!(decode_row::<f32>(&bytes), row.to_vec());

        let ints = [-3i16, 700];
        assert_eq!(decode_row::<i16>(&encode_row(&ints)), ints.to_vec());
    }
}
