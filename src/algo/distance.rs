//! Distance functions over stored rows and `f32` probes.

use crate::types::{DistCalcMethod, VectorValue};

/// Distance between a stored row and an `f32` probe.
///
/// `L2` is the squared Euclidean distance; `Cosine` is `1 - cos(a, b)`,
/// taken as 1 when either side has zero norm.
#[inline]
pub fn distance<T: VectorValue>(row: &[T], probe: &[f32], method: DistCalcMethod) -> f32 {
    match method {
        DistCalcMethod::Cosine => {
            let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
            for (a, &b) in row.iter().zip(probe) {
                let a = a.to_f32();
                dot += a * b;
                na += a * a;
                nb += b * b;
            }
            if na == 0.0 || nb == 0.0 {
                1.0
            } else {
                1.0 - dot / (na.sqrt() * nb.sqrt())
            }
        }
        DistCalcMethod::L2 | DistCalcMethod::Undefined => row
            .iter()
            .zip(probe)
            .map(|(a, &b)| {
                let d = a.to_f32() - b;
                d * d
            })
            .sum(),
    }
}

/// Widens a stored row to `f32`.
#[inline]
pub fn widen<T: VectorValue>(row: &[T]) -> Vec<f32> {
    row.iter().map(|v| v.to_f32()).collect()
}
