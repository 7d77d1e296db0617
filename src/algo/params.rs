//! Tunables for the tree-partition variants.
//!
//! All fields have sensible defaults. Parameters are addressed by their
//! config key (matched case-insensitively); a variant only accepts the keys
//! listed for its algorithm.

use serde::{Deserialize, Serialize};

use crate::error::{AnnError, Result};
use crate::types::{DistCalcMethod, IndexAlgoType};

/// Keys accepted by every tree variant, in config order.
const COMMON_KEYS: &[&str] = &[
    "DistCalcMethod",
    "TreeNumber",
    "NeighborhoodSize",
    "MaxCheck",
    "DeletePercentageForRefine",
];

const BKT_KEYS: &[&str] = &["BKTKmeansK", "BKTLeafSize"];

const KDT_KEYS: &[&str] = &["NumTopDimensionKDTSplit"];

/// Variant configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Distance function.
    pub dist_calc_method: DistCalcMethod,

    /// Number of trees built over the samples.
    pub tree_number: usize,

    /// Neighbors kept per vertex in the neighborhood graph.
    pub neighborhood_size: usize,

    /// Distance evaluations allowed per query. Indexes with at most this
    /// many samples are searched exhaustively.
    pub max_check: usize,

    /// Fraction of deleted samples above which a save compacts the index.
    pub delete_percentage_for_refine: f32,

    /// Branching factor of each k-means split (BKT).
    pub bkt_kmeans_k: usize,

    /// Maximum samples per BKT leaf group.
    pub bkt_leaf_size: usize,

    /// Number of highest-variance dimensions rotated across KDT trees.
    pub num_top_dimension_kdt_split: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            dist_calc_method: DistCalcMethod::L2,
            tree_number: 1,
            neighborhood_size: 32,
            max_check: 8192,
            delete_percentage_for_refine: 0.4,
            bkt_kmeans_k: 32,
            bkt_leaf_size: 8,
            num_top_dimension_kdt_split: 5,
        }
    }
}

impl TreeParams {
    /// Config keys accepted for `algo`, in the order they are saved.
    pub fn keys(algo: IndexAlgoType) -> Vec<&'static str> {
        let extra: &[&str] = match algo {
            IndexAlgoType::BKT => BKT_KEYS,
            IndexAlgoType::KDT => KDT_KEYS,
            IndexAlgoType::Undefined => &[],
        };
        COMMON_KEYS.iter().chain(extra).copied().collect()
    }

    fn canonical(algo: IndexAlgoType, name: &str) -> Result<&'static str> {
        Self::keys(algo)
            .into_iter()
            .find(|k| k.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| AnnError::fail(format!("Unknown {} parameter '{}'", algo, name)))
    }

    /// Returns the value of `name` formatted as in the config.
    ///
    /// # Errors
    /// Returns `Fail` if `name` is not a key of `algo`.
    pub fn get(&self, algo: IndexAlgoType, name: &str) -> Result<String> {
        let value = match Self::canonical(algo, name)? {
            "DistCalcMethod" => self.dist_calc_method.to_string(),
            "TreeNumber" => self.tree_number.to_string(),
            "NeighborhoodSize" => self.neighborhood_size.to_string(),
            "MaxCheck" => self.max_check.to_string(),
            "DeletePercentageForRefine" => self.delete_percentage_for_refine.to_string(),
            "BKTKmeansK" => self.bkt_kmeans_k.to_string(),
            "BKTLeafSize" => self.bkt_leaf_size.to_string(),
            _ => self.num_top_dimension_kdt_split.to_string(),
        };
        Ok(value)
    }

    /// Sets `name` from its config representation.
    ///
    /// # Errors
    /// Returns `Fail` for an unknown key and `FailedParseValue` for a value
    /// that does not parse or is out of range.
    pub fn set(&mut self, algo: IndexAlgoType, name: &str, value: &str) -> Result<()> {
        let key = Self::canonical(algo, name)?;
        let value = value.trim();
        let bad = || AnnError::parse(format!("Invalid value '{}' for {}", value, key));
        let count = || value.parse::<usize>().map_err(|_| bad());

        let mut next = self.clone();
        match key {
            "DistCalcMethod" => next.dist_calc_method = value.parse()?,
            "TreeNumber" => next.tree_number = count()?,
            "NeighborhoodSize" => next.neighborhood_size = count()?,
            "MaxCheck" => next.max_check = count()?,
            "DeletePercentageForRefine" => {
                next.delete_percentage_for_refine = value.parse().map_err(|_| bad())?
            }
            "BKTKmeansK" => next.bkt_kmeans_k = count()?,
            "BKTLeafSize" => next.bkt_leaf_size = count()?,
            _ => next.num_top_dimension_kdt_split = count()?,
        }
        next.validate().map_err(|_| bad())?;
        *self = next;
        Ok(())
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.dist_calc_method == DistCalcMethod::Undefined {
            return Err(AnnError::parse("DistCalcMethod must be defined"));
        }
        if self.tree_number == 0 {
            return Err(AnnError::parse("TreeNumber must be greater than 0"));
        }
        if self.max_check == 0 {
            return Err(AnnError::parse("MaxCheck must be greater than 0"));
        }
        if self.neighborhood_size == 0 {
            return Err(AnnError::parse("NeighborhoodSize must be greater than 0"));
        }
        if self.bkt_kmeans_k < 2 {
            return Err(AnnError::parse("BKTKmeansK must be at least 2"));
        }
        if self.bkt_leaf_size == 0 || self.num_top_dimension_kdt_split == 0 {
            return Err(AnnError::parse("Leaf and split sizes must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.delete_percentage_for_refine) {
            return Err(AnnError::parse(
                "DeletePercentageForRefine must be within [0, 1]",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let params = TreeParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.get(IndexAlgoType::BKT, "maxcheck").unwrap(), "8192");
    }

    #[test]
    fn test_keys_per_algo() {
        assert!(TreeParams::keys(IndexAlgoType::BKT).contains(&"BKTKmeansK"));
        assert!(!TreeParams::keys(IndexAlgoType::KDT).contains(&"BKTKmeansK"));
        assert!(TreeParams::keys(IndexAlgoType::KDT).contains(&"NumTopDimensionKDTSplit"));
    }

    #[test]
    fn test_set_and_get() {
        let mut params = TreeParams::default();
        params.set(IndexAlgoType::KDT, "TreeNumber", "3").unwrap();
        params.set(IndexAlgoType::KDT, "distcalcmethod", "Cosine").unwrap();
        assert_eq!(params.tree_number, 3);
        assert_eq!(params.dist_calc_method, DistCalcMethod::Cosine);
        assert_eq!(params.get(IndexAlgoType::KDT, "DistCalcMethod").unwrap(), "Cosine");
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut params = TreeParams::default();
        let err = params.set(IndexAlgoType::KDT, "BKTKmeansK", "8").unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::Fail);
        assert!(params.get(IndexAlgoType::BKT, "Bogus").is_err());
    }

    #[test]
    fn test_bad_values_leave_params_unchanged() {
        let mut params = TreeParams::default();
        assert!(params.set(IndexAlgoType::BKT, "TreeNumber", "0").unwrap_err().is_parse());
        assert!(params.set(IndexAlgoType::BKT, "MaxCheck", "-4").unwrap_err().is_parse());
        assert!(params
            .set(IndexAlgoType::BKT, "DeletePercentageForRefine", "1.5")
            .is_err());
        assert_eq!(params, TreeParams::default());
    }

    #[test]
    fn test_zero_neighborhood_rejected() {
        let mut params = TreeParams::default();
        let err = params
            .set(IndexAlgoType::KDT, "NeighborhoodSize", "0")
            .unwrap_err();
        assert!(err.is_parse());
        assert_eq!(params.neighborhood_size, TreeParams::default().neighborhood_size);

        params.neighborhood_size = 0;
        assert!(params.validate().is_err());
    }
}
