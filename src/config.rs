//! Caller supplied configuration: the coordinate chain and per-format decoder options.
//!
//! All structs deserialize from camelCase JSON with every field optional.
use hashbrown::HashMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    geometry::crs::EpsgCrs,
};

/// Configuration of a [`crate::geometry::chain::CoordinatesTransformer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChainConfig {
    pub source_crs: EpsgCrs,
    pub target_crs: EpsgCrs,
    pub swap_axes: bool,
    pub reverse_order: bool,
    /// In target units; 0 disables simplification.
    pub simplify_tolerance: f64,
    /// Defaults to 4 for polygonal geometries and 2 otherwise.
    pub min_points_for_simplify: Option<usize>,
    /// Decimal places of the output; 0 keeps full precision.
    pub output_precision: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            source_crs: EpsgCrs::CRS84,
            target_crs: EpsgCrs::CRS84,
            swap_axes: false,
            reverse_order: false,
            simplify_tolerance: 0.0,
            min_points_for_simplify: None,
            output_precision: 0,
        }
    }
}

impl ChainConfig {
    #[must_use]
    pub fn new(source_crs: EpsgCrs, target_crs: EpsgCrs) -> Self {
        Self {
            source_crs,
            target_crs,
            ..Self::default()
        }
    }

    /// # Errors
    ///
    /// [`Error::Config`] for a negative or non-finite tolerance or a precision beyond what an
    /// `f64` can hold.
    pub fn validate(&self) -> Result<()> {
        if !self.simplify_tolerance.is_finite() || self.simplify_tolerance < 0.0 {
            return Err(Error::Config(format!(
                "simplifyTolerance must be a finite number >= 0, got {}",
                self.simplify_tolerance
            )));
        }
        if self.output_precision > 17 {
            return Err(Error::Config(format!(
                "outputPrecision must be <= 17, got {}",
                self.output_precision
            )));
        }
        Ok(())
    }
}

/// Options shared by the JSON based decoders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecoderOptions {
    /// Text reported for JSON `null`; `null` values are skipped when unset.
    pub null_value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GmlOptions {
    /// Local names of the feature elements. When empty, children of `member`/`featureMember`
    /// are features.
    pub feature_types: Vec<String>,
    /// Prefix to namespace URI. Elements are reported with these prefixes, whatever prefix the
    /// document uses for the same URI.
    pub namespaces: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GraphQlOptions {
    /// Member of `data` holding the features.
    pub wrapper: String,
    /// Prepended to every property path when set.
    pub type_name: Option<String>,
    /// Member holding the GeoJSON geometry of a feature.
    pub geometry: Option<String>,
    pub null_value: Option<String>,
}

impl Default for GraphQlOptions {
    fn default() -> Self {
        Self {
            wrapper: "features".to_string(),
            type_name: None,
            geometry: None,
            null_value: None,
        }
    }
}

/// Loads any of the configuration structs from JSON.
///
/// # Errors
///
/// [`Error::Serde`] if the JSON does not match.
pub fn from_json_str<T: DeserializeOwned>(json: &str) -> Result<T> {
    Ok(serde_json::from_str(json)?)
}
