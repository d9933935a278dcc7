//! Coordinate reference system identifiers and the transformation capability the coordinate
//! chain consumes.
use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    geometry::coordinates::CoordinateTuple,
};

pub const CRS84_URI: &str = "http://www.opengis.net/def/crs/OGC/1.3/CRS84";
pub const CRS84H_URI: &str = "http://www.opengis.net/def/crs/OGC/0/CRS84h";

/// Overrides the axis order declared by the authority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForceAxisOrder {
    #[default]
    None,
    LonLat,
    LatLon,
}

/// An EPSG coded reference system, optionally compound with a vertical system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EpsgCrs {
    pub code: u32,
    pub vertical_code: Option<u32>,
    pub force_axis_order: ForceAxisOrder,
}

impl EpsgCrs {
    /// WGS 84 with longitude first.
    pub const CRS84: EpsgCrs = EpsgCrs {
        code: 4326,
        vertical_code: None,
        force_axis_order: ForceAxisOrder::LonLat,
    };

    /// WGS 84 with longitude first and ellipsoidal height.
    pub const CRS84H: EpsgCrs = EpsgCrs {
        code: 4979,
        vertical_code: None,
        force_axis_order: ForceAxisOrder::LonLat,
    };

    #[must_use]
    pub const fn new(code: u32) -> Self {
        Self {
            code,
            vertical_code: None,
            force_axis_order: ForceAxisOrder::None,
        }
    }

    #[must_use]
    pub const fn compound(code: u32, vertical_code: u32) -> Self {
        Self {
            code,
            vertical_code: Some(vertical_code),
            force_axis_order: ForceAxisOrder::None,
        }
    }

    #[must_use]
    pub const fn with_force_axis_order(mut self, force_axis_order: ForceAxisOrder) -> Self {
        self.force_axis_order = force_axis_order;
        self
    }

    #[must_use]
    pub fn to_simple_string(&self) -> String {
        format!("EPSG:{}", self.code)
    }

    #[must_use]
    pub fn to_urn_string(&self) -> String {
        format!("urn:ogc:def:crs:EPSG::{}", self.code)
    }

    #[must_use]
    pub fn to_uri_string(&self) -> String {
        match *self {
            EpsgCrs::CRS84 => CRS84_URI.to_string(),
            EpsgCrs::CRS84H => CRS84H_URI.to_string(),
            _ => format!("http://www.opengis.net/def/crs/EPSG/0/{}", self.code),
        }
    }
}

impl Default for EpsgCrs {
    fn default() -> Self {
        EpsgCrs::CRS84
    }
}

impl fmt::Display for EpsgCrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            EpsgCrs::CRS84 => f.write_str("CRS84"),
            EpsgCrs::CRS84H => f.write_str("CRS84h"),
            _ => f.write_str(&self.to_simple_string()),
        }
    }
}

impl FromStr for EpsgCrs {
    type Err = Error;

    /// Accepts `EPSG:25832`, `urn:ogc:def:crs:EPSG::25832`,
    /// `http://www.opengis.net/def/crs/EPSG/0/25832`, a bare code, and the OGC forms of CRS84
    /// and CRS84h.
    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        let last = value
            .rsplit(|chr: char| chr == ':' || chr == '/')
            .next()
            .unwrap_or(value);

        match last {
            "CRS84" => return Ok(EpsgCrs::CRS84),
            "CRS84h" => return Ok(EpsgCrs::CRS84H),
            _ => {}
        }

        last.parse::<u32>()
            .map(EpsgCrs::new)
            .map_err(|_| Error::Config(format!("Could not parse CRS: {value}")))
    }
}

impl TryFrom<String> for EpsgCrs {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<EpsgCrs> for String {
    fn from(crs: EpsgCrs) -> Self {
        crs.to_uri_string()
    }
}

/// Transforms coordinates between two reference systems.
///
/// `transform` works on a flat run of tuples (`x y [z] x y [z] ...`). When `swap` is set and
/// [`CrsTransformer::needs_coordinate_swap`] is true, the transformer also corrects the axis order
/// for sides whose longitude-first override disagrees with the authority's declared order.
#[allow(clippy::missing_errors_doc)]
pub trait CrsTransformer: Send + Sync + fmt::Debug {
    fn source_crs(&self) -> EpsgCrs;
    fn target_crs(&self) -> EpsgCrs;
    fn is_source_metric(&self) -> bool;
    fn is_target_metric(&self) -> bool;
    fn source_unit_equivalent_in_meters(&self) -> f64;
    fn target_unit_equivalent_in_meters(&self) -> f64;
    fn needs_coordinate_swap(&self) -> bool;
    fn source_dimension(&self) -> usize;
    fn target_dimension(&self) -> usize;
    fn transform(&self, coordinates: &[f64], dimension: usize, swap: bool) -> Result<Vec<f64>>;

    fn transform_tuple(&self, tuple: &CoordinateTuple, swap: bool) -> Result<CoordinateTuple> {
        let transformed = self.transform(&tuple.to_vec(), tuple.dimension(), swap)?;
        let mut result = CoordinateTuple::from_slice(&transformed)?;
        result.crs = Some(self.target_crs());
        Ok(result)
    }
}

/// The external CRS capability: decides which systems are usable and hands out transformers.
#[allow(clippy::missing_errors_doc)]
pub trait CrsTransformerFactory: Send + Sync {
    fn is_supported(&self, crs: &EpsgCrs) -> bool;

    fn is_3d(&self, crs: &EpsgCrs) -> bool;

    /// `Ok(None)` when source and target are the same system.
    fn transformer(
        &self,
        source: &EpsgCrs,
        target: &EpsgCrs,
    ) -> Result<Option<Arc<dyn CrsTransformer>>>;
}
