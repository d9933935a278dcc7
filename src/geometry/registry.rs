//! A small built-in CRS capability: WGS 84 / ETRS89 geographic systems and spherical Web
//! Mercator.
//!
//! Enough to exercise reprojection, unit normalisation and axis order handling without a
//! projection library. Every other code is reported as unsupported.
use std::{
    f64::consts::PI,
    sync::{Arc, PoisonError, RwLock},
};

use hashbrown::HashMap;
use tracing::debug;

use crate::{
    error::{Error, Result},
    geometry::crs::{CrsTransformer, CrsTransformerFactory, EpsgCrs, ForceAxisOrder},
};

const WGS84_SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
const GRS80_SEMI_MAJOR_AXIS: f64 = 6_378_137.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Projection {
    Geographic,
    WebMercator,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Definition {
    projection: Projection,
    latitude_first: bool,
    dimension: usize,
    semi_major_axis: f64,
}

impl Definition {
    fn lookup(crs: &EpsgCrs) -> Option<Self> {
        if crs.vertical_code.is_some() {
            return None;
        }
        let geographic = |dimension, semi_major_axis| Definition {
            projection: Projection::Geographic,
            latitude_first: true,
            dimension,
            semi_major_axis,
        };
        match apply_workarounds(*crs).code {
            4326 => Some(geographic(2, WGS84_SEMI_MAJOR_AXIS)),
            4979 => Some(geographic(3, WGS84_SEMI_MAJOR_AXIS)),
            4258 => Some(geographic(2, GRS80_SEMI_MAJOR_AXIS)),
            3857 => Some(Definition {
                projection: Projection::WebMercator,
                latitude_first: false,
                dimension: 2,
                semi_major_axis: WGS84_SEMI_MAJOR_AXIS,
            }),
            _ => None,
        }
    }

    fn is_metric(&self) -> bool {
        self.projection == Projection::WebMercator
    }

    fn unit_equivalent_in_meters(&self) -> f64 {
        if self.is_metric() {
            1.0
        } else {
            PI / 180.0 * self.semi_major_axis
        }
    }

    /// Declared axis order in, degrees out.
    fn to_lon_lat(&self, first: f64, second: f64) -> (f64, f64) {
        match self.projection {
            Projection::Geographic if self.latitude_first => (second, first),
            Projection::Geographic => (first, second),
            Projection::WebMercator => (
                (first / self.semi_major_axis).to_degrees(),
                (2.0 * (second / self.semi_major_axis).exp().atan() - PI / 2.0).to_degrees(),
            ),
        }
    }

    fn from_lon_lat(&self, lon: f64, lat: f64) -> (f64, f64) {
        match self.projection {
            Projection::Geographic if self.latitude_first => (lat, lon),
            Projection::Geographic => (lon, lat),
            Projection::WebMercator => (
                self.semi_major_axis * lon.to_radians(),
                self.semi_major_axis * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln(),
            ),
        }
    }
}

/// Codes that are aliases of supported systems.
fn apply_workarounds(crs: EpsgCrs) -> EpsgCrs {
    match crs.code {
        102_100 => EpsgCrs::new(3857),
        900_914 => EpsgCrs::CRS84H,
        _ => crs,
    }
}

/// Whether a longitude-first override contradicts the declared latitude-first order.
fn overrides_declared_order(crs: &EpsgCrs, definition: &Definition) -> bool {
    apply_workarounds(*crs).force_axis_order == ForceAxisOrder::LonLat && definition.latitude_first
}

#[derive(Debug)]
struct BuiltinTransformer {
    source: EpsgCrs,
    target: EpsgCrs,
    source_definition: Definition,
    target_definition: Definition,
    source_override: bool,
    target_override: bool,
}

impl BuiltinTransformer {
    fn new(source: EpsgCrs, target: EpsgCrs) -> Result<Self> {
        let source_definition = Definition::lookup(&source)
            .ok_or_else(|| Error::UnsupportedCrs(source.to_string()))?;
        let target_definition = Definition::lookup(&target)
            .ok_or_else(|| Error::UnsupportedCrs(target.to_string()))?;

        Ok(Self {
            source,
            target,
            source_override: overrides_declared_order(&source, &source_definition),
            target_override: overrides_declared_order(&target, &target_definition),
            source_definition,
            target_definition,
        })
    }
}

impl CrsTransformer for BuiltinTransformer {
    fn source_crs(&self) -> EpsgCrs {
        self.source
    }

    fn target_crs(&self) -> EpsgCrs {
        self.target
    }

    fn is_source_metric(&self) -> bool {
        self.source_definition.is_metric()
    }

    fn is_target_metric(&self) -> bool {
        self.target_definition.is_metric()
    }

    fn source_unit_equivalent_in_meters(&self) -> f64 {
        self.source_definition.unit_equivalent_in_meters()
    }

    fn target_unit_equivalent_in_meters(&self) -> f64 {
        self.target_definition.unit_equivalent_in_meters()
    }

    fn needs_coordinate_swap(&self) -> bool {
        self.source_override ^ self.target_override
    }

    fn source_dimension(&self) -> usize {
        self.source_definition.dimension
    }

    fn target_dimension(&self) -> usize {
        self.target_definition.dimension
    }

    fn transform(&self, coordinates: &[f64], dimension: usize, swap: bool) -> Result<Vec<f64>> {
        if dimension == 3 && (self.source_dimension() != 3 || self.target_dimension() != 3) {
            return Err(Error::Dimension {
                expected: 2,
                found: 3,
            });
        }
        if !(2..=3).contains(&dimension) {
            return Err(Error::Dimension {
                expected: 2,
                found: dimension,
            });
        }
        if coordinates.len() % dimension != 0 {
            return Err(Error::Dimension {
                expected: dimension,
                found: coordinates.len() % dimension,
            });
        }

        let swap_source = swap && self.source_override;
        let swap_target = swap && self.target_override;
        let mut transformed = Vec::with_capacity(coordinates.len());

        for tuple in coordinates.chunks_exact(dimension) {
            let (first, second) = if swap_source {
                (tuple[1], tuple[0])
            } else {
                (tuple[0], tuple[1])
            };
            let (lon, lat) = self.source_definition.to_lon_lat(first, second);
            let (x, y) = self.target_definition.from_lon_lat(lon, lat);
            if swap_target {
                transformed.extend([y, x]);
            } else {
                transformed.extend([x, y]);
            }
            transformed.extend_from_slice(&tuple[2..]);
        }

        Ok(transformed)
    }
}

/// Built-in [`CrsTransformerFactory`]; transformers are cached per source/target pair.
#[derive(Default)]
pub struct BuiltinCrsRegistry {
    cache: RwLock<HashMap<(EpsgCrs, EpsgCrs), Arc<dyn CrsTransformer>>>,
}

impl BuiltinCrsRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CrsTransformerFactory for BuiltinCrsRegistry {
    fn is_supported(&self, crs: &EpsgCrs) -> bool {
        Definition::lookup(crs).is_some()
    }

    fn is_3d(&self, crs: &EpsgCrs) -> bool {
        Definition::lookup(crs).is_some_and(|definition| definition.dimension == 3)
    }

    fn transformer(
        &self,
        source: &EpsgCrs,
        target: &EpsgCrs,
    ) -> Result<Option<Arc<dyn CrsTransformer>>> {
        if source == target {
            return Ok(None);
        }

        let key = (*source, *target);
        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Some(Arc::clone(cached)));
        }

        let transformer: Arc<dyn CrsTransformer> =
            Arc::new(BuiltinTransformer::new(*source, *target)?);
        debug!(
            source = %source,
            target = %target,
            swap = transformer.needs_coordinate_swap(),
            "created CRS transformer"
        );

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Some(Arc::clone(cache.entry(key).or_insert(transformer))))
    }
}
