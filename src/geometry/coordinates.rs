use geo::{coord, Coord, Rect};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    geometry::crs::{CrsTransformer, EpsgCrs},
};

/// A single 2D or 3D position, optionally tagged with its reference system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateTuple {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    pub crs: Option<EpsgCrs>,
}

impl CoordinateTuple {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            crs: None,
        }
    }

    #[must_use]
    pub fn new_3d(x: f64, y: f64, z: f64) -> Self {
        Self {
            z: Some(z),
            ..Self::new(x, y)
        }
    }

    #[must_use]
    pub fn with_crs(mut self, crs: EpsgCrs) -> Self {
        self.crs = Some(crs);
        self
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        if self.z.is_some() {
            3
        } else {
            2
        }
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        let mut values = vec![self.x, self.y];
        values.extend(self.z);
        values
    }

    /// Builds a tuple from 2 or 3 values.
    ///
    /// # Errors
    ///
    /// [`Error::Dimension`] for any other number of values.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        match *values {
            [x, y] => Ok(Self::new(x, y)),
            [x, y, z] => Ok(Self::new_3d(x, y, z)),
            _ => Err(Error::Dimension {
                expected: 2,
                found: values.len(),
            }),
        }
    }
}

impl From<Coord<f64>> for CoordinateTuple {
    fn from(coord: Coord<f64>) -> Self {
        Self::new(coord.x, coord.y)
    }
}

impl From<CoordinateTuple> for Coord<f64> {
    fn from(tuple: CoordinateTuple) -> Self {
        coord! { x: tuple.x, y: tuple.y }
    }
}

/// Number of segments each edge is split into when a box is transformed.
const DENSIFY_SEGMENTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zmin: Option<f64>,
    pub xmax: f64,
    pub ymax: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zmax: Option<f64>,
    #[serde(default)]
    pub crs: EpsgCrs,
}

impl BoundingBox {
    #[must_use]
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64, crs: EpsgCrs) -> Self {
        Self {
            xmin,
            ymin,
            zmin: None,
            xmax,
            ymax,
            zmax: None,
            crs,
        }
    }

    #[must_use]
    pub fn new_3d(min: [f64; 3], max: [f64; 3], crs: EpsgCrs) -> Self {
        Self {
            zmin: Some(min[2]),
            zmax: Some(max[2]),
            ..Self::new(min[0], min[1], max[0], max[1], crs)
        }
    }

    /// Parses `xmin,ymin,xmax,ymax` or `xmin,ymin,zmin,xmax,ymax,zmax`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCoordinates`] if a value is not a number or the count is not 4 or 6.
    pub fn parse(value: &str, crs: EpsgCrs) -> Result<Self> {
        let numbers = value
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<f64>()
                    .map_err(|err| Error::coordinates(value, err.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        match *numbers {
            [xmin, ymin, xmax, ymax] => Ok(Self::new(xmin, ymin, xmax, ymax, crs)),
            [xmin, ymin, zmin, xmax, ymax, zmax] => {
                Ok(Self::new_3d([xmin, ymin, zmin], [xmax, ymax, zmax], crs))
            }
            _ => Err(Error::coordinates(value, "expected 4 or 6 numbers")),
        }
    }

    #[must_use]
    pub fn is_3d(&self) -> bool {
        self.zmin.is_some() && self.zmax.is_some()
    }

    #[must_use]
    pub fn to_array(&self) -> Vec<f64> {
        match (self.zmin, self.zmax) {
            (Some(zmin), Some(zmax)) => {
                vec![self.xmin, self.ymin, zmin, self.xmax, self.ymax, zmax]
            }
            _ => vec![self.xmin, self.ymin, self.xmax, self.ymax],
        }
    }

    #[must_use]
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.xmin, y: self.ymin },
            coord! { x: self.xmax, y: self.ymax },
        )
    }

    /// Smallest box containing both. Boxes in different systems are not merged, `self` is
    /// returned unchanged.
    #[must_use]
    pub fn merge(&self, other: &BoundingBox) -> BoundingBox {
        if self.crs != other.crs {
            return *self;
        }
        let both_3d = self.is_3d() && other.is_3d();
        BoundingBox {
            xmin: self.xmin.min(other.xmin),
            ymin: self.ymin.min(other.ymin),
            zmin: both_3d
                .then(|| self.zmin.zip(other.zmin).map(|(a, b)| a.min(b)))
                .flatten(),
            xmax: self.xmax.max(other.xmax),
            ymax: self.ymax.max(other.ymax),
            zmax: both_3d
                .then(|| self.zmax.zip(other.zmax).map(|(a, b)| a.max(b)))
                .flatten(),
            crs: self.crs,
        }
    }

    #[must_use]
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        let vertical = match (self.zmin, self.zmax, other.zmin, other.zmax) {
            (Some(zmin), Some(zmax), Some(other_zmin), Some(other_zmax)) => {
                zmin.max(other_zmin) <= zmax.min(other_zmax)
            }
            _ => true,
        };
        self.crs == other.crs
            && self.xmin.max(other.xmin) <= self.xmax.min(other.xmax)
            && self.ymin.max(other.ymin) <= self.ymax.min(other.ymax)
            && vertical
    }

    /// 2D intersection with `other` grown by `buffer`. `None` if they do not overlap; boxes in
    /// different systems are not intersected, `self` is returned.
    #[must_use]
    pub fn intersect_2d(&self, other: &BoundingBox, buffer: f64) -> Option<BoundingBox> {
        if self.crs != other.crs {
            return Some(*self);
        }
        let intersection = BoundingBox::new(
            self.xmin.max(other.xmin - buffer),
            self.ymin.max(other.ymin - buffer),
            self.xmax.min(other.xmax + buffer),
            self.ymax.min(other.ymax + buffer),
            self.crs,
        );
        (intersection.xmin <= intersection.xmax && intersection.ymin <= intersection.ymax)
            .then_some(intersection)
    }

    /// Transforms the box by densifying its edges and taking the extent of the transformed
    /// points. Heights are kept.
    ///
    /// # Errors
    ///
    /// Whatever the transformer reports.
    #[allow(clippy::cast_precision_loss)]
    pub fn transform(&self, transformer: &dyn CrsTransformer) -> Result<BoundingBox> {
        let mut ring = Vec::with_capacity(DENSIFY_SEGMENTS * 8);
        for step in 0..DENSIFY_SEGMENTS {
            let fraction = step as f64 / DENSIFY_SEGMENTS as f64;
            let x = self.xmin + (self.xmax - self.xmin) * fraction;
            let y = self.ymin + (self.ymax - self.ymin) * fraction;
            ring.extend([x, self.ymin, self.xmax, y]);
            let x = self.xmax - (self.xmax - self.xmin) * fraction;
            let y = self.ymax - (self.ymax - self.ymin) * fraction;
            ring.extend([x, self.ymax, self.xmin, y]);
        }

        let transformed = transformer.transform(&ring, 2, transformer.needs_coordinate_swap())?;
        let mut bbox = BoundingBox {
            xmin: f64::INFINITY,
            ymin: f64::INFINITY,
            zmin: self.zmin,
            xmax: f64::NEG_INFINITY,
            ymax: f64::NEG_INFINITY,
            zmax: self.zmax,
            crs: transformer.target_crs(),
        };
        for point in transformed.chunks_exact(2) {
            bbox.xmin = bbox.xmin.min(point[0]);
            bbox.ymin = bbox.ymin.min(point[1]);
            bbox.xmax = bbox.xmax.max(point[0]);
            bbox.ymax = bbox.ymax.max(point[1]);
        }
        Ok(bbox)
    }
}
