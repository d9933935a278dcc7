//! Collects features from any geozero processor pipeline into serde types.
//!
//! [`FeatureCollector`] is a geozero [`FeatureProcessor`]. Fed directly by a geozero datasource or
//! through a [`crate::geozero_sink::GeozeroSink`] by one of the decoders, it builds a
//! [`geo::Geometry`] and a JSON property map per feature and deserializes both into `T`.
//!
//! ```rust
//! use featurestream::{
//!     collector::{CollectedFeature, FeatureCollector},
//!     config::DecoderOptions,
//!     decoder::{decode_all, GeoJsonDecoder},
//!     geozero_sink::GeozeroSink,
//! };
//!
//! let geojson = br#"{"type":"Feature","geometry":{"type":"Point","coordinates":[102.0,0.5]},
//!     "properties":{"name":"Test Point","value":42}}"#;
//!
//! let mut sink = GeozeroSink::new(FeatureCollector::<CollectedFeature>::new());
//! let mut decoder = GeoJsonDecoder::new(DecoderOptions::default());
//! decode_all(&mut decoder, [&geojson[..]], &mut sink).unwrap();
//!
//! let features = sink.into_inner().features;
//! assert_eq!(features[0].properties["name"], "Test Point");
//! assert_eq!(features[0].properties["value"], 42);
//! ```
use std::{collections::HashMap, marker::PhantomData};

use geo::Geometry;
use geozero::{
    error::GeozeroError, geo_types::GeoWriter, ColumnValue, CoordDimensions, FeatureProcessor,
    GeomProcessor, PropertyProcessor,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{error::Error, value::column_to_json};

/// The untyped form of a collected feature; properties are flattened next to the geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedFeature {
    pub geometry: Option<Geometry>,
    #[serde(flatten)]
    pub properties: HashMap<String, Value>,
}

impl<'de> serde::de::Deserializer<'de> for CollectedFeature {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: serde::de::Visitor<'de>,
    {
        let value = serde_json::to_value(&self)?;
        Ok(value.deserialize_any(visitor)?)
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

pub struct FeatureCollector<T> {
    pub features: Vec<T>,

    geometry: GeoWriter,
    properties: HashMap<String, Value>,
    _target: PhantomData<T>,
}

impl<T: DeserializeOwned> FeatureCollector<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            features: Vec::new(),
            geometry: GeoWriter::new(),
            properties: HashMap::new(),
            _target: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Default for FeatureCollector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> PropertyProcessor for FeatureCollector<T> {
    fn property(
        &mut self,
        _idx: usize,
        name: &str,
        value: &ColumnValue,
    ) -> geozero::error::Result<bool> {
        let value = column_to_json(value).map_err(|err| GeozeroError::Property(err.to_string()))?;
        self.properties.insert(name.to_string(), value);
        Ok(false)
    }
}

macro_rules! delegate_to_geometry {
    ($($name:ident($($arg:ident: $ty:ty),*);)*) => {
        $(
            fn $name(&mut self, $($arg: $ty),*) -> geozero::error::Result<()> {
                self.geometry.$name($($arg),*)
            }
        )*
    };
}

impl<T: DeserializeOwned> GeomProcessor for FeatureCollector<T> {
    fn dimensions(&self) -> CoordDimensions {
        self.geometry.dimensions()
    }

    fn multi_dim(&self) -> bool {
        self.geometry.multi_dim()
    }

    #[allow(clippy::many_single_char_names)]
    fn coordinate(
        &mut self,
        x: f64,
        y: f64,
        z: Option<f64>,
        m: Option<f64>,
        t: Option<f64>,
        tm: Option<u64>,
        idx: usize,
    ) -> geozero::error::Result<()> {
        self.geometry.coordinate(x, y, z, m, t, tm, idx)
    }

    delegate_to_geometry! {
        srid(srid: Option<i32>);
        xy(x: f64, y: f64, idx: usize);
        empty_point(idx: usize);
        point_begin(idx: usize);
        point_end(idx: usize);
        multipoint_begin(size: usize, idx: usize);
        multipoint_end(idx: usize);
        linestring_begin(tagged: bool, size: usize, idx: usize);
        linestring_end(tagged: bool, idx: usize);
        multilinestring_begin(size: usize, idx: usize);
        multilinestring_end(idx: usize);
        polygon_begin(tagged: bool, size: usize, idx: usize);
        polygon_end(tagged: bool, idx: usize);
        multipolygon_begin(size: usize, idx: usize);
        multipolygon_end(idx: usize);
        geometrycollection_begin(size: usize, idx: usize);
        geometrycollection_end(idx: usize);
    }
}

impl<T: DeserializeOwned> FeatureProcessor for FeatureCollector<T> {
    fn feature_begin(&mut self, _idx: u64) -> geozero::error::Result<()> {
        self.geometry = GeoWriter::new();
        self.properties.clear();
        Ok(())
    }

    fn feature_end(&mut self, _idx: u64) -> geozero::error::Result<()> {
        let feature = CollectedFeature {
            geometry: self.geometry.take_geometry(),
            properties: std::mem::take(&mut self.properties),
        };
        self.features.push(T::deserialize(feature)?);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;
    use geo::Geometry;
    use geozero::GeozeroDatasource;
    use serde_json::json;

    use super::*;

    const GEOJSON: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [102.0, 0.5]},
                "properties": {"name": "Test Point", "value": 42}
            },
            {
                "type": "Feature",
                "geometry": null,
                "properties": {"name": "No Geometry", "value": 43}
            }
        ]
    }"#;

    #[test]
    fn test_from_geozero_reader() -> geozero::error::Result<()> {
        let mut collector = FeatureCollector::<CollectedFeature>::new();
        geozero::geojson::GeoJsonReader(GEOJSON.as_bytes()).process(&mut collector)?;

        assert_eq!(collector.features.len(), 2);

        let feature = &collector.features[0];
        match &feature.geometry {
            Some(Geometry::Point(point)) => {
                assert_relative_eq!(point.x(), 102.0);
                assert_relative_eq!(point.y(), 0.5);
            }
            other => panic!("Expected Point geometry, got {other:?}"),
        }
        assert_eq!(feature.properties["name"], json!("Test Point"));
        assert_eq!(feature.properties["value"], json!(42));

        let feature = &collector.features[1];
        assert_eq!(feature.geometry, None);
        assert_eq!(feature.properties["value"], json!(43));
        Ok(())
    }

    #[test]
    fn test_typed_features() -> geozero::error::Result<()> {
        #[derive(Debug, Deserialize)]
        struct Place {
            name: String,
            value: u32,
        }

        let mut collector = FeatureCollector::<Place>::new();
        geozero::geojson::GeoJsonReader(GEOJSON.as_bytes()).process(&mut collector)?;

        assert_eq!(collector.features[1].name, "No Geometry");
        assert_eq!(collector.features[1].value, 43);
        Ok(())
    }
}
