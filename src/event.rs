//! The canonical feature event stream.
//!
//! Every decoder in this crate turns its input into the same sequence of [`FeatureEvent`]s and
//! hands them to a [`FeatureSink`]. A decode session is bracketed by `Start`/`End`, each feature
//! by `FeatureStart`/`FeatureEnd`, and every `ObjectStart`/`ArrayStart` is closed by exactly one
//! `ObjectEnd`/`ArrayEnd` in LIFO order. [`EventValidator`] checks these rules on the fly.
//!
//! Paths are sequences of property names. Array membership is not encoded in the path, so a
//! value inside `tags: ["a", "b"]` is reported twice under the path `["tags"]`.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of a scalar value as it was found in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    String,
    Integer,
    Float,
    Boolean,
    Unknown,
}

/// Simple feature geometry types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    GeometryCollection,
    Unknown,
}

impl GeometryType {
    /// Maps a GeoJSON `type` member. Anything unrecognised becomes [`GeometryType::Unknown`].
    #[must_use]
    pub fn from_geojson(name: &str) -> Self {
        match name {
            "Point" => GeometryType::Point,
            "MultiPoint" => GeometryType::MultiPoint,
            "LineString" => GeometryType::LineString,
            "MultiLineString" => GeometryType::MultiLineString,
            "Polygon" => GeometryType::Polygon,
            "MultiPolygon" => GeometryType::MultiPolygon,
            "GeometryCollection" => GeometryType::GeometryCollection,
            _ => GeometryType::Unknown,
        }
    }

    /// Maps a WKT geometry tag, case-insensitive.
    #[must_use]
    pub fn from_wkt(tag: &str) -> Self {
        match tag.to_ascii_uppercase().as_str() {
            "POINT" => GeometryType::Point,
            "MULTIPOINT" => GeometryType::MultiPoint,
            "LINESTRING" => GeometryType::LineString,
            "MULTILINESTRING" => GeometryType::MultiLineString,
            "POLYGON" => GeometryType::Polygon,
            "MULTIPOLYGON" => GeometryType::MultiPolygon,
            "GEOMETRYCOLLECTION" => GeometryType::GeometryCollection,
            _ => GeometryType::Unknown,
        }
    }

    /// Polygonal geometries keep at least 4 points per ring when simplified.
    #[must_use]
    pub fn is_polygonal(self) -> bool {
        matches!(self, GeometryType::Polygon | GeometryType::MultiPolygon)
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Attached to the `ObjectStart` of a geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryHeader {
    pub geometry_type: GeometryType,
    pub dimension: Option<usize>,
}

impl GeometryHeader {
    #[must_use]
    pub fn new(geometry_type: GeometryType) -> Self {
        Self {
            geometry_type,
            dimension: None,
        }
    }

    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureEvent {
    Start {
        number_returned: Option<u64>,
        number_matched: Option<u64>,
    },
    FeatureStart,
    ObjectStart {
        path: Vec<String>,
        geometry: Option<GeometryHeader>,
    },
    ArrayStart {
        path: Vec<String>,
    },
    Value {
        path: Vec<String>,
        value: String,
        value_type: ValueType,
    },
    ArrayEnd,
    ObjectEnd,
    FeatureEnd,
    End,
}

impl FeatureEvent {
    /// Hands this event to the matching sink method.
    ///
    /// # Errors
    ///
    /// Whatever the sink reports.
    pub fn replay(self, sink: &mut dyn FeatureSink) -> Result<()> {
        match self {
            FeatureEvent::Start {
                number_returned,
                number_matched,
            } => sink.on_start(number_returned, number_matched),
            FeatureEvent::FeatureStart => sink.on_feature_start(),
            FeatureEvent::ObjectStart { path, geometry } => sink.on_object_start(&path, geometry),
            FeatureEvent::ArrayStart { path } => sink.on_array_start(&path),
            FeatureEvent::Value {
                path,
                value,
                value_type,
            } => sink.on_value(&path, &value, value_type),
            FeatureEvent::ArrayEnd => sink.on_array_end(),
            FeatureEvent::ObjectEnd => sink.on_object_end(),
            FeatureEvent::FeatureEnd => sink.on_feature_end(),
            FeatureEvent::End => sink.on_end(),
        }
    }
}

/// Consumer of the canonical event stream.
///
/// Decoders call these in stream order. Only sinks know anything about the target format.
#[allow(clippy::missing_errors_doc)]
pub trait FeatureSink {
    fn on_start(&mut self, number_returned: Option<u64>, number_matched: Option<u64>)
        -> Result<()>;
    fn on_feature_start(&mut self) -> Result<()>;
    fn on_object_start(&mut self, path: &[String], geometry: Option<GeometryHeader>)
        -> Result<()>;
    fn on_array_start(&mut self, path: &[String]) -> Result<()>;
    fn on_value(&mut self, path: &[String], value: &str, value_type: ValueType) -> Result<()>;
    fn on_array_end(&mut self) -> Result<()>;
    fn on_object_end(&mut self) -> Result<()>;
    fn on_feature_end(&mut self) -> Result<()>;
    fn on_end(&mut self) -> Result<()>;
}

impl FeatureSink for Vec<FeatureEvent> {
    fn on_start(
        &mut self,
        number_returned: Option<u64>,
        number_matched: Option<u64>,
    ) -> Result<()> {
        self.push(FeatureEvent::Start {
            number_returned,
            number_matched,
        });
        Ok(())
    }

    fn on_feature_start(&mut self) -> Result<()> {
        self.push(FeatureEvent::FeatureStart);
        Ok(())
    }

    fn on_object_start(
        &mut self,
        path: &[String],
        geometry: Option<GeometryHeader>,
    ) -> Result<()> {
        self.push(FeatureEvent::ObjectStart {
            path: path.to_vec(),
            geometry,
        });
        Ok(())
    }

    fn on_array_start(&mut self, path: &[String]) -> Result<()> {
        self.push(FeatureEvent::ArrayStart {
            path: path.to_vec(),
        });
        Ok(())
    }

    fn on_value(&mut self, path: &[String], value: &str, value_type: ValueType) -> Result<()> {
        self.push(FeatureEvent::Value {
            path: path.to_vec(),
            value: value.to_string(),
            value_type,
        });
        Ok(())
    }

    fn on_array_end(&mut self) -> Result<()> {
        self.push(FeatureEvent::ArrayEnd);
        Ok(())
    }

    fn on_object_end(&mut self) -> Result<()> {
        self.push(FeatureEvent::ObjectEnd);
        Ok(())
    }

    fn on_feature_end(&mut self) -> Result<()> {
        self.push(FeatureEvent::FeatureEnd);
        Ok(())
    }

    fn on_end(&mut self) -> Result<()> {
        self.push(FeatureEvent::End);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nesting {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    InSession,
    InFeature,
    Closed,
}

/// Sink adapter that rejects event sequences breaking the stream contract before forwarding
/// them.
pub struct EventValidator<S> {
    inner: S,
    state: SessionState,
    nesting: Vec<Nesting>,
}

impl<S: FeatureSink> EventValidator<S> {
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            state: SessionState::Idle,
            nesting: Vec::new(),
        }
    }

    #[must_use]
    pub fn into_inner(self) -> S {
        self.inner
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    fn expect_state(&self, expected: SessionState, event: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::EventOrder(format!(
                "{event} not allowed in state {:?}",
                self.state
            )))
        }
    }

    fn pop(&mut self, expected: Nesting, event: &str) -> Result<()> {
        self.expect_state(SessionState::InFeature, event)?;
        match self.nesting.pop() {
            Some(found) if found == expected => Ok(()),
            found => Err(Error::EventOrder(format!(
                "{event} does not close {found:?}"
            ))),
        }
    }
}

impl<S: FeatureSink> FeatureSink for EventValidator<S> {
    fn on_start(
        &mut self,
        number_returned: Option<u64>,
        number_matched: Option<u64>,
    ) -> Result<()> {
        self.expect_state(SessionState::Idle, "Start")?;
        self.state = SessionState::InSession;
        self.inner.on_start(number_returned, number_matched)
    }

    fn on_feature_start(&mut self) -> Result<()> {
        self.expect_state(SessionState::InSession, "FeatureStart")?;
        self.state = SessionState::InFeature;
        self.inner.on_feature_start()
    }

    fn on_object_start(
        &mut self,
        path: &[String],
        geometry: Option<GeometryHeader>,
    ) -> Result<()> {
        self.expect_state(SessionState::InFeature, "ObjectStart")?;
        self.nesting.push(Nesting::Object);
        self.inner.on_object_start(path, geometry)
    }

    fn on_array_start(&mut self, path: &[String]) -> Result<()> {
        self.expect_state(SessionState::InFeature, "ArrayStart")?;
        self.nesting.push(Nesting::Array);
        self.inner.on_array_start(path)
    }

    fn on_value(&mut self, path: &[String], value: &str, value_type: ValueType) -> Result<()> {
        self.expect_state(SessionState::InFeature, "Value")?;
        self.inner.on_value(path, value, value_type)
    }

    fn on_array_end(&mut self) -> Result<()> {
        self.pop(Nesting::Array, "ArrayEnd")?;
        self.inner.on_array_end()
    }

    fn on_object_end(&mut self) -> Result<()> {
        self.pop(Nesting::Object, "ObjectEnd")?;
        self.inner.on_object_end()
    }

    fn on_feature_end(&mut self) -> Result<()> {
        self.expect_state(SessionState::InFeature, "FeatureEnd")?;
        if !self.nesting.is_empty() {
            return Err(Error::EventOrder(format!(
                "FeatureEnd with {} unclosed objects/arrays",
                self.nesting.len()
            )));
        }
        self.state = SessionState::InSession;
        self.inner.on_feature_end()
    }

    fn on_end(&mut self) -> Result<()> {
        self.expect_state(SessionState::InSession, "End")?;
        self.state = SessionState::Closed;
        self.inner.on_end()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_validator_accepts_well_nested_stream() -> Result<()> {
        let mut validator = EventValidator::new(Vec::<FeatureEvent>::new());

        validator.on_start(Some(1), None)?;
        validator.on_feature_start()?;
        validator.on_object_start(&path(&["geometry"]), Some(GeometryHeader::new(GeometryType::Point)))?;
        validator.on_array_start(&path(&["geometry"]))?;
        validator.on_value(&path(&["geometry"]), "1", ValueType::Integer)?;
        validator.on_array_end()?;
        validator.on_object_end()?;
        validator.on_feature_end()?;
        validator.on_end()?;

        assert!(validator.is_closed());
        assert_eq!(validator.into_inner().len(), 9);
        Ok(())
    }

    #[test]
    fn test_validator_rejects_crossed_nesting() {
        let mut validator = EventValidator::new(Vec::<FeatureEvent>::new());

        validator.on_start(None, None).unwrap();
        validator.on_feature_start().unwrap();
        validator.on_object_start(&path(&["a"]), None).unwrap();
        validator.on_array_start(&path(&["a", "b"])).unwrap();

        assert!(matches!(
            validator.on_object_end(),
            Err(Error::EventOrder(_))
        ));
    }

    #[test]
    fn test_validator_rejects_feature_before_start() {
        let mut validator = EventValidator::new(Vec::<FeatureEvent>::new());

        assert!(validator.on_feature_start().is_err());
    }

    #[test]
    fn test_replay_round_trips_through_sink() -> Result<()> {
        let events = vec![
            FeatureEvent::Start {
                number_returned: None,
                number_matched: Some(3),
            },
            FeatureEvent::FeatureStart,
            FeatureEvent::Value {
                path: path(&["id"]),
                value: "7".to_string(),
                value_type: ValueType::Integer,
            },
            FeatureEvent::FeatureEnd,
            FeatureEvent::End,
        ];

        let mut sink = EventValidator::new(Vec::<FeatureEvent>::new());
        for event in events.clone() {
            event.replay(&mut sink)?;
        }

        assert_eq!(sink.into_inner(), events);
        Ok(())
    }

    #[test]
    fn test_geometry_type_mapping() {
        assert_eq!(GeometryType::from_geojson("MultiPolygon"), GeometryType::MultiPolygon);
        assert_eq!(GeometryType::from_geojson("Curve"), GeometryType::Unknown);
        assert_eq!(GeometryType::from_wkt("linestring"), GeometryType::LineString);
        assert!(GeometryType::Polygon.is_polygonal());
        assert!(!GeometryType::LineString.is_polygonal());
    }
}
