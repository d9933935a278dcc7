//! Applies a coordinate chain to the geometries of an event stream.
use std::sync::Arc;

use tracing::trace;

use crate::{
    error::{Error, Result},
    event::{FeatureSink, GeometryHeader, GeometryType, ValueType},
    geometry::{
        chain::{CoordinatesTransformer, RunContext},
        writer::FeatureTokenWriter,
    },
};

#[derive(Debug, Clone, Copy)]
struct Level {
    geometry_type: GeometryType,
    dimension: usize,
    passthrough: bool,
}

/// A [`FeatureSink`] adapter that sends every coordinate run of a geometry through a
/// [`CoordinatesTransformer`] before it reaches `inner`.
///
/// Array starts inside a geometry are held back until it is known whether they open a run or a
/// nesting level; a run is collected completely, transformed and re-emitted by a
/// [`FeatureTokenWriter`]. All other events pass through unchanged, as do the geometries of
/// type `Unknown` and everything when the chain is the identity.
#[derive(Debug)]
pub struct CoordinateTransformingSink<S> {
    inner: S,
    chain: Arc<CoordinatesTransformer>,
    levels: Vec<Level>,
    pending: Vec<Vec<String>>,
    run: Option<(Vec<String>, Vec<f64>)>,
}

impl<S: FeatureSink> CoordinateTransformingSink<S> {
    #[must_use]
    pub fn new(inner: S, chain: Arc<CoordinatesTransformer>) -> Self {
        Self {
            inner,
            chain,
            levels: Vec::new(),
            pending: Vec::new(),
            run: None,
        }
    }

    #[must_use]
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn transforming(&self) -> Option<Level> {
        self.levels.last().copied().filter(|level| !level.passthrough)
    }

    fn flush_pending(&mut self) -> Result<()> {
        for path in self.pending.drain(..) {
            self.inner.on_array_start(&path)?;
        }
        Ok(())
    }

    fn write_run(&mut self, level: Level, path: &[String], coordinates: Vec<f64>) -> Result<()> {
        trace!(
            geometry_type = %level.geometry_type,
            values = coordinates.len(),
            "transforming coordinate run"
        );
        let mut writer = FeatureTokenWriter::new(&mut self.inner, path, self.chain.formatter());
        self.chain.write(
            coordinates,
            level.dimension,
            &RunContext::new(level.geometry_type),
            &mut writer,
        )
    }
}

impl<S: FeatureSink> FeatureSink for CoordinateTransformingSink<S> {
    fn on_start(
        &mut self,
        number_returned: Option<u64>,
        number_matched: Option<u64>,
    ) -> Result<()> {
        self.inner.on_start(number_returned, number_matched)
    }

    fn on_feature_start(&mut self) -> Result<()> {
        self.inner.on_feature_start()
    }

    fn on_object_start(
        &mut self,
        path: &[String],
        geometry: Option<GeometryHeader>,
    ) -> Result<()> {
        if let Some(header) = geometry {
            self.flush_pending()?;
            self.levels.push(Level {
                geometry_type: header.geometry_type,
                dimension: header.dimension.unwrap_or(2),
                passthrough: self.chain.is_identity()
                    || header.geometry_type == GeometryType::Unknown,
            });
        } else if let Some(level) = self.levels.last().copied() {
            self.flush_pending()?;
            self.levels.push(level);
        }
        self.inner.on_object_start(path, geometry)
    }

    fn on_array_start(&mut self, path: &[String]) -> Result<()> {
        if self.transforming().is_some() {
            self.pending.push(path.to_vec());
            return Ok(());
        }
        self.inner.on_array_start(path)
    }

    fn on_value(&mut self, path: &[String], value: &str, value_type: ValueType) -> Result<()> {
        if self.transforming().is_none() {
            return self.inner.on_value(path, value, value_type);
        }

        if self.run.is_none() {
            let Some(run_path) = self.pending.pop() else {
                return self.inner.on_value(path, value, value_type);
            };
            self.flush_pending()?;
            self.run = Some((run_path, Vec::new()));
        }

        let number = value
            .parse::<f64>()
            .map_err(|err| Error::coordinates(value, err.to_string()))?;
        if let Some((_, coordinates)) = self.run.as_mut() {
            coordinates.push(number);
        }
        Ok(())
    }

    fn on_array_end(&mut self) -> Result<()> {
        let Some(level) = self.transforming() else {
            return self.inner.on_array_end();
        };

        if let Some((path, coordinates)) = self.run.take() {
            return self.write_run(level, &path, coordinates);
        }
        self.flush_pending()?;
        self.inner.on_array_end()
    }

    fn on_object_end(&mut self) -> Result<()> {
        if self.levels.pop().is_some() {
            self.flush_pending()?;
        }
        self.inner.on_object_end()
    }

    fn on_feature_end(&mut self) -> Result<()> {
        self.inner.on_feature_end()
    }

    fn on_end(&mut self) -> Result<()> {
        self.inner.on_end()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        config::ChainConfig,
        event::FeatureEvent,
        geometry::{crs::EpsgCrs, registry::BuiltinCrsRegistry},
    };

    fn path() -> Vec<String> {
        vec!["geometry".to_string()]
    }

    fn run(values: &[&str]) -> Vec<FeatureEvent> {
        let mut events = vec![FeatureEvent::ArrayStart { path: path() }];
        events.extend(values.iter().map(|value| FeatureEvent::Value {
            path: path(),
            value: (*value).to_string(),
            value_type: if value.contains('.') {
                ValueType::Float
            } else {
                ValueType::Integer
            },
        }));
        events.push(FeatureEvent::ArrayEnd);
        events
    }

    fn geometry(geometry_type: GeometryType, body: Vec<FeatureEvent>) -> Vec<FeatureEvent> {
        let mut events = vec![FeatureEvent::ObjectStart {
            path: path(),
            geometry: Some(GeometryHeader::new(geometry_type).with_dimension(2)),
        }];
        events.extend(body);
        events.push(FeatureEvent::ObjectEnd);
        events
    }

    fn transform(config: &ChainConfig, events: Vec<FeatureEvent>) -> Result<Vec<FeatureEvent>> {
        let chain = CoordinatesTransformer::build(config, &BuiltinCrsRegistry::new())?;
        let mut sink =
            CoordinateTransformingSink::new(Vec::<FeatureEvent>::new(), Arc::new(chain));
        for event in events {
            event.replay(&mut sink)?;
        }
        Ok(sink.into_inner())
    }

    #[test]
    fn test_identity_passes_through() -> Result<()> {
        let events = geometry(GeometryType::Point, run(&["7.123456", "50"]));

        assert_eq!(transform(&ChainConfig::default(), events.clone())?, events);
        Ok(())
    }

    #[test]
    fn test_runs_are_reprojected_and_rounded() -> Result<()> {
        let mut config = ChainConfig::new(EpsgCrs::CRS84, EpsgCrs::new(3857));
        config.output_precision = 2;
        let events = geometry(GeometryType::Point, run(&["180", "0"]));

        assert_eq!(
            transform(&config, events)?,
            geometry(GeometryType::Point, run(&["20037508.34", "0"]))
        );
        Ok(())
    }

    #[test]
    fn test_polygon_rings_keep_nesting() -> Result<()> {
        let config = ChainConfig {
            swap_axes: true,
            ..ChainConfig::default()
        };
        let mut body = vec![FeatureEvent::ArrayStart { path: path() }];
        body.extend(run(&["0", "1", "2", "3", "4", "5", "0", "1"]));
        body.extend(run(&[]));
        body.push(FeatureEvent::ArrayEnd);

        let mut expected = vec![FeatureEvent::ArrayStart { path: path() }];
        expected.extend(run(&["1", "0", "3", "2", "5", "4", "1", "0"]));
        expected.extend(run(&[]));
        expected.push(FeatureEvent::ArrayEnd);

        assert_eq!(
            transform(&config, geometry(GeometryType::Polygon, body))?,
            geometry(GeometryType::Polygon, expected)
        );
        Ok(())
    }

    #[test]
    fn test_unknown_geometry_untouched() -> Result<()> {
        let config = ChainConfig {
            swap_axes: true,
            ..ChainConfig::default()
        };
        let events = geometry(GeometryType::Unknown, run(&["1", "2"]));

        assert_eq!(transform(&config, events.clone())?, events);
        Ok(())
    }

    #[test]
    fn test_properties_untouched() -> Result<()> {
        let config = ChainConfig {
            swap_axes: true,
            ..ChainConfig::default()
        };
        let events = vec![
            FeatureEvent::ArrayStart {
                path: vec!["tags".to_string()],
            },
            FeatureEvent::Value {
                path: vec!["tags".to_string()],
                value: "1".to_string(),
                value_type: ValueType::Integer,
            },
            FeatureEvent::ArrayEnd,
        ];

        assert_eq!(transform(&config, events.clone())?, events);
        Ok(())
    }

    #[test]
    fn test_non_numeric_coordinate() {
        let config = ChainConfig {
            swap_axes: true,
            ..ChainConfig::default()
        };
        let result = transform(&config, geometry(GeometryType::Point, run(&["x", "1"])));

        assert!(matches!(result, Err(Error::InvalidCoordinates { .. })));
    }
}
