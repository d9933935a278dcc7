//! GeoJSON geometry objects as feature events.
//!
//! Coordinates are flattened: the innermost coordinate list of a geometry becomes one array
//! holding all numbers of its positions, e.g. a polygon is reported as
//! `ObjectStart, ArrayStart, ArrayStart, x, y, x, y, ArrayEnd, ArrayEnd, ObjectEnd`. Because
//! GeoJSON position arrays carry no names, opening and closing brackets are counted and only
//! emitted once a number or a closing bracket shows how deep they are.
//!
//! The `ObjectStart` of a geometry carries its type and dimension, which may only be known after
//! the coordinates were read. Events of a geometry are therefore buffered until both are known.
use tracing::warn;

use super::json_scalar;
use crate::{
    error::{Error, Result},
    event::{FeatureEvent, FeatureSink, GeometryHeader, GeometryType, ValueType},
    tokenizer::json::{JsonToken, TokenKind},
};

#[derive(Debug)]
struct PendingGeometry {
    geometry_type: Option<GeometryType>,
    dimension: Option<usize>,
    dimension_known: bool,
    values_seen: usize,
    pending_starts: usize,
    pending_ends: usize,
    coordinates_depth: usize,
    in_geometries: bool,
    skip_depth: usize,
    /// `None` once the `ObjectStart` was emitted.
    buffer: Option<Vec<FeatureEvent>>,
}

impl PendingGeometry {
    fn new() -> Self {
        Self {
            geometry_type: None,
            dimension: None,
            dimension_known: false,
            values_seen: 0,
            pending_starts: 0,
            pending_ends: 0,
            coordinates_depth: 0,
            in_geometries: false,
            skip_depth: 0,
            buffer: Some(Vec::new()),
        }
    }

    fn is_ready(&self) -> bool {
        match self.geometry_type {
            Some(GeometryType::GeometryCollection) => true,
            Some(_) => self.dimension_known,
            None => false,
        }
    }

    fn resolve_dimension(&mut self) {
        if !self.dimension_known {
            self.dimension_known = true;
            self.dimension = (self.values_seen > 0).then_some(self.values_seen);
        }
    }

    fn header(&self) -> GeometryHeader {
        GeometryHeader {
            geometry_type: self.geometry_type.unwrap_or(GeometryType::Unknown),
            dimension: self.dimension,
        }
    }
}

/// Reads one GeoJSON geometry object, including nested collection members.
#[derive(Debug)]
pub(crate) struct GeometryReader {
    path: Vec<String>,
    levels: Vec<PendingGeometry>,
}

impl GeometryReader {
    /// Starts after the opening brace of the geometry object at `path`.
    pub(crate) fn new(path: Vec<String>) -> Self {
        Self {
            path,
            levels: vec![PendingGeometry::new()],
        }
    }

    pub(crate) fn current_path(&self) -> String {
        self.path.join(".")
    }

    /// Routes an event produced at `level` to the first enclosing geometry that still buffers,
    /// or to the sink.
    fn emit(&mut self, level: usize, event: FeatureEvent, sink: &mut dyn FeatureSink) -> Result<()> {
        for pending in self.levels[..=level].iter_mut().rev() {
            if let Some(buffer) = pending.buffer.as_mut() {
                buffer.push(event);
                return Ok(());
            }
        }
        event.replay(sink)
    }

    fn emit_repeated(
        &mut self,
        level: usize,
        count: usize,
        event: &FeatureEvent,
        sink: &mut dyn FeatureSink,
    ) -> Result<()> {
        for _ in 0..count {
            self.emit(level, event.clone(), sink)?;
        }
        Ok(())
    }

    /// Emits the `ObjectStart` and buffered events of `level` once its header is known.
    fn flush_if_ready(&mut self, level: usize, sink: &mut dyn FeatureSink) -> Result<()> {
        let pending = &mut self.levels[level];
        if pending.buffer.is_none() || !pending.is_ready() {
            return Ok(());
        }
        let header = pending.header();
        let buffered = pending.buffer.take().unwrap_or_default();

        let start = FeatureEvent::ObjectStart {
            path: self.path.clone(),
            geometry: Some(header),
        };
        self.emit_to_parent(level, start, sink)?;
        for event in buffered {
            self.emit_to_parent(level, event, sink)?;
        }
        Ok(())
    }

    fn emit_to_parent(
        &mut self,
        level: usize,
        event: FeatureEvent,
        sink: &mut dyn FeatureSink,
    ) -> Result<()> {
        match level.checked_sub(1) {
            Some(parent) => self.emit(parent, event, sink),
            None => event.replay(sink),
        }
    }

    fn close(&mut self, sink: &mut dyn FeatureSink) -> Result<bool> {
        let level = self.levels.len() - 1;
        let pending = &mut self.levels[level];
        if pending.geometry_type.is_none() {
            warn!(path = %self.path.join("."), "geometry without type");
            pending.geometry_type = Some(GeometryType::Unknown);
        }
        pending.resolve_dimension();
        self.flush_if_ready(level, sink)?;
        self.emit_to_parent(level, FeatureEvent::ObjectEnd, sink)?;
        self.levels.pop();
        Ok(self.levels.is_empty())
    }

    /// Handles one token. Returns `true` once the geometry object is closed.
    pub(crate) fn token(&mut self, token: JsonToken, sink: &mut dyn FeatureSink) -> Result<bool> {
        let Some(level) = self.levels.len().checked_sub(1) else {
            return Err(Error::parse("geometry already closed", self.current_path(), 0));
        };
        let JsonToken { name, kind } = token;
        let pending = &mut self.levels[level];

        if pending.skip_depth > 0 {
            match kind {
                TokenKind::StartObject | TokenKind::StartArray => pending.skip_depth += 1,
                TokenKind::EndObject | TokenKind::EndArray => pending.skip_depth -= 1,
                _ => {}
            }
            return Ok(false);
        }

        if pending.coordinates_depth > 0 {
            self.coordinates_token(level, kind, sink)?;
            return Ok(false);
        }

        if pending.in_geometries {
            match kind {
                TokenKind::StartObject => self.levels.push(PendingGeometry::new()),
                TokenKind::StartArray => pending.skip_depth = 1,
                TokenKind::EndArray => {
                    pending.in_geometries = false;
                    self.emit(level, FeatureEvent::ArrayEnd, sink)?;
                }
                _ => {}
            }
            return Ok(false);
        }

        match (name.as_deref(), kind) {
            (Some("type"), TokenKind::String(type_name)) => {
                let geometry_type = GeometryType::from_geojson(&type_name);
                if geometry_type == GeometryType::Unknown {
                    warn!(path = %self.path.join("."), type_name = %type_name, "unsupported geometry type");
                }
                pending.geometry_type = Some(geometry_type);
                self.flush_if_ready(level, sink)?;
            }
            (Some("coordinates"), TokenKind::StartArray) => {
                pending.coordinates_depth = 1;
                let start = FeatureEvent::ArrayStart {
                    path: self.path.clone(),
                };
                self.emit(level, start, sink)?;
            }
            (Some("geometries"), TokenKind::StartArray) => {
                pending.in_geometries = true;
                let start = FeatureEvent::ArrayStart {
                    path: self.path.clone(),
                };
                self.emit(level, start, sink)?;
            }
            (_, TokenKind::StartObject | TokenKind::StartArray) => pending.skip_depth = 1,
            (_, TokenKind::EndObject) => return self.close(sink),
            _ => {}
        }
        Ok(false)
    }

    fn coordinates_token(
        &mut self,
        level: usize,
        kind: TokenKind,
        sink: &mut dyn FeatureSink,
    ) -> Result<()> {
        let path = self.path.clone();
        let pending = &mut self.levels[level];

        match kind {
            TokenKind::StartArray => {
                pending.coordinates_depth += 1;
                let ends = std::mem::take(&mut pending.pending_ends);
                pending.pending_starts += 1;
                self.emit_repeated(level, ends.saturating_sub(1), &FeatureEvent::ArrayEnd, sink)
            }
            TokenKind::EndArray => {
                pending.coordinates_depth -= 1;
                pending.resolve_dimension();
                if pending.coordinates_depth == 0 {
                    let ends = std::mem::take(&mut pending.pending_ends);
                    pending.pending_starts = 0;
                    self.emit_repeated(level, ends.saturating_sub(1), &FeatureEvent::ArrayEnd, sink)?;
                    self.emit(level, FeatureEvent::ArrayEnd, sink)?;
                    return self.flush_if_ready(level, sink);
                }
                if pending.pending_starts > 0 {
                    pending.pending_starts -= 1;
                } else {
                    pending.pending_ends += 1;
                }
                self.flush_if_ready(level, sink)
            }
            kind => {
                let Some((value, value_type)) = json_scalar(kind) else {
                    return Err(Error::parse(
                        "expected a number in coordinates",
                        path.join("."),
                        0,
                    ));
                };
                if !matches!(value_type, ValueType::Integer | ValueType::Float) {
                    return Err(Error::parse(
                        format!("expected a number in coordinates, found '{value}'"),
                        path.join("."),
                        0,
                    ));
                }
                if !pending.dimension_known {
                    pending.values_seen += 1;
                }
                let starts = std::mem::take(&mut pending.pending_starts);
                let start = FeatureEvent::ArrayStart { path: path.clone() };
                self.emit_repeated(level, starts.saturating_sub(1), &start, sink)?;
                self.emit(
                    level,
                    FeatureEvent::Value {
                        path,
                        value,
                        value_type,
                    },
                    sink,
                )
            }
        }
    }
}
