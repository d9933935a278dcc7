//! Incremental GeoJSON decoder.
//!
//! Accepts a `FeatureCollection`, a single `Feature` or a bare geometry. `numberReturned` and
//! `numberMatched` are only reported if they precede the first feature: `Start` is emitted as
//! soon as the `features` array or a single feature begins, later values are ignored.
use tracing::debug;

use super::{
    json_geometry::GeometryReader, json_null, json_properties::PropertiesReader, json_scalar,
    with_path, DecodeStatus, FeatureDecoder,
};
use crate::{
    config::DecoderOptions,
    error::{Error, Result},
    event::{FeatureSink, GeometryType},
    tokenizer::{
        json::{JsonToken, JsonTokenizer, TokenKind},
        Next,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Root,
    Features,
    Feature,
    Skip,
}

#[derive(Debug)]
enum Delegate {
    Properties(PropertiesReader),
    Geometry { reader: GeometryReader, bare: bool },
}

#[derive(Debug)]
pub struct GeoJsonDecoder {
    tokenizer: JsonTokenizer,
    options: DecoderOptions,
    frames: Vec<Frame>,
    delegate: Option<Delegate>,
    number_returned: Option<u64>,
    number_matched: Option<u64>,
    started: bool,
    single: bool,
    collection: bool,
    feature: bool,
    finished: bool,
}

impl GeoJsonDecoder {
    #[must_use]
    pub fn new(options: DecoderOptions) -> Self {
        Self {
            tokenizer: JsonTokenizer::new(),
            options,
            frames: Vec::new(),
            delegate: None,
            number_returned: None,
            number_matched: None,
            started: false,
            single: false,
            collection: false,
            feature: false,
            finished: false,
        }
    }

    fn current_path(&self) -> String {
        match &self.delegate {
            Some(Delegate::Properties(reader)) => {
                let path = reader.current_path();
                if path.is_empty() {
                    "properties".to_string()
                } else {
                    format!("properties.{path}")
                }
            }
            Some(Delegate::Geometry { reader, .. }) => reader.current_path(),
            None => String::new(),
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::parse(message, self.current_path(), self.tokenizer.offset())
    }

    fn start(&mut self, single: bool, sink: &mut dyn FeatureSink) -> Result<()> {
        if !self.started {
            self.started = true;
            debug!(
                number_returned = ?self.number_returned,
                number_matched = ?self.number_matched,
                "start of GeoJSON stream"
            );
            sink.on_start(self.number_returned, self.number_matched)?;
        }
        if single && !self.single {
            self.single = true;
            sink.on_feature_start()?;
        }
        Ok(())
    }

    fn end(&mut self, sink: &mut dyn FeatureSink) -> Result<()> {
        self.start(false, sink)?;
        if self.single {
            sink.on_feature_end()?;
        }
        sink.on_end()?;
        self.finished = true;
        debug!("end of GeoJSON stream");
        Ok(())
    }

    fn metadata(&mut self, name: &str, value: &str) {
        let Ok(number) = value.parse::<u64>() else {
            debug!(name, value, "ignoring invalid metadata");
            return;
        };
        if self.started {
            debug!(name, number, "ignoring metadata after start of features");
            return;
        }
        match name {
            "numberReturned" => self.number_returned = Some(number),
            _ => self.number_matched = Some(number),
        }
    }

    /// Members of a feature object. Returns `false` for members that are not part of a feature.
    fn feature_member(
        &mut self,
        name: &str,
        kind: &TokenKind,
        sink: &mut dyn FeatureSink,
    ) -> Result<bool> {
        match (name, kind) {
            ("id", TokenKind::String(_) | TokenKind::Integer(_) | TokenKind::Float(_)) => {
                if let Some((value, value_type)) = json_scalar(kind.clone()) {
                    sink.on_value(&["id".to_string()], &value, value_type)?;
                }
            }
            ("properties", TokenKind::StartObject) => {
                sink.on_object_start(&["properties".to_string()], None)?;
                self.delegate = Some(Delegate::Properties(PropertiesReader::new(
                    Vec::new(),
                    self.options.null_value.clone(),
                )));
            }
            ("geometry", TokenKind::StartObject) => {
                self.delegate = Some(Delegate::Geometry {
                    reader: GeometryReader::new(vec!["geometry".to_string()]),
                    bare: false,
                });
            }
            ("properties" | "geometry" | "id", TokenKind::Null) => {
                json_null(&[name.to_string()], self.options.null_value.as_deref(), sink)?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// The root object is a geometry; `token` is its first geometry member.
    fn bare_geometry(&mut self, token: JsonToken, sink: &mut dyn FeatureSink) -> Result<()> {
        self.start(true, sink)?;
        let mut reader = GeometryReader::new(vec!["geometry".to_string()]);
        reader.token(token, sink)?;
        self.delegate = Some(Delegate::Geometry { reader, bare: true });
        Ok(())
    }

    fn delegate_token(&mut self, token: JsonToken, sink: &mut dyn FeatureSink) -> Result<()> {
        let closed = match self.delegate.as_mut() {
            Some(Delegate::Properties(reader)) => {
                let closed = reader.token(token, sink)?;
                if closed {
                    sink.on_object_end()?;
                }
                closed
            }
            Some(Delegate::Geometry { reader, .. }) => reader.token(token, sink)?,
            None => false,
        };

        if closed {
            if let Some(Delegate::Geometry { bare: true, .. }) = self.delegate.take() {
                // the bare geometry was the root object
                self.frames.pop();
                self.end(sink)?;
            }
        }
        Ok(())
    }

    fn root_token(&mut self, token: JsonToken, sink: &mut dyn FeatureSink) -> Result<()> {
        let JsonToken { name, kind } = token;
        let Some(name) = name else {
            if kind == TokenKind::EndObject {
                self.frames.pop();
                return self.end(sink);
            }
            return Err(self.error("unexpected token in root object"));
        };

        match (name.as_str(), &kind) {
            ("type", TokenKind::String(type_name)) => match type_name.as_str() {
                "FeatureCollection" => self.collection = true,
                "Feature" => {
                    self.feature = true;
                    self.start(true, sink)?;
                }
                geometry_type
                    if GeometryType::from_geojson(geometry_type) != GeometryType::Unknown =>
                {
                    let token = JsonToken {
                        name: Some(name.clone()),
                        kind: kind.clone(),
                    };
                    self.bare_geometry(token, sink)?;
                }
                other => debug!(type_name = other, "ignoring unknown root type"),
            },
            ("coordinates" | "geometries", TokenKind::StartArray)
                if !self.collection && !self.feature =>
            {
                let token = JsonToken {
                    name: Some(name.clone()),
                    kind: kind.clone(),
                };
                self.bare_geometry(token, sink)?;
            }
            ("numberReturned" | "numberMatched", TokenKind::Integer(value)) => {
                let value = value.clone();
                self.metadata(&name, &value);
            }
            ("features", TokenKind::StartArray) => {
                self.start(false, sink)?;
                self.frames.push(Frame::Features);
            }
            _ => {
                let is_feature_member = !self.collection
                    && matches!(name.as_str(), "id" | "properties" | "geometry");
                if is_feature_member {
                    self.start(true, sink)?;
                    if self.feature_member(&name, &kind, sink)? {
                        return Ok(());
                    }
                }
                if matches!(kind, TokenKind::StartObject | TokenKind::StartArray) {
                    self.frames.push(Frame::Skip);
                }
            }
        }
        Ok(())
    }

    fn token(&mut self, token: JsonToken, sink: &mut dyn FeatureSink) -> Result<()> {
        if self.delegate.is_some() {
            return self.delegate_token(token, sink);
        }

        let Some(frame) = self.frames.last().copied() else {
            if token.kind == TokenKind::StartObject {
                self.frames.push(Frame::Root);
                return Ok(());
            }
            return Err(self.error("expected a JSON object"));
        };

        match frame {
            Frame::Root => self.root_token(token, sink),
            Frame::Features => match token.kind {
                TokenKind::StartObject => {
                    sink.on_feature_start()?;
                    self.frames.push(Frame::Feature);
                    Ok(())
                }
                TokenKind::StartArray => {
                    self.frames.push(Frame::Skip);
                    Ok(())
                }
                TokenKind::EndArray => {
                    self.frames.pop();
                    Ok(())
                }
                _ => Ok(()),
            },
            Frame::Feature => {
                if token.kind == TokenKind::EndObject {
                    self.frames.pop();
                    return sink.on_feature_end();
                }
                if let Some(name) = &token.name {
                    if self.feature_member(name, &token.kind, sink)? {
                        return Ok(());
                    }
                }
                if matches!(token.kind, TokenKind::StartObject | TokenKind::StartArray) {
                    self.frames.push(Frame::Skip);
                }
                Ok(())
            }
            Frame::Skip => {
                match token.kind {
                    TokenKind::StartObject | TokenKind::StartArray => self.frames.push(Frame::Skip),
                    TokenKind::EndObject | TokenKind::EndArray => {
                        self.frames.pop();
                    }
                    _ => {}
                }
                Ok(())
            }
        }
    }
}

impl FeatureDecoder for GeoJsonDecoder {
    fn feed(&mut self, bytes: &[u8]) {
        self.tokenizer.feed(bytes);
    }

    fn end_of_input(&mut self) {
        self.tokenizer.end_of_input();
    }

    fn advance(&mut self, sink: &mut dyn FeatureSink) -> Result<DecodeStatus> {
        let next = self
            .tokenizer
            .next_token()
            .map_err(|err| with_path(err, || self.current_path()))?;

        match next {
            Next::NeedMoreInput => Ok(DecodeStatus::NeedMoreInput),
            Next::EndOfInput if self.finished => Ok(DecodeStatus::Done),
            Next::EndOfInput => Err(self.error("unexpected end of input")),
            Next::Token(token) => {
                let offset = self.tokenizer.offset();
                self.token(token, sink).map_err(|err| match err {
                    Error::Parse {
                        message,
                        path,
                        offset: 0,
                    } => Error::Parse {
                        message,
                        path,
                        offset,
                    },
                    other => other,
                })?;
                Ok(DecodeStatus::Progressed)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        decoder::decode_all,
        event::{EventValidator, FeatureEvent, GeometryHeader, ValueType},
    };

    fn decode(json: &str, options: DecoderOptions) -> Result<Vec<FeatureEvent>> {
        let mut decoder = GeoJsonDecoder::new(options);
        let mut sink = EventValidator::new(Vec::<FeatureEvent>::new());
        decode_all(&mut decoder, [json.as_bytes()], &mut sink)?;
        assert!(sink.is_closed());
        Ok(sink.into_inner())
    }

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(ToString::to_string).collect()
    }

    fn value(segments: &[&str], value: &str, value_type: ValueType) -> FeatureEvent {
        FeatureEvent::Value {
            path: path(segments),
            value: value.to_string(),
            value_type,
        }
    }

    fn start(number_returned: Option<u64>, number_matched: Option<u64>) -> FeatureEvent {
        FeatureEvent::Start {
            number_returned,
            number_matched,
        }
    }

    #[test]
    fn test_single_feature() -> Result<()> {
        let events = decode(
            r#"{"type":"Feature","id":7,"geometry":{"type":"Point","coordinates":[13.4,52.5]},"properties":{"name":"Berlin"}}"#,
            DecoderOptions::default(),
        )?;

        assert_eq!(
            events,
            vec![
                start(None, None),
                FeatureEvent::FeatureStart,
                value(&["id"], "7", ValueType::Integer),
                FeatureEvent::ObjectStart {
                    path: path(&["geometry"]),
                    geometry: Some(GeometryHeader::new(GeometryType::Point).with_dimension(2))
                },
                FeatureEvent::ArrayStart {
                    path: path(&["geometry"])
                },
                value(&["geometry"], "13.4", ValueType::Float),
                value(&["geometry"], "52.5", ValueType::Float),
                FeatureEvent::ArrayEnd,
                FeatureEvent::ObjectEnd,
                FeatureEvent::ObjectStart {
                    path: path(&["properties"]),
                    geometry: None
                },
                value(&["name"], "Berlin", ValueType::String),
                FeatureEvent::ObjectEnd,
                FeatureEvent::FeatureEnd,
                FeatureEvent::End,
            ]
        );
        Ok(())
    }

    #[test]
    fn test_bare_geometry() -> Result<()> {
        let events = decode(
            r#"{"type":"Point","coordinates":[1,2]}"#,
            DecoderOptions::default(),
        )?;

        assert_eq!(
            events,
            vec![
                start(None, None),
                FeatureEvent::FeatureStart,
                FeatureEvent::ObjectStart {
                    path: path(&["geometry"]),
                    geometry: Some(GeometryHeader::new(GeometryType::Point).with_dimension(2))
                },
                FeatureEvent::ArrayStart {
                    path: path(&["geometry"])
                },
                value(&["geometry"], "1", ValueType::Integer),
                value(&["geometry"], "2", ValueType::Integer),
                FeatureEvent::ArrayEnd,
                FeatureEvent::ObjectEnd,
                FeatureEvent::FeatureEnd,
                FeatureEvent::End,
            ]
        );
        Ok(())
    }

    #[test]
    fn test_bare_geometry_with_coordinates_first() -> Result<()> {
        let events = decode(
            r#"{"coordinates":[[7.1,50.7],[7.2,50.8]],"bbox":[7.1,50.7,7.2,50.8],"type":"LineString"}"#,
            DecoderOptions::default(),
        )?;

        assert_eq!(
            events,
            vec![
                start(None, None),
                FeatureEvent::FeatureStart,
                FeatureEvent::ObjectStart {
                    path: path(&["geometry"]),
                    geometry: Some(GeometryHeader::new(GeometryType::LineString).with_dimension(2))
                },
                FeatureEvent::ArrayStart {
                    path: path(&["geometry"])
                },
                value(&["geometry"], "7.1", ValueType::Float),
                value(&["geometry"], "50.7", ValueType::Float),
                value(&["geometry"], "7.2", ValueType::Float),
                value(&["geometry"], "50.8", ValueType::Float),
                FeatureEvent::ArrayEnd,
                FeatureEvent::ObjectEnd,
                FeatureEvent::FeatureEnd,
                FeatureEvent::End,
            ]
        );
        Ok(())
    }

    #[test]
    fn test_bare_collection_with_geometries_first() -> Result<()> {
        let events = decode(
            r#"{"geometries":[{"type":"Point","coordinates":[1,2]}],"type":"GeometryCollection"}"#,
            DecoderOptions::default(),
        )?;

        assert_eq!(
            events[2],
            FeatureEvent::ObjectStart {
                path: path(&["geometry"]),
                geometry: Some(GeometryHeader::new(GeometryType::GeometryCollection))
            }
        );
        assert!(events.contains(&value(&["geometry"], "2", ValueType::Integer)));
        Ok(())
    }

    #[test]
    fn test_content_after_document_fails() {
        for json in [
            r#"{"type":"FeatureCollection","features":[]} this is not json"#,
            r#"{"type":"FeatureCollection","features":[]}{"type":"Feature"}"#,
        ] {
            assert!(
                matches!(
                    decode(json, DecoderOptions::default()),
                    Err(Error::Parse { .. })
                ),
                "{json}"
            );
        }
        assert!(decode(
            "{\"type\":\"FeatureCollection\",\"features\":[]}\n  ",
            DecoderOptions::default()
        )
        .is_ok());
    }

    #[test]
    fn test_empty_document() -> Result<()> {
        assert_eq!(
            decode("{}", DecoderOptions::default())?,
            vec![start(None, None), FeatureEvent::End]
        );
        Ok(())
    }

    #[test]
    fn test_null_members() -> Result<()> {
        let json = r#"{"type":"FeatureCollection","features":[{"type":"Feature","geometry":null,"properties":{"a":null}}]}"#;

        assert_eq!(
            decode(json, DecoderOptions::default())?,
            vec![
                start(None, None),
                FeatureEvent::FeatureStart,
                FeatureEvent::ObjectStart {
                    path: path(&["properties"]),
                    geometry: None
                },
                FeatureEvent::ObjectEnd,
                FeatureEvent::FeatureEnd,
                FeatureEvent::End,
            ]
        );

        let options = DecoderOptions {
            null_value: Some("NULL".to_string()),
        };
        let events = decode(json, options)?;
        assert_eq!(events[2], value(&["geometry"], "NULL", ValueType::String));
        assert_eq!(events[4], value(&["a"], "NULL", ValueType::String));
        Ok(())
    }

    #[test]
    fn test_foreign_members_are_skipped() -> Result<()> {
        let events = decode(
            r#"{"type":"FeatureCollection","links":[{"href":"x"}],"features":[{"type":"Feature","bbox":[1,2,3,4],"properties":{}}],"crs":{"type":"name"}}"#,
            DecoderOptions::default(),
        )?;

        assert_eq!(events.len(), 6);
        Ok(())
    }

    #[test]
    fn test_parse_error_carries_path() {
        let result = decode(
            r#"{"type":"Feature","properties":{"a":{"b":tru}}}"#,
            DecoderOptions::default(),
        );

        match result {
            Err(Error::Parse { path, offset, .. }) => {
                assert_eq!(path, "properties.a");
                assert!(offset > 0);
            }
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_non_object_root() {
        assert!(decode("[1,2]", DecoderOptions::default()).is_err());
    }
}
