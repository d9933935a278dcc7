//! Incremental decoder for GraphQL JSON responses.
//!
//! Features are the elements of `data.<wrapper>` (or `data.<wrapper>` itself if it is an
//! object). Every member of a feature is a property; the member named by
//! [`GraphQlOptions::geometry`] holds a GeoJSON geometry.
use tracing::debug;

use super::{
    json_geometry::GeometryReader, json_properties::PropertiesReader, with_path, DecodeStatus,
    FeatureDecoder,
};
use crate::{
    config::GraphQlOptions,
    error::{Error, Result},
    event::FeatureSink,
    tokenizer::{
        json::{JsonToken, JsonTokenizer, TokenKind},
        Next,
    },
};

#[derive(Debug)]
enum Frame {
    Root,
    Data,
    Collection,
    Feature(PropertiesReader),
    Skip,
}

#[derive(Debug)]
pub struct GraphQlDecoder {
    tokenizer: JsonTokenizer,
    options: GraphQlOptions,
    frames: Vec<Frame>,
    geometry: Option<GeometryReader>,
    started: bool,
    finished: bool,
}

impl GraphQlDecoder {
    #[must_use]
    pub fn new(options: GraphQlOptions) -> Self {
        Self {
            tokenizer: JsonTokenizer::new(),
            options,
            frames: Vec::new(),
            geometry: None,
            started: false,
            finished: false,
        }
    }

    fn base_path(&self) -> Vec<String> {
        self.options.type_name.iter().cloned().collect()
    }

    fn current_path(&self) -> String {
        if let Some(reader) = &self.geometry {
            return reader.current_path();
        }
        match self.frames.last() {
            Some(Frame::Feature(reader)) => reader.current_path(),
            Some(Frame::Data) => "data".to_string(),
            Some(Frame::Collection) => format!("data.{}", self.options.wrapper),
            _ => String::new(),
        }
    }

    fn start(&mut self, sink: &mut dyn FeatureSink) -> Result<()> {
        if !self.started {
            self.started = true;
            debug!(wrapper = %self.options.wrapper, "start of GraphQL response");
            sink.on_start(None, None)?;
        }
        Ok(())
    }

    fn start_feature(&mut self, sink: &mut dyn FeatureSink) -> Result<()> {
        sink.on_feature_start()?;
        self.frames.push(Frame::Feature(PropertiesReader::new(
            self.base_path(),
            self.options.null_value.clone(),
        )));
        Ok(())
    }

    fn feature_token(&mut self, token: JsonToken, sink: &mut dyn FeatureSink) -> Result<()> {
        let geometry_member = self.options.geometry.as_deref();
        let Some(Frame::Feature(reader)) = self.frames.last_mut() else {
            return Ok(());
        };

        let is_geometry = reader.at_top()
            && token.kind == TokenKind::StartObject
            && token.name.is_some()
            && token.name.as_deref() == geometry_member;
        if is_geometry {
            let path = reader.path(token.name.as_deref());
            self.geometry = Some(GeometryReader::new(path));
            return Ok(());
        }

        if reader.token(token, sink)? {
            self.frames.pop();
            sink.on_feature_end()?;
        }
        Ok(())
    }

    fn token(&mut self, token: JsonToken, sink: &mut dyn FeatureSink) -> Result<()> {
        if let Some(reader) = self.geometry.as_mut() {
            if reader.token(token, sink)? {
                self.geometry = None;
            }
            return Ok(());
        }

        let is_start = matches!(token.kind, TokenKind::StartObject | TokenKind::StartArray);
        let is_end = matches!(token.kind, TokenKind::EndObject | TokenKind::EndArray);

        match self.frames.last() {
            None if token.kind == TokenKind::StartObject => self.frames.push(Frame::Root),
            None => {
                return Err(Error::parse(
                    "expected a JSON object",
                    "",
                    self.tokenizer.offset(),
                ))
            }
            Some(Frame::Root) => match (token.name.as_deref(), &token.kind) {
                (Some("data"), TokenKind::StartObject) => self.frames.push(Frame::Data),
                (_, TokenKind::EndObject) => {
                    self.frames.pop();
                    self.start(sink)?;
                    sink.on_end()?;
                    self.finished = true;
                    debug!("end of GraphQL response");
                }
                _ if is_start => self.frames.push(Frame::Skip),
                _ => {}
            },
            Some(Frame::Data) => {
                let is_wrapper = token.name.as_deref() == Some(self.options.wrapper.as_str());
                match &token.kind {
                    TokenKind::StartArray if is_wrapper => {
                        self.start(sink)?;
                        self.frames.push(Frame::Collection);
                    }
                    TokenKind::StartObject if is_wrapper => {
                        self.start(sink)?;
                        self.start_feature(sink)?;
                    }
                    _ if is_start => self.frames.push(Frame::Skip),
                    _ if is_end => {
                        self.frames.pop();
                    }
                    _ => {}
                }
            }
            Some(Frame::Collection) => match &token.kind {
                TokenKind::StartObject => self.start_feature(sink)?,
                TokenKind::EndArray => {
                    self.frames.pop();
                }
                _ if is_start => self.frames.push(Frame::Skip),
                _ => {}
            },
            Some(Frame::Feature(_)) => self.feature_token(token, sink)?,
            Some(Frame::Skip) => {
                if is_start {
                    self.frames.push(Frame::Skip);
                } else if is_end {
                    self.frames.pop();
                }
            }
        }
        Ok(())
    }
}

impl FeatureDecoder for GraphQlDecoder {
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
            Next::EndOfInput => Err(Error::parse(
                "unexpected end of input",
                self.current_path(),
                self.tokenizer.offset(),
            )),
            Next::Token(token) => {
                self.token(token, sink)?;
                Ok(DecodeStatus::Progressed)
            }
        }
    }
}
