//! Incremental decoders for the supported source encodings.
//!
//! Every decoder is fed raw bytes in chunks and emits the canonical [`crate::event`] stream.
//! [`FeatureDecoder::advance`] handles at most one token per call and never blocks; callers
//! drive it until it reports [`DecodeStatus::NeedMoreInput`] or [`DecodeStatus::Done`].
use crate::{
    config::{DecoderOptions, GmlOptions, GraphQlOptions},
    error::{Error, Result},
    event::{FeatureSink, ValueType},
    tokenizer::json::TokenKind,
};

pub mod geojson;
pub mod gml;
pub mod graphql;
mod json_geometry;
mod json_properties;
pub mod rows;

pub use geojson::GeoJsonDecoder;
pub use gml::GmlDecoder;
pub use graphql::GraphQlDecoder;
pub use rows::{ColumnKind, RowDecoder, SqlColumn, SqlRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// The buffered input is used up; feed more bytes or signal the end of input.
    NeedMoreInput,
    Progressed,
    /// The input ended after a complete document, `End` was emitted.
    Done,
}

pub trait FeatureDecoder {
    fn feed(&mut self, bytes: &[u8]);

    /// No more bytes will follow.
    fn end_of_input(&mut self);

    /// Consumes the next token, emitting zero or more events.
    ///
    /// # Errors
    ///
    /// [`Error::Parse`] for malformed input, otherwise whatever the sink reports. The decoder must
    /// be discarded after an error.
    fn advance(&mut self, sink: &mut dyn FeatureSink) -> Result<DecodeStatus>;
}

/// Decoder selected by content type.
pub enum AnyDecoder {
    GeoJson(GeoJsonDecoder),
    GraphQl(GraphQlDecoder),
    Gml(GmlDecoder),
}

impl AnyDecoder {
    /// Picks the decoder for `content_type`. `application/json` is read as a GraphQL response
    /// when `graphql` options are given and as GeoJSON otherwise.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for an unsupported content type.
    pub fn for_content_type(
        content_type: &str,
        options: &DecoderOptions,
        graphql: Option<&GraphQlOptions>,
        gml: &GmlOptions,
    ) -> Result<Self> {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match (media_type.as_str(), graphql) {
            ("application/json", Some(graphql)) => {
                Ok(AnyDecoder::GraphQl(GraphQlDecoder::new(graphql.clone())))
            }
            ("application/geo+json" | "application/json", _) => {
                Ok(AnyDecoder::GeoJson(GeoJsonDecoder::new(options.clone())))
            }
            ("application/gml+xml" | "application/xml" | "text/xml", _) => {
                Ok(AnyDecoder::Gml(GmlDecoder::new(gml.clone())))
            }
            _ => Err(Error::Config(format!(
                "No decoder for content type '{content_type}'"
            ))),
        }
    }

    fn inner(&mut self) -> &mut dyn FeatureDecoder {
        match self {
            AnyDecoder::GeoJson(decoder) => decoder,
            AnyDecoder::GraphQl(decoder) => decoder,
            AnyDecoder::Gml(decoder) => decoder,
        }
    }
}

impl FeatureDecoder for AnyDecoder {
    fn feed(&mut self, bytes: &[u8]) {
        self.inner().feed(bytes);
    }

    fn end_of_input(&mut self) {
        self.inner().end_of_input();
    }

    fn advance(&mut self, sink: &mut dyn FeatureSink) -> Result<DecodeStatus> {
        self.inner().advance(sink)
    }
}

fn drain(decoder: &mut dyn FeatureDecoder, sink: &mut dyn FeatureSink) -> Result<DecodeStatus> {
    loop {
        match decoder.advance(sink)? {
            DecodeStatus::Progressed => {}
            status => return Ok(status),
        }
    }
}

/// Feeds all `chunks` to `decoder` and drives it to the end of the input.
///
/// # Errors
///
/// Whatever the decoder or the sink report, [`Error::Parse`] if the input ends early or
/// continues after the document.
pub fn decode_all<'a, I>(
    decoder: &mut dyn FeatureDecoder,
    chunks: I,
    sink: &mut dyn FeatureSink,
) -> Result<()>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    for chunk in chunks {
        decoder.feed(chunk);
        drain(decoder, sink)?;
    }

    decoder.end_of_input();
    match drain(decoder, sink)? {
        DecodeStatus::Done => Ok(()),
        _ => Err(Error::parse("unexpected end of input", "", 0)),
    }
}

/// Text and kind of a JSON scalar; `None` for `null` and containers.
pub(crate) fn json_scalar(kind: TokenKind) -> Option<(String, ValueType)> {
    match kind {
        TokenKind::String(value) => Some((value, ValueType::String)),
        TokenKind::Integer(value) => Some((value, ValueType::Integer)),
        TokenKind::Float(value) => Some((value, ValueType::Float)),
        TokenKind::Bool(value) => Some((value.to_string(), ValueType::Boolean)),
        _ => None,
    }
}

/// Emits a `null` as `null_value`, or nothing.
pub(crate) fn json_null(
    path: &[String],
    null_value: Option<&str>,
    sink: &mut dyn FeatureSink,
) -> Result<()> {
    match null_value {
        Some(null_value) => sink.on_value(path, null_value, ValueType::String),
        None => Ok(()),
    }
}

/// Fills in the decoder's current path for parse errors reported without one.
pub(crate) fn with_path(err: Error, current: impl FnOnce() -> String) -> Error {
    match err {
        Error::Parse {
            message,
            path,
            offset,
        } if path.is_empty() => Error::Parse {
            message,
            path: current(),
            offset,
        },
        other => other,
    }
}
