//! # featurestream
//!
//! Incremental decoding of geospatial feature encodings into one canonical event stream, and a
//! composable pipeline that transforms the geometry coordinates carried in that stream.
//!
//! ## Main Components
//!
//! - [`event::FeatureSink`] - consumer of the canonical feature events
//! - [`decoder`] - non-blocking decoders for GeoJSON, GraphQL responses, WFS/GML and query rows
//! - [`geometry::chain::CoordinatesTransformer`] - simplification, reprojection, axis
//!   reordering and formatting of coordinate runs, built once from a [`config::ChainConfig`]
//! - [`transform::CoordinateTransformingSink`] - applies a chain to the geometries of a stream
//! - [`geozero_sink::GeozeroSink`] - replays a stream into any geozero processor
//! - [`from_geojson_bytes`], [`from_events`], [`from_datasource`] - deserialize features into
//!   your own types with serde
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use featurestream::{
//!     config::{ChainConfig, DecoderOptions},
//!     decoder::{decode_all, GeoJsonDecoder},
//!     event::FeatureEvent,
//!     geometry::{chain::CoordinatesTransformer, crs::EpsgCrs, registry::BuiltinCrsRegistry},
//!     transform::CoordinateTransformingSink,
//! };
//!
//! let geojson = br#"{"type":"FeatureCollection","features":[
//!     {"type":"Feature","geometry":{"type":"Point","coordinates":[180,0]},"properties":{}}]}"#;
//!
//! let mut config = ChainConfig::new(EpsgCrs::CRS84, EpsgCrs::new(3857));
//! config.output_precision = 2;
//! let chain = CoordinatesTransformer::build(&config, &BuiltinCrsRegistry::new()).unwrap();
//!
//! let mut sink = CoordinateTransformingSink::new(Vec::<FeatureEvent>::new(), Arc::new(chain));
//! let mut decoder = GeoJsonDecoder::new(DecoderOptions::default());
//! decode_all(&mut decoder, geojson.chunks(7), &mut sink).unwrap();
//!
//! let events = sink.into_inner();
//! assert!(events.iter().any(|event| matches!(
//!     event,
//!     FeatureEvent::Value { value, .. } if value == "20037508.34"
//! )));
//! ```
//!
//! ## Modules
//!
//! - [`event`] - the feature events, the sink trait and an order validating sink
//! - [`tokenizer`] - chunked JSON and XML tokenizers
//! - [`decoder`] - the source format decoders
//! - [`wkt`] - WKT geometry text as events
//! - [`geometry`] - coordinates, reference systems, the transformation chain
//! - [`collector`] - geozero processor collecting `geo` geometries and properties
//! - [`de`] - deserialization helpers
//! - [`error`] - error types

pub mod collector;
pub mod config;
#[allow(clippy::module_name_repetitions)]
pub mod de;
pub mod decoder;
pub mod error;
pub mod event;
pub mod geometry;
pub mod geozero_sink;
pub mod path;
pub mod tokenizer;
pub mod transform;
pub mod value;
pub mod wkt;

pub use de::{from_datasource, from_decoder, from_events, from_geojson_bytes};
pub use error::{Error, Result};
