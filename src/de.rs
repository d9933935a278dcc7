use geozero::GeozeroDatasource;
use serde::de::DeserializeOwned;

use crate::{
    collector::FeatureCollector,
    config::DecoderOptions,
    decoder::{decode_all, FeatureDecoder, GeoJsonDecoder},
    error::Result,
    event::{EventValidator, FeatureEvent},
    geozero_sink::GeozeroSink,
};

/// Deserializes the features of a `GeozeroDatasource` into a type that implements Deserialize.
///
/// The geometry is available as the field `geometry` (an `Option<geo::Geometry>`), the properties
/// as fields of their own name.
///
/// ```
/// use serde::Deserialize;
/// use geo::Geometry;
/// use featurestream::from_datasource;
///
/// #[derive(Deserialize)]
/// struct City {
///     geometry: Option<Geometry>,
///     name: String,
///     population: i64,
/// }
///
/// let geojson = r#"{
///     "type": "Feature",
///     "geometry": {"type": "Point", "coordinates": [13.4, 52.5]},
///     "properties": {"name": "Berlin", "population": 3669495}
/// }"#;
///
/// let mut reader = geozero::geojson::GeoJsonReader(geojson.as_bytes());
/// let cities: Vec<City> = from_datasource(&mut reader).unwrap();
///
/// assert_eq!(cities[0].name, "Berlin");
/// ```
///
/// # Errors
///
/// Returns an error if the datasource fails or a feature does not deserialize into `T`.
pub fn from_datasource<T: DeserializeOwned, S: GeozeroDatasource>(
    datasource: &mut S,
) -> Result<Vec<T>> {
    let mut collector = FeatureCollector::new();
    datasource.process(&mut collector)?;
    Ok(collector.features)
}

/// Deserializes the features of a canonical event stream.
///
/// Properties keep their dotted path as name; repeated values become arrays.
///
/// # Errors
///
/// [`crate::error::Error::EventOrder`] if the events violate the stream order, otherwise an error
/// if a feature does not deserialize into `T`.
pub fn from_events<T, I>(events: I) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    I: IntoIterator<Item = FeatureEvent>,
{
    let mut sink = EventValidator::new(GeozeroSink::new(FeatureCollector::new()));
    for event in events {
        event.replay(&mut sink)?;
    }
    Ok(sink.into_inner().into_inner().features)
}

/// Runs `decoder` over `chunks` and deserializes the decoded features.
///
/// # Errors
///
/// Whatever the decoder reports, or an error if a feature does not deserialize into `T`.
pub fn from_decoder<'a, T, I>(decoder: &mut dyn FeatureDecoder, chunks: I) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut sink = GeozeroSink::new(FeatureCollector::new());
    decode_all(decoder, chunks, &mut sink)?;
    Ok(sink.into_inner().features)
}

/// Decodes a complete GeoJSON document and deserializes its features.
///
/// # Errors
///
/// [`crate::error::Error::Parse`] for malformed input, or an error if a feature does not
/// deserialize into `T`.
pub fn from_geojson_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>> {
    let mut decoder = GeoJsonDecoder::new(DecoderOptions::default());
    from_decoder(&mut decoder, [bytes])
}
