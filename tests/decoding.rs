use featurestream::{
    config::{DecoderOptions, GmlOptions, GraphQlOptions},
    decoder::{decode_all, AnyDecoder, ColumnKind, GeoJsonDecoder, RowDecoder, SqlColumn, SqlRow},
    event::{EventValidator, FeatureEvent, GeometryHeader, GeometryType, ValueType},
    Error,
};

const SCENARIO: &str = r#"{"type":"FeatureCollection","numberReturned":2,"features":[{"type":"Feature","id":"1","geometry":{"type":"Point","coordinates":[7.1,50.7]},"properties":{"name":"x"}}]}"#;

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

fn geojson(json: &str, options: DecoderOptions) -> featurestream::Result<Vec<FeatureEvent>> {
    let mut decoder = GeoJsonDecoder::new(options);
    let mut sink = EventValidator::new(Vec::<FeatureEvent>::new());
    decode_all(&mut decoder, [json.as_bytes()], &mut sink)?;
    assert!(sink.is_closed());
    Ok(sink.into_inner())
}

#[test]
fn test_feature_collection_event_sequence() -> anyhow::Result<()> {
    assert_eq!(
        geojson(SCENARIO, DecoderOptions::default())?,
        vec![
            FeatureEvent::Start {
                number_returned: Some(2),
                number_matched: None
            },
            FeatureEvent::FeatureStart,
            value(&["id"], "1", ValueType::String),
            FeatureEvent::ObjectStart {
                path: path(&["geometry"]),
                geometry: Some(GeometryHeader::new(GeometryType::Point).with_dimension(2))
            },
            FeatureEvent::ArrayStart {
                path: path(&["geometry"])
            },
            value(&["geometry"], "7.1", ValueType::Float),
            value(&["geometry"], "50.7", ValueType::Float),
            FeatureEvent::ArrayEnd,
            FeatureEvent::ObjectEnd,
            FeatureEvent::ObjectStart {
                path: path(&["properties"]),
                geometry: None
            },
            value(&["name"], "x", ValueType::String),
            FeatureEvent::ObjectEnd,
            FeatureEvent::FeatureEnd,
            FeatureEvent::End,
        ]
    );
    Ok(())
}

#[test]
fn test_output_does_not_depend_on_chunking() -> anyhow::Result<()> {
    let expected = geojson(SCENARIO, DecoderOptions::default())?;
    let bytes = SCENARIO.as_bytes();

    for split in 1..bytes.len() {
        let (head, tail) = bytes.split_at(split);
        let mut decoder = GeoJsonDecoder::new(DecoderOptions::default());
        let mut events: Vec<FeatureEvent> = Vec::new();
        decode_all(&mut decoder, [head, tail], &mut events)?;
        assert_eq!(events, expected, "split at {split}");
    }

    let mut decoder = GeoJsonDecoder::new(DecoderOptions::default());
    let mut events: Vec<FeatureEvent> = Vec::new();
    decode_all(&mut decoder, bytes.chunks(1), &mut events)?;
    assert_eq!(events, expected);
    Ok(())
}

#[test]
fn test_metadata_after_features_is_not_reported() -> anyhow::Result<()> {
    let events = geojson(
        r#"{"type":"FeatureCollection","numberMatched":5,"features":[],"numberReturned":2}"#,
        DecoderOptions::default(),
    )?;

    assert_eq!(
        events,
        vec![
            FeatureEvent::Start {
                number_returned: None,
                number_matched: Some(5)
            },
            FeatureEvent::End
        ]
    );
    Ok(())
}

#[test]
fn test_null_handling() -> anyhow::Result<()> {
    let json = r#"{"type":"Feature","properties":{"a":null,"b":[null,1]}}"#;

    let skipped = geojson(json, DecoderOptions::default())?;
    assert!(!skipped
        .iter()
        .any(|event| matches!(event, FeatureEvent::Value { path, .. } if path == &["a"])));

    let reported = geojson(
        json,
        DecoderOptions {
            null_value: Some("NULL".to_string()),
        },
    )?;
    assert!(reported.contains(&value(&["a"], "NULL", ValueType::String)));
    assert!(reported.contains(&value(&["b"], "NULL", ValueType::String)));
    Ok(())
}

#[test]
fn test_dimension_detection() -> anyhow::Result<()> {
    let events = geojson(
        r#"{"type":"Feature","geometry":{"coordinates":[[1,2,3],[4,5,6]],"type":"LineString"}}"#,
        DecoderOptions::default(),
    )?;

    assert_eq!(
        events[2],
        FeatureEvent::ObjectStart {
            path: path(&["geometry"]),
            geometry: Some(GeometryHeader::new(GeometryType::LineString).with_dimension(3))
        }
    );
    let values = events
        .iter()
        .filter(|event| matches!(event, FeatureEvent::Value { .. }))
        .count();
    assert_eq!(values, 6);
    Ok(())
}

#[test]
fn test_unknown_geometry_type() -> anyhow::Result<()> {
    let events = geojson(
        r#"{"type":"Feature","geometry":{"type":"Circle","coordinates":[1,2]}}"#,
        DecoderOptions::default(),
    )?;

    assert_eq!(
        events[2],
        FeatureEvent::ObjectStart {
            path: path(&["geometry"]),
            geometry: Some(GeometryHeader::new(GeometryType::Unknown).with_dimension(2))
        }
    );
    assert!(events.contains(&value(&["geometry"], "2", ValueType::Integer)));
    Ok(())
}

#[test]
fn test_malformed_input() {
    let result = geojson(
        r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{"a":}}]}"#,
        DecoderOptions::default(),
    );

    assert!(matches!(result, Err(Error::Parse { path, .. }) if path == "properties.a"));
}

#[test]
fn test_gml_through_any_decoder() -> anyhow::Result<()> {
    let gml = r#"<?xml version="1.0" encoding="UTF-8"?>
<wfs:FeatureCollection xmlns:wfs="http://www.opengis.net/wfs/2.0"
    xmlns:gml="http://www.opengis.net/gml/3.2" xmlns:app="http://example.com/app"
    numberReturned="1" numberMatched="3">
  <wfs:member>
    <app:river gml:id="r.1">
      <app:name>Rhein</app:name>
      <app:course>
        <gml:LineString srsDimension="2"><gml:posList>7.1 50.7 7.2 50.8</gml:posList></gml:LineString>
      </app:course>
    </app:river>
  </wfs:member>
</wfs:FeatureCollection>"#;

    let mut decoder = AnyDecoder::for_content_type(
        "application/gml+xml; version=3.2",
        &DecoderOptions::default(),
        None,
        &GmlOptions::default(),
    )?;
    let mut sink = EventValidator::new(Vec::<FeatureEvent>::new());
    decode_all(&mut decoder, gml.as_bytes().chunks(16), &mut sink)?;
    let events = sink.into_inner();

    assert_eq!(
        events[0],
        FeatureEvent::Start {
            number_returned: Some(1),
            number_matched: Some(3)
        }
    );
    assert!(events.contains(&value(&["app:name"], "Rhein", ValueType::String)));
    assert!(events.contains(&FeatureEvent::ObjectStart {
        path: path(&["app:course"]),
        geometry: Some(GeometryHeader::new(GeometryType::LineString).with_dimension(2))
    }));
    assert!(events.contains(&value(&["app:course"], "50.8", ValueType::Float)));
    Ok(())
}

#[test]
fn test_graphql_through_any_decoder() -> anyhow::Result<()> {
    let json = r#"{"data":{"rivers":[{"name":"Rhein","length":1233},{"name":"Main","length":527}]}}"#;
    let graphql = GraphQlOptions {
        wrapper: "rivers".to_string(),
        ..GraphQlOptions::default()
    };

    let mut decoder = AnyDecoder::for_content_type(
        "application/json",
        &DecoderOptions::default(),
        Some(&graphql),
        &GmlOptions::default(),
    )?;
    let mut sink = EventValidator::new(Vec::<FeatureEvent>::new());
    decode_all(&mut decoder, json.as_bytes().chunks(5), &mut sink)?;
    let events = sink.into_inner();

    let features = events
        .iter()
        .filter(|event| **event == FeatureEvent::FeatureStart)
        .count();
    assert_eq!(features, 2);
    assert!(events.contains(&value(&["length"], "527", ValueType::Integer)));
    Ok(())
}

#[test]
fn test_rows_with_wkt_geometry() -> anyhow::Result<()> {
    let mut decoder = RowDecoder::new(DecoderOptions::default());
    let mut sink = EventValidator::new(Vec::<FeatureEvent>::new());

    decoder.on_row(
        SqlRow::Values {
            feature_id: "1".to_string(),
            table_path: Vec::new(),
            columns: vec![
                SqlColumn::new("name", Some("Bonn"), ColumnKind::String),
                SqlColumn::new(
                    "geom",
                    Some("SRID=4326;POLYGON ((0 0, 1 0, 1 1, 0 0))"),
                    ColumnKind::Geometry,
                ),
            ],
        },
        &mut sink,
    )?;
    decoder.finish(&mut sink)?;
    let events = sink.into_inner();

    assert!(events.contains(&FeatureEvent::ObjectStart {
        path: path(&["geom"]),
        geometry: Some(GeometryHeader::new(GeometryType::Polygon).with_dimension(2))
    }));
    let arrays = events
        .iter()
        .filter(|event| matches!(event, FeatureEvent::ArrayStart { .. }))
        .count();
    assert_eq!(arrays, 2);
    Ok(())
}
