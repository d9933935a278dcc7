//! Incremental decoder for WFS/GML feature collections.
//!
//! Element names are reported qualified with the prefixes of [`GmlOptions::namespaces`], so
//! paths do not depend on the prefixes a document happens to declare. Elements from the GML
//! namespaces always use `gml` unless configured otherwise.
use hashbrown::HashMap;
use tracing::{debug, trace};

use super::{with_path, DecodeStatus, FeatureDecoder};
use crate::{
    config::GmlOptions,
    error::{Error, Result},
    event::{FeatureSink, GeometryHeader, GeometryType, ValueType},
    geometry::{
        chain::{CoordinatesTransformer, RunContext},
        parser::CoordinatesParser,
        writer::FeatureTokenWriter,
    },
    path::PathTracker,
    tokenizer::{
        xml::{Attribute, XmlToken, XmlTokenizer},
        Next,
    },
};

const GML_NAMESPACES: [&str; 2] = ["http://www.opengis.net/gml", "http://www.opengis.net/gml/3.2"];
const MEMBER_ELEMENTS: [&str; 3] = ["member", "featureMember", "featureMembers"];

/// An element name after namespace normalisation.
#[derive(Debug, Clone)]
struct QName {
    qualified: String,
    local: String,
    is_gml: bool,
}

impl QName {
    fn prefix(&self) -> &str {
        self.qualified
            .strip_suffix(self.local.as_str())
            .and_then(|prefix| prefix.strip_suffix(':'))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropertyKind {
    Undecided,
    Object,
    Geometry,
}

#[derive(Debug)]
struct Property {
    restore: usize,
    kind: PropertyKind,
    text: String,
}

#[derive(Debug)]
struct Run {
    parser: CoordinatesParser,
    dimension: usize,
}

/// One open element inside a geometry.
#[derive(Debug, Default)]
struct GeometryElement {
    run: Option<Run>,
    coordinates: bool,
    close_array: bool,
    close_object: bool,
}

#[derive(Debug)]
enum Frame {
    Container,
    Member,
    Feature,
    Property(Property),
    Geometry(GeometryElement),
    Skip,
}

#[derive(Debug)]
struct OpenGeometry {
    path: Vec<String>,
    geometry_type: GeometryType,
    dimension: usize,
}

fn geometry_type(local: &str) -> Option<GeometryType> {
    match local {
        "Point" => Some(GeometryType::Point),
        "LineString" | "Curve" => Some(GeometryType::LineString),
        "Polygon" | "Surface" => Some(GeometryType::Polygon),
        "MultiPoint" => Some(GeometryType::MultiPoint),
        "MultiLineString" | "MultiCurve" => Some(GeometryType::MultiLineString),
        "MultiPolygon" | "MultiSurface" => Some(GeometryType::MultiPolygon),
        _ => None,
    }
}

fn parse_count(attributes: &[Attribute], name: &str) -> Option<u64> {
    attributes
        .iter()
        .find(|attribute| attribute.name == name)
        .and_then(|attribute| attribute.value.parse().ok())
}

fn parse_dimension(attributes: &[Attribute]) -> Option<usize> {
    attributes
        .iter()
        .find(|attribute| attribute.name == "srsDimension")
        .and_then(|attribute| attribute.value.parse().ok())
}

#[derive(Debug)]
pub struct GmlDecoder {
    tokenizer: XmlTokenizer,
    options: GmlOptions,
    prefixes: HashMap<String, String>,
    scopes: Vec<Vec<(String, String)>>,
    frames: Vec<Frame>,
    tracker: PathTracker,
    geometry: Option<OpenGeometry>,
    identity: CoordinatesTransformer,
    finished: bool,
}

impl GmlDecoder {
    #[must_use]
    pub fn new(options: GmlOptions) -> Self {
        let mut prefixes: HashMap<String, String> = options
            .namespaces
            .iter()
            .map(|(prefix, uri)| (uri.clone(), prefix.clone()))
            .collect();
        for uri in GML_NAMESPACES {
            prefixes
                .entry(uri.to_string())
                .or_insert_with(|| "gml".to_string());
        }

        Self {
            tokenizer: XmlTokenizer::new(),
            options,
            prefixes,
            scopes: Vec::new(),
            frames: Vec::new(),
            tracker: PathTracker::new(),
            geometry: None,
            identity: CoordinatesTransformer::identity(),
            finished: false,
        }
    }

    fn resolve(&self, prefix: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(declared, _)| declared == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    fn qname(&self, name: &str, is_attribute: bool) -> QName {
        let (prefix, local) = name.split_once(':').unwrap_or(("", name));
        let uri = if is_attribute && prefix.is_empty() {
            None
        } else {
            self.resolve(prefix)
        };
        let is_gml = uri.is_some_and(|uri| GML_NAMESPACES.contains(&uri));
        let prefix = uri
            .and_then(|uri| self.prefixes.get(uri))
            .map_or(prefix, String::as_str);

        QName {
            qualified: if prefix.is_empty() {
                local.to_string()
            } else {
                format!("{prefix}:{local}")
            },
            local: local.to_string(),
            is_gml,
        }
    }

    fn push_scope(&mut self, attributes: &[Attribute]) {
        let scope = attributes
            .iter()
            .filter_map(|attribute| {
                if attribute.name == "xmlns" {
                    Some((String::new(), attribute.value.clone()))
                } else {
                    attribute
                        .name
                        .strip_prefix("xmlns:")
                        .map(|prefix| (prefix.to_string(), attribute.value.clone()))
                }
            })
            .collect();
        self.scopes.push(scope);
    }

    fn is_feature_type(&self, name: &QName) -> bool {
        self.options
            .feature_types
            .iter()
            .any(|feature_type| *feature_type == name.local)
    }

    fn current_path(&self) -> String {
        self.tracker.to_string()
    }

    fn parse_error(&self, err: &Error) -> Error {
        Error::parse(err.to_string(), self.current_path(), self.tokenizer.offset())
    }

    fn start_feature(
        &mut self,
        attributes: &[Attribute],
        sink: &mut dyn FeatureSink,
    ) -> Result<()> {
        self.tracker.truncate(0);
        sink.on_feature_start()?;
        for attribute in attributes {
            let name = self.qname(&attribute.name, true);
            if name.is_gml && name.local == "id" {
                let path = [format!("{}:@id", name.prefix())];
                sink.on_value(&path, &attribute.value, ValueType::String)?;
            }
        }
        self.frames.push(Frame::Feature);
        Ok(())
    }

    fn start_property(&mut self, name: &QName) {
        let restore = self.tracker.depth();
        self.tracker.track(&name.qualified, false);
        self.frames.push(Frame::Property(Property {
            restore,
            kind: PropertyKind::Undecided,
            text: String::new(),
        }));
    }

    fn start_geometry(
        &mut self,
        geometry_type: GeometryType,
        attributes: &[Attribute],
        sink: &mut dyn FeatureSink,
    ) -> Result<()> {
        let dimension = parse_dimension(attributes).unwrap_or(2);
        let path = self.tracker.as_path();
        sink.on_object_start(
            &path,
            Some(GeometryHeader::new(geometry_type).with_dimension(dimension)),
        )?;

        let owns_run = matches!(geometry_type, GeometryType::Point | GeometryType::LineString);
        if !owns_run {
            sink.on_array_start(&path)?;
        }
        trace!(%geometry_type, dimension, path = %self.current_path(), "GML geometry");

        self.frames.push(Frame::Geometry(GeometryElement {
            run: owns_run.then(|| Run {
                parser: CoordinatesParser::new(),
                dimension,
            }),
            coordinates: false,
            close_array: !owns_run,
            close_object: true,
        }));
        self.geometry = Some(OpenGeometry {
            path,
            geometry_type,
            dimension,
        });
        Ok(())
    }

    fn geometry_child(
        &mut self,
        name: &QName,
        attributes: &[Attribute],
        sink: &mut dyn FeatureSink,
    ) -> Result<()> {
        let Some(geometry) = &self.geometry else {
            self.frames.push(Frame::Skip);
            return Ok(());
        };
        let dimension = parse_dimension(attributes).unwrap_or(geometry.dimension);
        let mut element = GeometryElement::default();

        if name.is_gml {
            match name.local.as_str() {
                "Point" | "LineString" | "Curve" | "LinearRing" | "Ring" => {
                    element.run = Some(Run {
                        parser: CoordinatesParser::new(),
                        dimension,
                    });
                }
                "Polygon" | "Surface" if geometry.geometry_type == GeometryType::MultiPolygon => {
                    sink.on_array_start(&geometry.path)?;
                    element.close_array = true;
                }
                "pos" | "posList" | "coordinates" => {
                    element.coordinates = true;
                    if let Some(dimension) = parse_dimension(attributes) {
                        if let Some(run) = self.innermost_run() {
                            run.dimension = dimension;
                        }
                    }
                }
                _ => {}
            }
        }
        self.frames.push(Frame::Geometry(element));
        Ok(())
    }

    fn innermost_run(&mut self) -> Option<&mut Run> {
        self.frames.iter_mut().rev().find_map(|frame| match frame {
            Frame::Geometry(GeometryElement { run: Some(run), .. }) => Some(run),
            _ => None,
        })
    }

    fn end_geometry_element(
        &mut self,
        element: GeometryElement,
        sink: &mut dyn FeatureSink,
    ) -> Result<()> {
        let Some(geometry) = &self.geometry else {
            return Ok(());
        };

        if let Some(run) = element.run {
            let coordinates = run.parser.finish().map_err(|err| self.parse_error(&err))?;
            let mut writer = FeatureTokenWriter::new(sink, &geometry.path, self.identity.formatter());
            self.identity
                .write(
                    coordinates,
                    run.dimension,
                    &RunContext::new(geometry.geometry_type),
                    &mut writer,
                )
                .map_err(|err| match err {
                    Error::InvalidCoordinates { .. } | Error::Dimension { .. } => {
                        self.parse_error(&err)
                    }
                    other => other,
                })?;
        }
        if element.close_array {
            sink.on_array_end()?;
        }
        if element.close_object {
            sink.on_object_end()?;
            self.geometry = None;
        }
        Ok(())
    }

    fn start_element(
        &mut self,
        name: &str,
        attributes: &[Attribute],
        sink: &mut dyn FeatureSink,
    ) -> Result<()> {
        self.push_scope(attributes);
        let name = self.qname(name, false);

        let Some(parent) = self.frames.last_mut() else {
            debug!(root = %name.qualified, "start of GML document");
            sink.on_start(
                parse_count(attributes, "numberReturned"),
                parse_count(attributes, "numberMatched"),
            )?;
            if self.is_feature_type(&name) {
                return self.start_feature(attributes, sink);
            }
            self.frames.push(Frame::Container);
            return Ok(());
        };

        match parent {
            Frame::Container | Frame::Member => {
                let in_member = matches!(parent, Frame::Member);
                if self.is_feature_type(&name)
                    || (in_member && self.options.feature_types.is_empty())
                {
                    self.start_feature(attributes, sink)?;
                } else if MEMBER_ELEMENTS.contains(&name.local.as_str()) {
                    self.frames.push(Frame::Member);
                } else {
                    self.frames.push(Frame::Container);
                }
            }
            Frame::Feature if name.is_gml && name.local == "boundedBy" => {
                self.frames.push(Frame::Skip);
            }
            Frame::Feature => self.start_property(&name),
            Frame::Property(property) => match property.kind {
                PropertyKind::Undecided => {
                    match geometry_type(&name.local).filter(|_| name.is_gml) {
                        Some(geometry_type) => {
                            property.kind = PropertyKind::Geometry;
                            self.start_geometry(geometry_type, attributes, sink)?;
                        }
                        None => {
                            property.kind = PropertyKind::Object;
                            sink.on_object_start(&self.tracker.as_path(), None)?;
                            self.start_property(&name);
                        }
                    }
                }
                PropertyKind::Object => self.start_property(&name),
                PropertyKind::Geometry => self.frames.push(Frame::Skip),
            },
            Frame::Geometry(_) => self.geometry_child(&name, attributes, sink)?,
            Frame::Skip => self.frames.push(Frame::Skip),
        }
        Ok(())
    }

    fn end_element(&mut self, sink: &mut dyn FeatureSink) -> Result<()> {
        self.scopes.pop();
        let Some(frame) = self.frames.pop() else {
            return Ok(());
        };

        match frame {
            Frame::Property(property) => {
                match property.kind {
                    PropertyKind::Undecided if !property.text.trim().is_empty() => {
                        sink.on_value(&self.tracker.as_path(), &property.text, ValueType::String)?;
                    }
                    PropertyKind::Object => sink.on_object_end()?,
                    _ => {}
                }
                self.tracker.truncate(property.restore);
            }
            Frame::Geometry(element) => self.end_geometry_element(element, sink)?,
            Frame::Feature => {
                self.tracker.truncate(0);
                sink.on_feature_end()?;
            }
            Frame::Container | Frame::Member | Frame::Skip => {}
        }

        if self.frames.is_empty() {
            sink.on_end()?;
            self.finished = true;
            debug!("end of GML document");
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<()> {
        match self.frames.last_mut() {
            Some(Frame::Property(Property {
                kind: PropertyKind::Undecided,
                text: value,
                ..
            })) => value.push_str(text),
            Some(Frame::Geometry(GeometryElement {
                coordinates: true, ..
            })) => {
                let pushed = match self.innermost_run() {
                    Some(run) => run.parser.push(text),
                    None => Ok(()),
                };
                pushed.map_err(|err| self.parse_error(&err))?;
            }
            _ => {}
        }
        Ok(())
    }

    fn token(&mut self, token: XmlToken, sink: &mut dyn FeatureSink) -> Result<()> {
        match token {
            XmlToken::StartElement { name, attributes } => {
                self.start_element(&name, &attributes, sink)
            }
            XmlToken::EndElement { .. } => self.end_element(sink),
            XmlToken::Text(text) => self.text(&text),
        }
    }
}

impl FeatureDecoder for GmlDecoder {
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

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        decoder::decode_all,
        event::{EventValidator, FeatureEvent},
    };

    const COLLECTION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wfs:FeatureCollection xmlns:wfs="http://www.opengis.net/wfs/2.0"
    xmlns:g="http://www.opengis.net/gml/3.2" xmlns:a="urn:example:app"
    numberMatched="12" numberReturned="1">
  <wfs:member>
    <a:city g:id="c.1">
      <g:boundedBy><g:Envelope><g:lowerCorner>0 0</g:lowerCorner></g:Envelope></g:boundedBy>
      <a:name>Bonn</a:name>
      <a:address><a:street>Markt</a:street><a:zip>53111</a:zip></a:address>
      <a:empty>  </a:empty>
      <a:location><g:Point srsDimension="2"><g:pos>7.1 50.7</g:pos></g:Point></a:location>
    </a:city>
  </wfs:member>
</wfs:FeatureCollection>"#;

    fn decode(xml: &str, options: GmlOptions) -> Result<Vec<FeatureEvent>> {
        let mut decoder = GmlDecoder::new(options);
        let mut sink = EventValidator::new(Vec::<FeatureEvent>::new());
        decode_all(&mut decoder, [xml.as_bytes()], &mut sink)?;
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

    fn app_namespace() -> GmlOptions {
        GmlOptions {
            feature_types: Vec::new(),
            namespaces: [("app".to_string(), "urn:example:app".to_string())]
                .into_iter()
                .collect(),
        }
    }

    #[test]
    fn test_feature_collection() -> Result<()> {
        let events = decode(COLLECTION, app_namespace())?;

        assert_eq!(
            events,
            vec![
                FeatureEvent::Start {
                    number_returned: Some(1),
                    number_matched: Some(12)
                },
                FeatureEvent::FeatureStart,
                value(&["gml:@id"], "c.1", ValueType::String),
                value(&["app:name"], "Bonn", ValueType::String),
                FeatureEvent::ObjectStart {
                    path: path(&["app:address"]),
                    geometry: None
                },
                value(&["app:address", "app:street"], "Markt", ValueType::String),
                value(&["app:address", "app:zip"], "53111", ValueType::String),
                FeatureEvent::ObjectEnd,
                FeatureEvent::ObjectStart {
                    path: path(&["app:location"]),
                    geometry: Some(GeometryHeader::new(GeometryType::Point).with_dimension(2))
                },
                FeatureEvent::ArrayStart {
                    path: path(&["app:location"])
                },
                value(&["app:location"], "7.1", ValueType::Float),
                value(&["app:location"], "50.7", ValueType::Float),
                FeatureEvent::ArrayEnd,
                FeatureEvent::ObjectEnd,
                FeatureEvent::FeatureEnd,
                FeatureEvent::End,
            ]
        );
        Ok(())
    }

    #[test]
    fn test_document_prefixes_without_mapping() -> Result<()> {
        let events = decode(COLLECTION, GmlOptions::default())?;

        assert_eq!(events[3], value(&["a:name"], "Bonn", ValueType::String));
        Ok(())
    }

    #[test]
    fn test_chunk_boundaries() -> Result<()> {
        let expected = decode(COLLECTION, app_namespace())?;

        for split in [1, 57, 200, 333, COLLECTION.len() - 2] {
            let (head, tail) = COLLECTION.as_bytes().split_at(split);
            let mut decoder = GmlDecoder::new(app_namespace());
            let mut events: Vec<FeatureEvent> = Vec::new();
            decode_all(&mut decoder, [head, tail], &mut events)?;
            assert_eq!(events, expected, "split at {split}");
        }
        Ok(())
    }

    fn shape(events: &[FeatureEvent]) -> String {
        events
            .iter()
            .filter_map(|event| match event {
                FeatureEvent::ObjectStart { .. } => Some("O[".to_string()),
                FeatureEvent::ArrayStart { .. } => Some("A[".to_string()),
                FeatureEvent::Value { value, .. } => Some(format!("{value} ")),
                FeatureEvent::ArrayEnd | FeatureEvent::ObjectEnd => Some("]".to_string()),
                _ => None,
            })
            .collect()
    }

    fn geometry(fragment: &str) -> Result<Vec<FeatureEvent>> {
        let xml = format!(
            r#"<c xmlns:gml="http://www.opengis.net/gml"><f><geom>{fragment}</geom></f></c>"#
        );
        decode(
            &xml,
            GmlOptions {
                feature_types: vec!["f".to_string()],
                namespaces: HashMap::new(),
            },
        )
    }

    #[test]
    fn test_polygon_rings() -> Result<()> {
        let events = geometry(
            "<gml:Polygon><gml:exterior><gml:LinearRing><gml:posList>0 0 4 0 4 4 0 0</gml:posList></gml:LinearRing></gml:exterior>\
             <gml:interior><gml:LinearRing><gml:coordinates>1,1 2,1 2,2 1,1</gml:coordinates></gml:LinearRing></gml:interior></gml:Polygon>",
        )?;

        assert_eq!(
            events[2],
            FeatureEvent::ObjectStart {
                path: path(&["geom"]),
                geometry: Some(GeometryHeader::new(GeometryType::Polygon).with_dimension(2))
            }
        );
        assert_eq!(
            shape(&events),
            "O[A[A[0 0 4 0 4 4 0 0 ]A[1 1 2 1 2 2 1 1 ]]]"
        );
        Ok(())
    }

    #[test]
    fn test_multi_surface() -> Result<()> {
        let events = geometry(
            r#"<gml:MultiSurface srsDimension="3"><gml:surfaceMember><gml:Polygon><gml:exterior><gml:LinearRing>
               <gml:posList>0 0 1 4 0 1 4 4 1 0 0 1</gml:posList></gml:LinearRing></gml:exterior></gml:Polygon></gml:surfaceMember>
               <gml:surfaceMember><gml:Polygon><gml:exterior><gml:LinearRing>
               <gml:posList>5 5 1 6 5 1 6 6 1 5 5 1</gml:posList></gml:LinearRing></gml:exterior></gml:Polygon></gml:surfaceMember></gml:MultiSurface>"#,
        )?;

        assert_eq!(
            events[2],
            FeatureEvent::ObjectStart {
                path: path(&["geom"]),
                geometry: Some(GeometryHeader::new(GeometryType::MultiPolygon).with_dimension(3))
            }
        );
        assert_eq!(
            shape(&events),
            "O[A[A[A[0 0 1 4 0 1 4 4 1 0 0 1 ]]A[A[5 5 1 6 5 1 6 6 1 5 5 1 ]]]]"
        );
        Ok(())
    }

    #[test]
    fn test_multi_point_and_curve() -> Result<()> {
        let points = geometry(
            "<gml:MultiPoint><gml:pointMember><gml:Point><gml:pos>1 2</gml:pos></gml:Point></gml:pointMember>\
             <gml:pointMember><gml:Point><gml:pos>3 4</gml:pos></gml:Point></gml:pointMember></gml:MultiPoint>",
        )?;
        assert_eq!(shape(&points), "O[A[A[1 2 ]A[3 4 ]]]");

        let curve = geometry(
            "<gml:Curve><gml:segments><gml:LineStringSegment><gml:posList>1 2 3 4</gml:posList>\
             </gml:LineStringSegment></gml:segments></gml:Curve>",
        )?;
        assert_eq!(
            curve[2],
            FeatureEvent::ObjectStart {
                path: path(&["geom"]),
                geometry: Some(GeometryHeader::new(GeometryType::LineString).with_dimension(2))
            }
        );
        assert_eq!(shape(&curve), "O[A[1 2 3 4 ]]");
        Ok(())
    }

    #[test]
    fn test_invalid_coordinates() {
        let result = geometry("<gml:Point><gml:pos>1 x</gml:pos></gml:Point>");

        assert!(matches!(result, Err(Error::Parse { path, .. }) if path == "geom"));
    }

    #[test]
    fn test_single_feature_document() -> Result<()> {
        let events = decode(
            r#"<f xmlns:gml="http://www.opengis.net/gml" gml:id="f1"><name>x</name></f>"#,
            GmlOptions {
                feature_types: vec!["f".to_string()],
                namespaces: HashMap::new(),
            },
        )?;

        assert_eq!(
            events,
            vec![
                FeatureEvent::Start {
                    number_returned: None,
                    number_matched: None
                },
                FeatureEvent::FeatureStart,
                value(&["gml:@id"], "f1", ValueType::String),
                value(&["name"], "x", ValueType::String),
                FeatureEvent::FeatureEnd,
                FeatureEvent::End,
            ]
        );
        Ok(())
    }

    #[test]
    fn test_truncated_document() {
        let result = decode("<c><member><f><a>1</a>", GmlOptions::default());

        assert!(matches!(result, Err(Error::Parse { .. })));
    }

    #[test]
    fn test_element_after_root_fails() {
        let result = decode(
            "<c><member><f><a>1</a></f></member></c><c/>",
            GmlOptions::default(),
        );

        assert!(matches!(result, Err(Error::Parse { .. })));
    }
}
