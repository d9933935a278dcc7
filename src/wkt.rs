//! Decodes WKT geometry text into geometry events.
//!
//! The output has the same shape as the geometries of the GeoJSON decoder: a `Point` or a
//! `LineString` is an object holding one coordinate run, polygons and multi line strings hold an
//! array of runs, multi polygons an array of arrays of runs. All points of a `MULTIPOINT` form a
//! single run. Members of a `GEOMETRYCOLLECTION` are reported at the path of the collection.
//!
//! Accepts an EWKT `SRID=..;` prefix and the `Z`, `M` and `ZM` modifiers, either separate
//! (`POINT Z (1 2 3)`) or attached (`POINTZ(1 2 3)`). Measures are dropped.
use tracing::warn;

use crate::{
    error::{Error, Result},
    event::{FeatureSink, GeometryHeader, GeometryType},
    geometry::writer::{CoordinateFormatter, CoordinatesWriter, FeatureTokenWriter},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    None,
    Z,
    M,
    Zm,
}

impl Modifier {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "Z" => Some(Modifier::Z),
            "M" => Some(Modifier::M),
            "ZM" => Some(Modifier::Zm),
            _ => None,
        }
    }

    /// Numbers per position in the text and the dimension that is kept.
    fn layout(self, found: usize) -> Option<(usize, usize)> {
        match (self, found) {
            (Modifier::None, 2 | 3) => Some((found, found)),
            (Modifier::Z, 3) => Some((3, 3)),
            (Modifier::M, 3) => Some((3, 2)),
            (Modifier::Zm, 4) => Some((4, 3)),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum Node {
    Positions(Vec<f64>),
    List(Vec<Node>),
    Members(Vec<Geometry>),
}

#[derive(Debug)]
struct Geometry {
    geometry_type: GeometryType,
    dimension: Option<usize>,
    body: Option<Node>,
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
    path: String,
}

impl<'a> Cursor<'a> {
    fn error(&self, message: impl Into<String>) -> Error {
        Error::parse(message, self.path.as_str(), self.pos as u64)
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.rest().chars().next()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{expected}'")))
        }
    }

    fn take_while(&mut self, accept: impl Fn(char) -> bool) -> &'a str {
        self.skip_whitespace();
        let rest = self.rest();
        let length = rest.find(|chr: char| !accept(chr)).unwrap_or(rest.len());
        self.pos += length;
        &rest[..length]
    }

    fn word(&mut self) -> &'a str {
        self.take_while(|chr| chr.is_ascii_alphabetic())
    }

    fn number(&mut self) -> Result<f64> {
        let start = self.pos;
        let token = self.take_while(|chr| {
            chr.is_ascii_digit() || matches!(chr, '+' | '-' | '.' | 'e' | 'E')
        });
        token.parse().map_err(|_| {
            Error::parse(
                format!("invalid number '{token}'"),
                self.path.as_str(),
                start as u64,
            )
        })
    }

    fn skip_srid(&mut self) -> Result<()> {
        self.skip_whitespace();
        let rest = self.rest();
        if rest
            .get(..5)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("SRID="))
        {
            let Some(end) = rest.find(';') else {
                return Err(self.error("expected ';' after SRID"));
            };
            self.pos += end + 1;
        }
        Ok(())
    }

    fn tag(&mut self) -> Result<(GeometryType, Modifier, &'a str)> {
        let word = self.word();
        if word.is_empty() {
            return Err(self.error("expected a geometry type"));
        }

        let mut geometry_type = GeometryType::from_wkt(word);
        let mut modifier = Modifier::None;
        if geometry_type == GeometryType::Unknown {
            let upper = word.to_ascii_uppercase();
            for suffix in ["ZM", "Z", "M"] {
                if let Some(stripped) = upper.strip_suffix(suffix) {
                    let stripped_type = GeometryType::from_wkt(stripped);
                    if stripped_type != GeometryType::Unknown {
                        geometry_type = stripped_type;
                        modifier = Modifier::parse(suffix).unwrap_or(Modifier::None);
                        break;
                    }
                }
            }
        }
        Ok((geometry_type, modifier, word))
    }

    fn geometry(&mut self) -> Result<Geometry> {
        let (geometry_type, mut modifier, tag) = self.tag()?;
        if geometry_type == GeometryType::Unknown {
            warn!(tag, path = %self.path, "unsupported WKT geometry type");
        }

        let mut word = self.word();
        if let Some(parsed) = Modifier::parse(word) {
            modifier = parsed;
            word = self.word();
        }
        if word.eq_ignore_ascii_case("EMPTY") {
            return Ok(Geometry {
                geometry_type,
                dimension: None,
                body: None,
            });
        }
        if !word.is_empty() {
            return Err(self.error(format!("unexpected '{word}'")));
        }

        let mut layout = None;
        let body = self.node(modifier, &mut layout)?;
        Ok(Geometry {
            geometry_type,
            dimension: layout.map(|(_, kept)| kept),
            body: Some(body),
        })
    }

    /// Parses a parenthesised list of positions, nested lists or member geometries.
    fn node(&mut self, modifier: Modifier, layout: &mut Option<(usize, usize)>) -> Result<Node> {
        self.expect('(')?;

        let node = match self.peek() {
            Some('(') => {
                let mut children = vec![self.node(modifier, layout)?];
                while self.eat(',') {
                    children.push(self.node(modifier, layout)?);
                }
                Node::List(children)
            }
            Some(chr) if chr.is_ascii_alphabetic() => {
                let mut members = vec![self.geometry()?];
                while self.eat(',') {
                    members.push(self.geometry()?);
                }
                Node::Members(members)
            }
            _ => {
                let mut positions = Vec::new();
                loop {
                    self.position(modifier, layout, &mut positions)?;
                    if !self.eat(',') {
                        break;
                    }
                }
                Node::Positions(positions)
            }
        };

        self.expect(')')?;
        Ok(node)
    }

    fn position(
        &mut self,
        modifier: Modifier,
        layout: &mut Option<(usize, usize)>,
        positions: &mut Vec<f64>,
    ) -> Result<()> {
        let start = self.pos;
        let mut values = Vec::with_capacity(4);
        while !matches!(self.peek(), Some(',' | ')') | None) {
            values.push(self.number()?);
        }

        let (found, kept) = modifier
            .layout(values.len())
            .ok_or_else(|| self.error(format!("position with {} values", values.len())))?;
        if let Some((expected, _)) = *layout {
            if expected != found {
                return Err(Error::parse(
                    format!("expected {expected} values per position, found {found}"),
                    self.path.as_str(),
                    start as u64,
                ));
            }
        } else {
            *layout = Some((found, kept));
        }

        positions.extend_from_slice(&values[..kept]);
        Ok(())
    }
}

fn write_run(
    positions: &[f64],
    dimension: usize,
    path: &[String],
    sink: &mut dyn FeatureSink,
) -> Result<()> {
    FeatureTokenWriter::new(sink, path, CoordinateFormatter::default()).write(positions, dimension)
}

fn flatten(node: &Node, into: &mut Vec<f64>) -> bool {
    match node {
        Node::Positions(positions) => {
            into.extend_from_slice(positions);
            true
        }
        Node::List(children) => children.iter().all(|child| flatten(child, into)),
        Node::Members(_) => false,
    }
}

/// Emits a node that does not match the expected nesting of its type: lists become arrays,
/// positions become runs.
fn emit_generic(
    node: &Node,
    dimension: usize,
    path: &[String],
    sink: &mut dyn FeatureSink,
) -> Result<()> {
    match node {
        Node::Positions(positions) => write_run(positions, dimension, path, sink),
        Node::List(children) => {
            sink.on_array_start(path)?;
            for child in children {
                emit_generic(child, dimension, path, sink)?;
            }
            sink.on_array_end()
        }
        Node::Members(members) => {
            sink.on_array_start(path)?;
            for member in members {
                emit(member, path, sink)?;
            }
            sink.on_array_end()
        }
    }
}

fn emit_runs(
    children: &[Node],
    dimension: usize,
    path: &[String],
    sink: &mut dyn FeatureSink,
) -> Result<bool> {
    if !children.iter().all(|child| matches!(child, Node::Positions(_))) {
        return Ok(false);
    }
    sink.on_array_start(path)?;
    for child in children {
        emit_generic(child, dimension, path, sink)?;
    }
    sink.on_array_end()?;
    Ok(true)
}

fn emit_body(
    geometry_type: GeometryType,
    body: &Node,
    dimension: usize,
    path: &[String],
    sink: &mut dyn FeatureSink,
) -> Result<bool> {
    match (geometry_type, body) {
        (GeometryType::Point | GeometryType::LineString, Node::Positions(positions)) => {
            write_run(positions, dimension, path, sink)?;
            Ok(true)
        }
        (GeometryType::MultiPoint, node) => {
            let mut positions = Vec::new();
            if !flatten(node, &mut positions) {
                return Ok(false);
            }
            write_run(&positions, dimension, path, sink)?;
            Ok(true)
        }
        (GeometryType::Polygon | GeometryType::MultiLineString, Node::List(rings)) => {
            emit_runs(rings, dimension, path, sink)
        }
        (GeometryType::MultiPolygon, Node::List(polygons)) => {
            let well_formed = polygons.iter().all(|polygon| match polygon {
                Node::List(rings) => rings
                    .iter()
                    .all(|ring| matches!(ring, Node::Positions(_))),
                _ => false,
            });
            if !well_formed {
                return Ok(false);
            }
            sink.on_array_start(path)?;
            for polygon in polygons {
                if let Node::List(rings) = polygon {
                    emit_runs(rings, dimension, path, sink)?;
                }
            }
            sink.on_array_end()?;
            Ok(true)
        }
        (GeometryType::GeometryCollection, Node::Members(_)) | (GeometryType::Unknown, _) => {
            emit_generic(body, dimension, path, sink)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn emit(geometry: &Geometry, path: &[String], sink: &mut dyn FeatureSink) -> Result<()> {
    let mut header = GeometryHeader::new(geometry.geometry_type);
    header.dimension = geometry.dimension;
    sink.on_object_start(path, Some(header))?;

    if let Some(body) = &geometry.body {
        let dimension = geometry.dimension.unwrap_or(2);
        if !emit_body(geometry.geometry_type, body, dimension, path, sink)? {
            return Err(Error::parse(
                format!("unexpected nesting for {}", geometry.geometry_type),
                path.join("."),
                0,
            ));
        }
    }

    sink.on_object_end()
}

fn collection_dimension(geometry: &mut Geometry) {
    if geometry.dimension.is_none() {
        if let Some(Node::Members(members)) = &mut geometry.body {
            for member in members.iter_mut() {
                collection_dimension(member);
            }
            geometry.dimension = members.iter().find_map(|member| member.dimension);
        }
    }
}

/// Decodes one WKT (or EWKT) geometry and emits it at `path`.
///
/// # Errors
///
/// [`Error::Parse`] for malformed text; the offset is the position in `text`.
pub fn decode_wkt(text: &str, path: &[String], sink: &mut dyn FeatureSink) -> Result<()> {
    let mut cursor = Cursor {
        text,
        pos: 0,
        path: path.join("."),
    };
    cursor.skip_srid()?;
    let mut geometry = cursor.geometry()?;
    if cursor.peek().is_some() {
        return Err(cursor.error("trailing characters after geometry"));
    }
    collection_dimension(&mut geometry);

    emit(&geometry, path, sink)
}
