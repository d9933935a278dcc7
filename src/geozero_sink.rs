//! Replays the canonical event stream into a geozero [`FeatureProcessor`].
//!
//! Any geozero writer (`GeoJsonWriter`, `WktWriter`, `GeoWriter`, ...) can so act as the output
//! encoder of a decoder. Properties are reported with their path joined by `.`; a property that
//! occurs more than once in a feature (array elements) is reported once as a JSON array.
//! Only the first geometry of a feature is handed to the processor.
use geozero::{ColumnValue, FeatureProcessor};
use tracing::debug;

use crate::{
    error::{Error, Result},
    event::{FeatureSink, GeometryHeader, GeometryType, ValueType},
    value::PropertyValue,
};

#[derive(Debug)]
enum Node {
    Geometry {
        geometry_type: GeometryType,
        dimension: usize,
        children: Vec<Node>,
    },
    Array(Vec<Node>),
    Number(f64),
}

impl Node {
    fn children(&self) -> &[Node] {
        match self {
            Node::Geometry { children, .. } | Node::Array(children) => children,
            Node::Number(_) => &[],
        }
    }

    /// The single array directly below a geometry object, if any.
    fn body(&self) -> &[Node] {
        match self.children() {
            [Node::Array(children)] => children,
            _ => &[],
        }
    }

    fn numbers(&self, into: &mut Vec<f64>) {
        match self {
            Node::Number(value) => into.push(*value),
            other => other.children().iter().for_each(|child| child.numbers(into)),
        }
    }

    fn flat(&self) -> Vec<f64> {
        let mut numbers = Vec::new();
        self.numbers(&mut numbers);
        numbers
    }
}

/// Buffers one feature until its end, then replays it into `P`.
#[derive(Debug)]
pub struct GeozeroSink<P> {
    processor: P,
    feature_index: u64,
    properties: Vec<(String, Vec<PropertyValue>)>,
    geometry: Option<Node>,
    open: Vec<Node>,
}

impl<P: FeatureProcessor> GeozeroSink<P> {
    #[must_use]
    pub fn new(processor: P) -> Self {
        Self {
            processor,
            feature_index: 0,
            properties: Vec::new(),
            geometry: None,
            open: Vec::new(),
        }
    }

    #[must_use]
    pub fn into_inner(self) -> P {
        self.processor
    }

    fn close_node(&mut self) {
        let Some(node) = self.open.pop() else {
            return;
        };
        match self.open.last_mut() {
            Some(Node::Geometry { children, .. } | Node::Array(children)) => children.push(node),
            Some(Node::Number(_)) => {}
            None if self.geometry.is_none() => self.geometry = Some(node),
            None => debug!("dropping additional geometry of feature {}", self.feature_index),
        }
    }

    fn write_properties(&mut self) -> Result<()> {
        self.processor.properties_begin()?;
        for (index, (name, values)) in self.properties.iter().enumerate() {
            match values.as_slice() {
                [value] => {
                    self.processor
                        .property(index, name, &value.as_column_value())?;
                }
                values => {
                    let json = serde_json::Value::Array(
                        values.iter().map(PropertyValue::to_json).collect(),
                    )
                    .to_string();
                    self.processor
                        .property(index, name, &ColumnValue::Json(&json))?;
                }
            }
        }
        self.processor.properties_end()?;
        Ok(())
    }

    fn write_positions(&mut self, numbers: &[f64], dimension: usize) -> Result<()> {
        if dimension < 2 || numbers.len() % dimension != 0 {
            return Err(Error::coordinates(
                format!("{} values", numbers.len()),
                format!("not a multiple of dimension {dimension}"),
            ));
        }
        let multi_dim = self.processor.multi_dim();
        for (index, position) in numbers.chunks_exact(dimension).enumerate() {
            if multi_dim {
                let z = (dimension > 2).then(|| position[2]);
                self.processor
                    .coordinate(position[0], position[1], z, None, None, None, index)?;
            } else {
                self.processor.xy(position[0], position[1], index)?;
            }
        }
        Ok(())
    }

    fn write_line(&mut self, run: &Node, dimension: usize, tagged: bool, index: usize) -> Result<()> {
        let numbers = run.flat();
        self.processor
            .linestring_begin(tagged, numbers.len() / dimension.max(1), index)?;
        self.write_positions(&numbers, dimension)?;
        self.processor.linestring_end(tagged, index)?;
        Ok(())
    }

    fn write_polygon(
        &mut self,
        rings: &[Node],
        dimension: usize,
        tagged: bool,
        index: usize,
    ) -> Result<()> {
        self.processor.polygon_begin(tagged, rings.len(), index)?;
        for (ring_index, ring) in rings.iter().enumerate() {
            self.write_line(ring, dimension, false, ring_index)?;
        }
        self.processor.polygon_end(tagged, index)?;
        Ok(())
    }

    fn write_geometry(&mut self, node: &Node, index: usize) -> Result<()> {
        let Node::Geometry {
            geometry_type,
            dimension,
            ..
        } = node
        else {
            return Ok(());
        };
        let dimension = *dimension;

        match geometry_type {
            GeometryType::Point => {
                let numbers = node.flat();
                if numbers.is_empty() {
                    self.processor.empty_point(index)?;
                } else {
                    self.processor.point_begin(index)?;
                    self.write_positions(&numbers, dimension)?;
                    self.processor.point_end(index)?;
                }
            }
            GeometryType::LineString => self.write_line(node, dimension, true, index)?,
            GeometryType::Polygon => self.write_polygon(node.body(), dimension, true, index)?,
            GeometryType::MultiPoint => {
                let numbers = node.flat();
                self.processor
                    .multipoint_begin(numbers.len() / dimension.max(1), index)?;
                self.write_positions(&numbers, dimension)?;
                self.processor.multipoint_end(index)?;
            }
            GeometryType::MultiLineString => {
                let lines = node.body();
                self.processor.multilinestring_begin(lines.len(), index)?;
                for (line_index, line) in lines.iter().enumerate() {
                    self.write_line(line, dimension, false, line_index)?;
                }
                self.processor.multilinestring_end(index)?;
            }
            GeometryType::MultiPolygon => {
                let polygons = node.body();
                self.processor.multipolygon_begin(polygons.len(), index)?;
                for (polygon_index, polygon) in polygons.iter().enumerate() {
                    self.write_polygon(polygon.children(), dimension, false, polygon_index)?;
                }
                self.processor.multipolygon_end(index)?;
            }
            GeometryType::GeometryCollection => {
                let members = node.body();
                self.processor
                    .geometrycollection_begin(members.len(), index)?;
                for (member_index, member) in members.iter().enumerate() {
                    self.write_geometry(member, member_index)?;
                }
                self.processor.geometrycollection_end(index)?;
            }
            GeometryType::Unknown => {
                debug!("skipping geometry of unknown type");
            }
        }
        Ok(())
    }
}

impl<P: FeatureProcessor> FeatureSink for GeozeroSink<P> {
    fn on_start(
        &mut self,
        _number_returned: Option<u64>,
        _number_matched: Option<u64>,
    ) -> Result<()> {
        self.processor.dataset_begin(None)?;
        Ok(())
    }

    fn on_feature_start(&mut self) -> Result<()> {
        self.properties.clear();
        self.geometry = None;
        self.open.clear();
        Ok(())
    }

    fn on_object_start(
        &mut self,
        _path: &[String],
        geometry: Option<GeometryHeader>,
    ) -> Result<()> {
        match geometry {
            Some(header) => self.open.push(Node::Geometry {
                geometry_type: header.geometry_type,
                dimension: header.dimension.unwrap_or(2),
                children: Vec::new(),
            }),
            None if !self.open.is_empty() => self.open.push(Node::Array(Vec::new())),
            None => {}
        }
        Ok(())
    }

    fn on_array_start(&mut self, _path: &[String]) -> Result<()> {
        if !self.open.is_empty() {
            self.open.push(Node::Array(Vec::new()));
        }
        Ok(())
    }

    fn on_value(&mut self, path: &[String], value: &str, value_type: ValueType) -> Result<()> {
        if let Some(Node::Geometry { children, .. } | Node::Array(children)) = self.open.last_mut()
        {
            let number = value
                .parse()
                .map_err(|_| Error::coordinates(value, "not a number"))?;
            children.push(Node::Number(number));
            return Ok(());
        }

        let name = path.join(".");
        let value = PropertyValue::parse(value, value_type);
        match self.properties.iter_mut().find(|(known, _)| *known == name) {
            Some((_, values)) => values.push(value),
            None => self.properties.push((name, vec![value])),
        }
        Ok(())
    }

    fn on_array_end(&mut self) -> Result<()> {
        self.close_node();
        Ok(())
    }

    fn on_object_end(&mut self) -> Result<()> {
        self.close_node();
        Ok(())
    }

    fn on_feature_end(&mut self) -> Result<()> {
        let index = self.feature_index;
        self.processor.feature_begin(index)?;
        self.write_properties()?;
        if let Some(geometry) = self.geometry.take() {
            self.processor.geometry_begin()?;
            self.write_geometry(&geometry, 0)?;
            self.processor.geometry_end()?;
        }
        self.processor.feature_end(index)?;
        self.feature_index += 1;
        Ok(())
    }

    fn on_end(&mut self) -> Result<()> {
        self.processor.dataset_end()?;
        Ok(())
    }
}
