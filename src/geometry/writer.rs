//! Terminal stages of the coordinate chain: text output and re-emission as feature events.
use crate::{
    error::{Error, Result},
    event::{FeatureSink, ValueType},
};

/// Receives transformed coordinate runs.
pub trait CoordinatesWriter {
    /// Writes one run of `dimension`-tuples.
    ///
    /// # Errors
    ///
    /// Whatever the underlying output reports.
    fn write(&mut self, coordinates: &[f64], dimension: usize) -> Result<()>;
}

/// Rounds to a fixed number of decimal places and prints the shortest representation.
///
/// A precision of 0 leaves values as they are.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinateFormatter {
    precision: usize,
}

impl CoordinateFormatter {
    #[must_use]
    pub fn new(precision: usize) -> Self {
        Self { precision }
    }

    #[must_use]
    pub fn precision(&self) -> usize {
        self.precision
    }

    #[must_use]
    pub fn round(&self, value: f64) -> f64 {
        if self.precision == 0 {
            return value;
        }
        let factor = 10f64.powi(i32::try_from(self.precision).unwrap_or(i32::MAX));
        if !factor.is_finite() {
            return value;
        }
        (value * factor).round() / factor
    }

    #[must_use]
    pub fn format(&self, value: f64) -> String {
        let rounded = self.round(value);
        // avoid "-0"
        if rounded == 0.0 {
            return "0".to_string();
        }
        rounded.to_string()
    }
}

fn check_dimension(coordinates: &[f64], dimension: usize) -> Result<()> {
    if dimension == 0 || coordinates.len() % dimension != 0 {
        return Err(Error::coordinates(
            format!("{} values", coordinates.len()),
            format!("not a multiple of dimension {dimension}"),
        ));
    }
    Ok(())
}

/// Writes runs as text, tuples separated by `", "` and values by `' '`, e.g. `7.1 50.7, 7.2 50.8`.
#[derive(Debug, Default)]
pub struct TextCoordinatesWriter {
    formatter: CoordinateFormatter,
    output: String,
}

impl TextCoordinatesWriter {
    #[must_use]
    pub fn new(formatter: CoordinateFormatter) -> Self {
        Self {
            formatter,
            output: String::new(),
        }
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.output
    }
}

impl CoordinatesWriter for TextCoordinatesWriter {
    fn write(&mut self, coordinates: &[f64], dimension: usize) -> Result<()> {
        check_dimension(coordinates, dimension)?;
        for tuple in coordinates.chunks_exact(dimension) {
            if !self.output.is_empty() {
                self.output.push_str(", ");
            }
            let formatted: Vec<String> = tuple.iter().map(|v| self.formatter.format(*v)).collect();
            self.output.push_str(&formatted.join(" "));
        }
        Ok(())
    }
}

/// Re-emits each run as `ArrayStart(path)`, one `Value(path)` per number, `ArrayEnd`.
pub struct FeatureTokenWriter<'a> {
    sink: &'a mut dyn FeatureSink,
    path: &'a [String],
    formatter: CoordinateFormatter,
}

impl<'a> FeatureTokenWriter<'a> {
    pub fn new(
        sink: &'a mut dyn FeatureSink,
        path: &'a [String],
        formatter: CoordinateFormatter,
    ) -> Self {
        Self {
            sink,
            path,
            formatter,
        }
    }
}

impl CoordinatesWriter for FeatureTokenWriter<'_> {
    fn write(&mut self, coordinates: &[f64], dimension: usize) -> Result<()> {
        check_dimension(coordinates, dimension)?;
        self.sink.on_array_start(self.path)?;
        for value in coordinates {
            let text = self.formatter.format(*value);
            let value_type = if text.contains(['.', 'e', 'E']) {
                ValueType::Float
            } else {
                ValueType::Integer
            };
            self.sink.on_value(self.path, &text, value_type)?;
        }
        self.sink.on_array_end()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::FeatureEvent;

    #[test]
    fn test_formatter_rounds() {
        let formatter = CoordinateFormatter::new(2);

        assert_eq!(formatter.format(7.123_456), "7.12");
        assert_eq!(formatter.format(7.0), "7");
        assert_eq!(formatter.format(-0.001), "0");
        assert_eq!(CoordinateFormatter::new(0).format(7.123_456), "7.123456");
    }

    #[test]
    fn test_text_writer() -> Result<()> {
        let mut writer = TextCoordinatesWriter::new(CoordinateFormatter::new(1));
        writer.write(&[7.14, 50.66, 7.2, 50.8], 2)?;

        assert_eq!(writer.into_string(), "7.1 50.7, 7.2 50.8");
        Ok(())
    }

    #[test]
    fn test_text_writer_rejects_partial_tuple() {
        let mut writer = TextCoordinatesWriter::default();

        assert!(writer.write(&[1.0, 2.0, 3.0], 2).is_err());
    }

    #[test]
    fn test_feature_token_writer() -> Result<()> {
        let path = vec!["geometry".to_string()];
        let mut events: Vec<FeatureEvent> = Vec::new();
        FeatureTokenWriter::new(&mut events, &path, CoordinateFormatter::default())
            .write(&[7.5, 50.0], 2)?;

        assert_eq!(
            events,
            vec![
                FeatureEvent::ArrayStart { path: path.clone() },
                FeatureEvent::Value {
                    path: path.clone(),
                    value: "7.5".to_string(),
                    value_type: ValueType::Float
                },
                FeatureEvent::Value {
                    path: path.clone(),
                    value: "50".to_string(),
                    value_type: ValueType::Integer
                },
                FeatureEvent::ArrayEnd,
            ]
        );
        Ok(())
    }
}
