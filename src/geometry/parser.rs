//! Tokenizes coordinate text (`7.1 50.7 7.2 50.8`, `7.1,50.7 7.2,50.8`) into a flat run of
//! numbers.
use crate::error::{Error, Result};

fn is_separator(chr: char) -> bool {
    matches!(chr, ' ' | '\n' | '\t' | '\r' | ',')
}

/// Incremental coordinate text parser.
///
/// Text may arrive in pieces split anywhere, even inside a number; a number is only parsed once
/// a separator or [`CoordinatesParser::finish`] shows it is complete.
#[derive(Debug, Default)]
pub struct CoordinatesParser {
    partial: String,
    values: Vec<f64>,
}

impl CoordinatesParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses all numbers completed by `text`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCoordinates`] if a completed token is not a number.
    pub fn push(&mut self, text: &str) -> Result<()> {
        for chr in text.chars() {
            if is_separator(chr) {
                self.complete()?;
            } else {
                self.partial.push(chr);
            }
        }
        Ok(())
    }

    fn complete(&mut self) -> Result<()> {
        if self.partial.is_empty() {
            return Ok(());
        }
        let value = self
            .partial
            .parse::<f64>()
            .map_err(|err| Error::coordinates(self.partial.as_str(), err.to_string()))?;
        self.values.push(value);
        self.partial.clear();
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.partial.is_empty()
    }

    /// Completes a pending number and returns the whole run.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCoordinates`] if the last token is not a number.
    pub fn finish(mut self) -> Result<Vec<f64>> {
        self.complete()?;
        Ok(self.values)
    }
}

/// Parses a complete coordinate text.
///
/// # Errors
///
/// [`Error::InvalidCoordinates`] if a token is not a number.
pub fn parse_coordinates(text: &str) -> Result<Vec<f64>> {
    let mut parser = CoordinatesParser::new();
    parser.push(text)?;
    parser.finish()
}
