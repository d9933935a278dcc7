//! Decoder for tabular query results.
//!
//! The query layer delivers the rows of the main table and of joined tables ordered by feature
//! id. Rows of the main table have an empty table path; the rows of a joined table become an
//! array of objects at the table path, one object per row.
use tracing::{debug, trace};

use super::json_null;
use crate::{
    config::DecoderOptions,
    error::{Error, Result},
    event::{FeatureSink, ValueType},
    wkt::decode_wkt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    String,
    Integer,
    Float,
    Boolean,
    /// WKT or EWKT text.
    Geometry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlColumn {
    pub name: String,
    pub value: Option<String>,
    pub kind: ColumnKind,
}

impl SqlColumn {
    #[must_use]
    pub fn new(name: impl Into<String>, value: Option<&str>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            value: value.map(ToString::to_string),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlRow {
    /// Counts of one query; counts of several meta rows add up.
    Meta {
        number_returned: u64,
        number_matched: Option<u64>,
    },
    Values {
        feature_id: String,
        table_path: Vec<String>,
        columns: Vec<SqlColumn>,
    },
}

#[derive(Debug, Default)]
pub struct RowDecoder {
    options: DecoderOptions,
    number_returned: Option<u64>,
    number_matched: Option<u64>,
    started: bool,
    current_id: Option<String>,
    open_table: Option<Vec<String>>,
    finished: bool,
}

impl RowDecoder {
    #[must_use]
    pub fn new(options: DecoderOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    fn start(&mut self, sink: &mut dyn FeatureSink) -> Result<()> {
        if !self.started {
            self.started = true;
            debug!(
                number_returned = ?self.number_returned,
                number_matched = ?self.number_matched,
                "start of row stream"
            );
            sink.on_start(self.number_returned, self.number_matched)?;
        }
        Ok(())
    }

    fn close_table(&mut self, sink: &mut dyn FeatureSink) -> Result<()> {
        if self.open_table.take().is_some() {
            sink.on_array_end()?;
        }
        Ok(())
    }

    fn close_feature(&mut self, sink: &mut dyn FeatureSink) -> Result<()> {
        self.close_table(sink)?;
        if self.current_id.take().is_some() {
            sink.on_feature_end()?;
        }
        Ok(())
    }

    /// Handles the next row.
    ///
    /// # Errors
    ///
    /// [`Error::Parse`] for invalid geometry text, [`Error::EventOrder`] for rows after
    /// [`RowDecoder::finish`], otherwise whatever the sink reports.
    pub fn on_row(&mut self, row: SqlRow, sink: &mut dyn FeatureSink) -> Result<()> {
        if self.finished {
            return Err(Error::EventOrder("row after the end of the stream".to_string()));
        }

        let (feature_id, table_path, columns) = match row {
            SqlRow::Meta {
                number_returned,
                number_matched,
            } => {
                if self.started {
                    debug!("ignoring meta row after the first feature");
                    return Ok(());
                }
                let returned = self.number_returned.get_or_insert(0);
                *returned = returned.saturating_add(number_returned);
                if let Some(number_matched) = number_matched {
                    let matched = self.number_matched.get_or_insert(0);
                    *matched = matched.saturating_add(number_matched);
                }
                return Ok(());
            }
            SqlRow::Values {
                feature_id,
                table_path,
                columns,
            } => (feature_id, table_path, columns),
        };
        trace!(%feature_id, ?table_path, "row");

        self.start(sink)?;
        if self.current_id.as_deref() != Some(feature_id.as_str()) {
            self.close_feature(sink)?;
            sink.on_feature_start()?;
            self.current_id = Some(feature_id);
        }

        let nested = !table_path.is_empty();
        if self.open_table.as_ref() != Some(&table_path) {
            self.close_table(sink)?;
            if nested {
                sink.on_array_start(&table_path)?;
                self.open_table = Some(table_path.clone());
            }
        }
        if nested {
            sink.on_object_start(&table_path, None)?;
        }

        for column in columns {
            let mut path = table_path.clone();
            path.push(column.name);

            let value_type = match column.kind {
                ColumnKind::String => ValueType::String,
                ColumnKind::Integer => ValueType::Integer,
                ColumnKind::Float => ValueType::Float,
                ColumnKind::Boolean => ValueType::Boolean,
                ColumnKind::Geometry => {
                    if let Some(wkt) = &column.value {
                        decode_wkt(wkt, &path, sink)?;
                    }
                    continue;
                }
            };
            match &column.value {
                Some(value) => sink.on_value(&path, value, value_type)?,
                None => json_null(&path, self.options.null_value.as_deref(), sink)?,
            }
        }

        if nested {
            sink.on_object_end()?;
        }
        Ok(())
    }

    /// Closes the open feature and the stream.
    ///
    /// # Errors
    ///
    /// Whatever the sink reports.
    pub fn finish(&mut self, sink: &mut dyn FeatureSink) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.start(sink)?;
        self.close_feature(sink)?;
        self.finished = true;
        debug!("end of row stream");
        sink.on_end()
    }
}
