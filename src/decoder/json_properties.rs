use super::{json_null, json_scalar};
use crate::{
    error::Result,
    event::FeatureSink,
    path::PathTracker,
    tokenizer::json::{JsonToken, TokenKind},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nesting {
    Object,
    Array,
}

/// Emits the members of a JSON object as property events.
///
/// Started after the opening brace of the object was consumed; every token up to and including
/// the matching closing brace must be passed to [`PropertiesReader::token`]. Paths are `base`
/// followed by the member names; array elements share the path of their array.
#[derive(Debug)]
pub(crate) struct PropertiesReader {
    base: Vec<String>,
    tracker: PathTracker,
    open: Vec<(Nesting, usize)>,
    null_value: Option<String>,
}

impl PropertiesReader {
    pub(crate) fn new(base: Vec<String>, null_value: Option<String>) -> Self {
        Self {
            base,
            tracker: PathTracker::new(),
            open: Vec::new(),
            null_value,
        }
    }

    /// At member level of the object the reader was started in.
    pub(crate) fn at_top(&self) -> bool {
        self.open.is_empty()
    }

    pub(crate) fn path(&self, name: Option<&str>) -> Vec<String> {
        let mut path = self.base.clone();
        path.extend(self.tracker.as_path());
        path.extend(name.map(ToString::to_string));
        path
    }

    pub(crate) fn current_path(&self) -> String {
        self.path(None).join(".")
    }

    /// Handles one token. Returns `true` once the object the reader was started in is closed.
    pub(crate) fn token(&mut self, token: JsonToken, sink: &mut dyn FeatureSink) -> Result<bool> {
        let JsonToken { name, kind } = token;

        match kind {
            TokenKind::StartObject | TokenKind::StartArray => {
                let nesting = if kind == TokenKind::StartObject {
                    Nesting::Object
                } else {
                    Nesting::Array
                };
                let restore = match &name {
                    Some(name) => {
                        let restore = self.tracker.depth();
                        self.tracker.track(name, nesting == Nesting::Array);
                        restore
                    }
                    None => {
                        self.tracker.next_element();
                        let restore = self.tracker.depth();
                        if nesting == Nesting::Array {
                            self.tracker.track_anonymous_array();
                        }
                        restore
                    }
                };
                self.open.push((nesting, restore));

                let path = self.path(None);
                match nesting {
                    Nesting::Object => sink.on_object_start(&path, None)?,
                    Nesting::Array => sink.on_array_start(&path)?,
                }
                Ok(false)
            }
            TokenKind::EndObject | TokenKind::EndArray => {
                let Some((nesting, restore)) = self.open.pop() else {
                    return Ok(true);
                };
                self.tracker.truncate(restore);
                match nesting {
                    Nesting::Object => sink.on_object_end()?,
                    Nesting::Array => sink.on_array_end()?,
                }
                Ok(false)
            }
            kind => {
                if name.is_none() {
                    self.tracker.next_element();
                }
                let path = self.path(name.as_deref());
                match json_scalar(kind) {
                    Some((value, value_type)) => sink.on_value(&path, &value, value_type)?,
                    None => json_null(&path, self.null_value.as_deref(), sink)?,
                }
                Ok(false)
            }
        }
    }
}
