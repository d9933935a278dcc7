//! Tracks the property path and array multiplicities while a decoder walks nested input.

#[derive(Debug, Clone, PartialEq, Eq)]
struct Level {
    name: Option<String>,
    multiplicity: Option<usize>,
}

/// Current nested property path of a decoder.
///
/// Each level is either a named property (`track`) or an anonymous array nested directly in
/// another array (`track_anonymous_array`). Array levels count their elements; the counts are
/// reported by [`PathTracker::multiplicities`] and never show up in [`PathTracker::as_path`], so
/// paths stay the same for every element of a variable-length array.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathTracker {
    levels: Vec<Level>,
}

impl PathTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a named segment. Array segments start with a multiplicity of 0.
    pub fn track(&mut self, name: &str, is_array: bool) {
        self.levels.push(Level {
            name: Some(name.to_string()),
            multiplicity: is_array.then_some(0),
        });
    }

    /// Appends an array level that has no name of its own, e.g. `[[1, 2], [3]]`.
    pub fn track_anonymous_array(&mut self) {
        self.levels.push(Level {
            name: None,
            multiplicity: Some(0),
        });
    }

    /// Truncates the path back to `depth` levels.
    pub fn truncate(&mut self, depth: usize) {
        self.levels.truncate(depth);
    }

    /// Replaces the whole path.
    pub fn reset_to(&mut self, path: &[String]) {
        self.levels.clear();
        for name in path {
            self.track(name, false);
        }
    }

    /// Counts one more element in the innermost level, if it is an array.
    pub fn next_element(&mut self) {
        if let Some(Level {
            multiplicity: Some(count),
            ..
        }) = self.levels.last_mut()
        {
            *count += 1;
        }
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    #[must_use]
    pub fn in_array(&self) -> bool {
        self.levels
            .last()
            .is_some_and(|level| level.multiplicity.is_some())
    }

    #[must_use]
    pub fn as_path(&self) -> Vec<String> {
        self.levels
            .iter()
            .filter_map(|level| level.name.clone())
            .collect()
    }

    /// Element counts of all array levels, outermost first.
    #[must_use]
    pub fn multiplicities(&self) -> Vec<usize> {
        self.levels
            .iter()
            .filter_map(|level| level.multiplicity)
            .collect()
    }

    /// Flattened rendering joined by `separator`, with 1-based array positions appended to
    /// array segments, e.g. `address.lines[2]`.
    #[must_use]
    pub fn flatten(&self, separator: &str) -> String {
        let mut flat = String::new();
        for level in &self.levels {
            if let Some(name) = &level.name {
                if !flat.is_empty() {
                    flat.push_str(separator);
                }
                flat.push_str(name);
            }
            if let Some(count) = level.multiplicity.filter(|count| *count > 0) {
                flat.push_str(&format!("[{count}]"));
            }
        }
        flat
    }
}

impl std::fmt::Display for PathTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_path().join("."))
    }
}

#[cfg(test)]
mod test {
    use super::PathTracker;

    #[test]
    fn test_track_and_truncate() {
        let mut tracker = PathTracker::new();
        tracker.track("address", false);
        tracker.track("lines", true);

        assert_eq!(tracker.as_path(), vec!["address", "lines"]);
        assert_eq!(tracker.depth(), 2);

        tracker.truncate(1);
        assert_eq!(tracker.as_path(), vec!["address"]);

        tracker.truncate(5);
        assert_eq!(tracker.depth(), 1);

        tracker.truncate(0);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_multiplicities_do_not_change_path() {
        let mut tracker = PathTracker::new();
        tracker.track("rel", true);
        tracker.next_element();
        let first = tracker.as_path();
        tracker.next_element();

        assert_eq!(tracker.as_path(), first);
        assert_eq!(tracker.multiplicities(), vec![2]);
        assert!(tracker.in_array());
    }

    #[test]
    fn test_anonymous_arrays_count_but_have_no_name() {
        let mut tracker = PathTracker::new();
        tracker.track("matrix", true);
        tracker.next_element();
        tracker.track_anonymous_array();
        tracker.next_element();
        tracker.next_element();

        assert_eq!(tracker.as_path(), vec!["matrix"]);
        assert_eq!(tracker.multiplicities(), vec![1, 2]);
        assert_eq!(tracker.flatten("."), "matrix[1][2]");
    }

    #[test]
    fn test_flatten_with_custom_separator() {
        let mut tracker = PathTracker::new();
        tracker.track("a", false);
        tracker.track("b", true);
        tracker.next_element();
        tracker.track("c", false);

        assert_eq!(tracker.flatten("/"), "a/b[1]/c");
        assert_eq!(tracker.to_string(), "a.b.c");
    }

    #[test]
    fn test_next_element_ignores_object_levels() {
        let mut tracker = PathTracker::new();
        tracker.track("a", false);
        tracker.next_element();

        assert!(tracker.multiplicities().is_empty());
    }
}
