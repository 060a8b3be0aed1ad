use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Code returned for values that were never passed to [`CategoricalEncoder::fit`].
pub const UNSEEN_CODE: i64 = -1;

/// Maps raw categorical strings to integer codes in first-seen order.
///
/// Codes only grow: refitting appends new values and never renumbers existing ones,
/// so a retrained model reads old codes the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoricalEncoder {
    classes: IndexSet<String>,
}

impl CategoricalEncoder {
    /// Creates an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a code to every value not seen before. Repeated values are ignored.
    pub fn fit<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for value in values {
            let value = value.as_ref();
            if !self.classes.contains(value) {
                self.classes.insert(value.to_owned());
            }
        }
    }

    /// Returns the code for `value`, or [`UNSEEN_CODE`] when it was never fitted.
    #[must_use]
    pub fn encode(&self, value: &str) -> i64 {
        self.classes
            .get_index_of(value)
            .and_then(|index| i64::try_from(index).ok())
            .unwrap_or(UNSEEN_CODE)
    }

    /// Returns the value behind a code.
    #[must_use]
    pub fn decode(&self, code: i64) -> Option<&str> {
        usize::try_from(code)
            .ok()
            .and_then(|index| self.classes.get_index(index))
            .map(String::as_str)
    }

    /// True when `value` has a code.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        self.classes.contains(value)
    }

    /// Known values in code order.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(String::as_str)
    }

    /// Number of known values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// True before the first fit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_first_seen_order() {
        let mut encoder = CategoricalEncoder::new();
        encoder.fit(["Juvenil A", "Cadete", "Juvenil A", "Infantil"]);
        assert_eq!(encoder.encode("Juvenil A"), 0);
        assert_eq!(encoder.encode("Cadete"), 1);
        assert_eq!(encoder.encode("Infantil"), 2);
        assert_eq!(encoder.len(), 3);
    }

    #[test]
    fn codes_are_stable_across_calls_and_refits() {
        let mut encoder = CategoricalEncoder::new();
        encoder.fit(["Lunes", "Martes"]);
        let before = encoder.encode("Martes");
        for _ in 0..3 {
            let _ = encoder.encode("Lunes");
        }
        encoder.fit(["Viernes", "Martes", "Lunes"]);
        assert_eq!(encoder.encode("Martes"), before);
        assert_eq!(encoder.encode("Viernes"), 2);
        assert_eq!(encoder.decode(2), Some("Viernes"));
    }

    #[test]
    fn unseen_values_get_the_sentinel() {
        let mut encoder = CategoricalEncoder::new();
        assert_eq!(encoder.encode("anything"), UNSEEN_CODE);
        encoder.fit(["inicial"]);
        assert_eq!(encoder.encode("global"), UNSEEN_CODE);
        assert_eq!(encoder.encode(""), UNSEEN_CODE);
        assert_eq!(encoder.decode(UNSEEN_CODE), None);
    }

    #[test]
    fn serializes_as_ordered_list() {
        let mut encoder = CategoricalEncoder::new();
        encoder.fit(["b", "a"]);
        let json = serde_json::to_string(&encoder).unwrap();
        assert_eq!(json, r#"["b","a"]"#);
        let back: CategoricalEncoder = serde_json::from_str(&json).unwrap();
        assert_eq!(back.encode("a"), 1);
    }
}
