//! Structured query parameters.
//!
//! Parameters are kept as an ordered list of pairs and handed to reqwest,
//! which owns URL encoding. Absent values are skipped instead of being sent
//! as the literal text `undefined` or `null`.

/// Ordered query parameters with an optional key prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    prefix: Option<String>,
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Create an empty parameter list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty parameter list whose keys are all prefixed,
    /// e.g. `lookupRequest.`.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            pairs: Vec::new(),
        }
    }

    /// Append a parameter.
    #[must_use]
    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        let key = match &self.prefix {
            Some(prefix) => format!("{prefix}{key}"),
            None => key.to_string(),
        };
        self.pairs.push((key, value.to_string()));
        self
    }

    /// Append a parameter if a value is present.
    #[must_use]
    pub fn opt_param<T: ToString>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    /// Get the encoded-later pairs in insertion order.
    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Check whether no parameters were added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
