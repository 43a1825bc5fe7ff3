//! Equality-only label selectors
//!
//! Parses `key=value[,key=value...]` strings into a set of required labels and
//! renders them back into the `labelSelector` form the Kubernetes API expects.

use std::collections::BTreeMap;
use std::fmt;

/// A conjunction of `key=value` label requirements
///
/// Keys are kept sorted so the rendered selector is stable across restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Parse a selector string
    ///
    /// Clauses are separated by `,`. A clause must contain exactly one `=`;
    /// anything else is dropped without error. Empty input yields an empty
    /// selector, which callers must reject themselves (see `Config::validate`).
    ///
    /// # Examples
    ///
    /// ```
    /// use metrics_k8s_proxy::discovery::LabelSelector;
    ///
    /// let selector = LabelSelector::parse("app=ztunnel,tier");
    /// assert_eq!(selector.get("app"), Some("ztunnel"));
    /// assert_eq!(selector.len(), 1);
    /// ```
    pub fn parse(input: &str) -> Self {
        let labels = input
            .split(',')
            .filter_map(|clause| {
                let mut parts = clause.split('=');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(key), Some(value), None) => Some((key.to_string(), value.to_string())),
                    _ => None,
                }
            })
            .collect();

        Self { labels }
    }

    /// Look up the required value for a label key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Number of label requirements
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True when no requirement survived parsing
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Renders `k1=v1,k2=v2` with keys in sorted order
impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (key, value)) in self.labels.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}
