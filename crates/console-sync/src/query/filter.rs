//! Filter: builds `$filter` expressions from query options.
//!
//! Every value becomes a case-insensitive substring clause
//! (`field eq '*value*'`); clauses are joined by the declared occurrence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pseudo-field the backend expands to "match against every field".
pub const ALL_FIELDS: &str = "ALL_FIELDS";

/// Untagged search terms are stored under this key.
pub const ANY_KEY: &str = "any";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Occurrence {
    Any,
    #[default]
    All,
}

impl Occurrence {
    fn operator(self) -> &'static str {
        match self {
            Occurrence::Any => "or",
            Occurrence::All => "and",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default)]
    pub occurrence: Occurrence,
    /// Sorted by field name so the built expression is deterministic.
    #[serde(default)]
    pub filters: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub order_by: Option<String>,
}

impl QueryOptions {
    pub fn new(occurrence: Occurrence) -> Self {
        Self {
            occurrence,
            ..Default::default()
        }
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.entry(field.into()).or_default().push(value.into());
        self
    }

    /// Free-text term matched against all fields.
    pub fn any(self, value: impl Into<String>) -> Self {
        self.filter(ANY_KEY, value)
    }

    pub fn ordered_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    pub fn is_match_all(&self) -> bool {
        self.filters
            .values()
            .all(|values| values.iter().all(|v| v.trim().is_empty()))
    }
}

/// Build the `$filter` expression, or `None` when the options match everything.
pub fn build_filter(options: &QueryOptions) -> Option<String> {
    let clauses: Vec<String> = options
        .filters
        .iter()
        .flat_map(|(field, values)| {
            let field = if field == ANY_KEY { ALL_FIELDS } else { field.as_str() };
            values
                .iter()
                .filter(|value| !value.trim().is_empty())
                .map(move |value| clause(field, value))
        })
        .collect();

    if clauses.is_empty() {
        return None;
    }

    let separator = format!(" {} ", options.occurrence.operator());
    Some(clauses.join(&separator))
}

fn clause(field: &str, value: &str) -> String {
    // OData string literals escape a quote by doubling it
    let literal = value.trim().to_lowercase().replace('\'', "''");
    format!("{} eq '*{}*'", field, literal)
}
