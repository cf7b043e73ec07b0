//! Per-column record-set filters.

use std::collections::BTreeMap;

use crate::value::Value;

/// A filter on one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value`
    Equals(Value),
    /// `column BETWEEN from AND to` (closed range)
    Range { from: Value, to: Value },
}

impl Filter {
    pub fn equals(value: impl Into<Value>) -> Self {
        Filter::Equals(value.into())
    }

    pub fn range(from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Filter::Range {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Number of bound parameters this filter contributes.
    pub fn param_count(&self) -> usize {
        match self {
            Filter::Equals(_) => 1,
            Filter::Range { .. } => 2,
        }
    }

    /// The values to bind, in placeholder order.
    pub fn params(&self) -> Vec<&Value> {
        match self {
            Filter::Equals(v) => vec![v],
            Filter::Range { from, to } => vec![from, to],
        }
    }

    pub(crate) fn is_range(&self) -> bool {
        matches!(self, Filter::Range { .. })
    }
}

/// Filters keyed by column name. All entries are ANDed; iteration order is
/// the column-name order, which fixes the placeholder order.
pub type FilterMap = BTreeMap<String, Filter>;

/// Flattens the bound values of a filter map in placeholder order.
pub fn filter_params(filters: &FilterMap) -> Vec<Value> {
    filters
        .values()
        .flat_map(|f| f.params().into_iter().cloned())
        .collect()
}
