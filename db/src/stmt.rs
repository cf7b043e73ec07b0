//! Parameterized statement cache.
//!
//! A [`PreparedStmtHolder`] keeps exactly one compiled statement for one
//! logical query. The statement is built lazily on first use and rebuilt only
//! when its structural [`StatementShape`] changes; otherwise the cached
//! statement is re-bound with new parameter values on every call.

use crate::adaptor::PreparedStatement;
use crate::error::{Result, SyncError};
use crate::filter::FilterMap;

/// The structural shape of a statement: everything that changes its SQL
/// text, but none of the bound values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatementShape {
    mask: Vec<bool>,
    filters: Vec<(String, bool)>,
    param_count: usize,
}

impl StatementShape {
    /// A statement identified by its parameter count alone.
    pub fn params(param_count: usize) -> Self {
        Self {
            param_count,
            ..Self::default()
        }
    }

    /// A statement whose column list depends on a mask.
    pub fn masked(mask: &[bool], param_count: usize) -> Self {
        Self {
            mask: mask.to_vec(),
            filters: Vec::new(),
            param_count,
        }
    }

    /// A statement whose `WHERE` clause depends on the filtered columns and
    /// on each filter's kind (equality or range).
    pub fn filtered(filters: &FilterMap) -> Self {
        Self {
            mask: Vec::new(),
            filters: filters
                .iter()
                .map(|(column, filter)| (column.clone(), filter.is_range()))
                .collect(),
            param_count: filters.values().map(|f| f.param_count()).sum(),
        }
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }
}

/// Holds one lazily built statement per logical query.
pub struct PreparedStmtHolder<'a> {
    shape: Option<StatementShape>,
    stmt: Option<Box<dyn PreparedStatement + 'a>>,
    builds: usize,
}

impl<'a> PreparedStmtHolder<'a> {
    pub fn new() -> Self {
        Self {
            shape: None,
            stmt: None,
            builds: 0,
        }
    }

    /// Returns the cached statement, building it with `build` when there is
    /// none yet or when `shape` differs from the cached one.
    pub fn get_or_build<F>(&mut self, shape: StatementShape, build: F) -> Result<&mut (dyn PreparedStatement + 'a)>
    where
        F: FnOnce() -> Result<Box<dyn PreparedStatement + 'a>>,
    {
        if self.stmt.is_none() || self.shape.as_ref() != Some(&shape) {
            self.stmt = None;
            self.shape = None;
            self.stmt = Some(build()?);
            self.shape = Some(shape);
            self.builds += 1;
        }
        self.stmt
            .as_deref_mut()
            .ok_or_else(|| SyncError::usage("statement is not prepared"))
    }

    /// How many times the statement has been (re)built.
    pub fn builds(&self) -> usize {
        self.builds
    }

    /// Drops the cached statement; the next call rebuilds it.
    pub fn invalidate(&mut self) {
        self.stmt = None;
        self.shape = None;
    }
}

impl Default for PreparedStmtHolder<'_> {
    fn default() -> Self {
        Self::new()
    }
}
