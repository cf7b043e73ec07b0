//! The schema synchronization engine.
//!
//! A run brings every grain of a [`Score`] in line with the database, one
//! grain at a time in dependency order, and records the outcome of each in
//! the bookkeeping tables. Structural failures of one grain are recorded and
//! the run moves on; precondition failures abort the run.
//!
//! ```no_run
//! # use score_sync_db::{DbAdaptor, SchemaSync};
//! # use score_sync_core::Score;
//! # fn demo(adaptor: &dyn DbAdaptor, score: &Score) -> score_sync_db::Result<()> {
//! let report = SchemaSync::new(adaptor, score).run()?;
//! for result in &report.results {
//!     println!("{}: {}", result.grain, result.outcome);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;

use score_sync_core::{GRAINS_TABLE, Grain, SYSTEM_GRAIN, Score, TABLES_TABLE, Table, VersionOrdering, validate_score};
use tracing::{debug, error, info, warn};

use crate::adaptor::DbAdaptor;
use crate::bookkeeping::{GrainRecord, GrainStatus, GrainsTable, TablesTable, now};
use crate::error::{Result, SyncError};
use crate::live::{missing_indices, stale_indices};

/// What happened to one grain during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrainOutcome {
    /// Nothing to do: locked, or already up to date.
    Unchanged,
    Upgraded,
    /// The upgrade failed; carries the message stored in the bookkeeping row.
    Failed(String),
}

impl fmt::Display for GrainOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrainOutcome::Unchanged => f.write_str("unchanged"),
            GrainOutcome::Upgraded => f.write_str("upgraded"),
            GrainOutcome::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrainResult {
    pub grain: String,
    pub outcome: GrainOutcome,
}

/// Per-grain outcomes of a run, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub results: Vec<GrainResult>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    pub fn failed(&self) -> impl Iterator<Item = &GrainResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, GrainOutcome::Failed(_)))
    }

    pub fn upgraded(&self) -> impl Iterator<Item = &GrainResult> {
        self.results
            .iter()
            .filter(|r| r.outcome == GrainOutcome::Upgraded)
    }

    pub fn outcome(&self, grain: &str) -> Option<&GrainOutcome> {
        self.results
            .iter()
            .find(|r| r.grain == grain)
            .map(|r| &r.outcome)
    }

    fn push(&mut self, grain: &str, outcome: GrainOutcome) {
        self.results.push(GrainResult {
            grain: grain.to_string(),
            outcome,
        });
    }
}

/// What to do with a grain whose bookkeeping row already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Skip,
    Upgrade,
}

/// Decides whether a grain needs an upgrade.
///
/// # Errors
///
/// Returns [`SyncError::VersionLower`] or [`SyncError::VersionInconsistent`]
/// when the model's version does not follow the stored one, and
/// [`SyncError::UnexpectedStatus`] for a row that is neither ready, recover
/// nor lock.
pub fn decide(grain: &Grain, record: &GrainRecord) -> Result<Decision> {
    match record.status {
        GrainStatus::Lock => Ok(Decision::Skip),
        GrainStatus::Recover => Ok(Decision::Upgrade),
        GrainStatus::Ready => match grain.version.compare(&record.version) {
            VersionOrdering::Lower => Err(SyncError::VersionLower {
                grain: grain.name.clone(),
                model: grain.version.to_string(),
                stored: record.version.to_string(),
            }),
            VersionOrdering::Inconsistent => Err(SyncError::VersionInconsistent {
                grain: grain.name.clone(),
                model: grain.version.to_string(),
                stored: record.version.to_string(),
            }),
            VersionOrdering::Greater => Ok(Decision::Upgrade),
            VersionOrdering::Equals => {
                if grain.checksum != record.checksum || grain.length != record.length {
                    Ok(Decision::Upgrade)
                } else {
                    Ok(Decision::Skip)
                }
            }
        },
        status => Err(SyncError::UnexpectedStatus {
            grain: record.id.clone(),
            status: status.to_string(),
        }),
    }
}

/// One synchronization run over one adaptor.
pub struct SchemaSync<'a> {
    adaptor: &'a dyn DbAdaptor,
    score: &'a Score,
}

impl<'a> SchemaSync<'a> {
    pub fn new(adaptor: &'a dyn DbAdaptor, score: &'a Score) -> Self {
        Self { adaptor, score }
    }

    /// Runs the synchronization.
    ///
    /// # Errors
    ///
    /// Critical errors abort the run as soon as they are found. If every
    /// precondition holds but some grain failed to upgrade, the run still
    /// attempts all grains and then returns [`SyncError::RunFailed`] carrying
    /// the full report.
    pub fn run(&self) -> Result<SyncReport> {
        let problems = validate_score(self.score);
        if !problems.is_empty() {
            return Err(SyncError::InvalidScore(problems));
        }
        let system = self
            .score
            .system_grain()
            .ok_or_else(|| SyncError::MissingSystemGrain(SYSTEM_GRAIN.to_string()))?;

        let mut ctx = RunContext::new(self.adaptor, system)?;
        let mut report = SyncReport::default();

        let bootstrapped = if self.adaptor.table_exists(SYSTEM_GRAIN, GRAINS_TABLE)? {
            false
        } else {
            let outcome = ctx.bootstrap(system)?;
            report.push(&system.name, outcome);
            true
        };

        let records: HashMap<String, GrainRecord> = ctx
            .grains
            .load_all()?
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        for record in records.values() {
            if !record.status.allows_run() {
                return Err(SyncError::UnexpectedStatus {
                    grain: record.id.clone(),
                    status: record.status.to_string(),
                });
            }
        }

        for grain in self.score.ordered_grains() {
            if bootstrapped && grain.is_system() {
                continue;
            }
            let outcome = match records.get(&grain.name) {
                None => {
                    info!(grain = %grain.name, "new grain");
                    ctx.grains.insert(&GrainRecord::recover(grain))?;
                    ctx.upgrade(grain)?
                }
                Some(record) => match decide(grain, record)? {
                    Decision::Skip => {
                        debug!(grain = %grain.name, status = %record.status, "grain unchanged");
                        GrainOutcome::Unchanged
                    }
                    Decision::Upgrade => {
                        info!(
                            grain = %grain.name,
                            from = %record.version,
                            to = %grain.version,
                            "upgrading grain"
                        );
                        ctx.upgrade(grain)?
                    }
                },
            };
            report.push(&grain.name, outcome);
        }

        if report.is_success() {
            Ok(report)
        } else {
            Err(SyncError::RunFailed(report))
        }
    }
}

/// Runs one synchronization of `score` against `adaptor`.
pub fn synchronize(adaptor: &dyn DbAdaptor, score: &Score) -> Result<SyncReport> {
    SchemaSync::new(adaptor, score).run()
}

/// State threaded through a run: the adaptor and the bookkeeping accessors.
struct RunContext<'a> {
    adaptor: &'a dyn DbAdaptor,
    grains: GrainsTable<'a>,
    tables: TablesTable<'a>,
}

impl<'a> RunContext<'a> {
    fn new(adaptor: &'a dyn DbAdaptor, system: &Grain) -> Result<Self> {
        Ok(Self {
            adaptor,
            grains: GrainsTable::new(adaptor, system)?,
            tables: TablesTable::new(adaptor, system)?,
        })
    }

    /// Creates the bookkeeping tables in an empty database and upgrades the
    /// system grain.
    fn bootstrap(&mut self, system: &Grain) -> Result<GrainOutcome> {
        if self.adaptor.user_tables_exist()? {
            return Err(SyncError::ForeignDatabase {
                schema: SYSTEM_GRAIN.to_string(),
                table: GRAINS_TABLE.to_string(),
            });
        }
        info!("bootstrapping bookkeeping tables");
        self.adaptor.create_schema_if_absent(&system.name)?;
        for name in [GRAINS_TABLE, TABLES_TABLE] {
            let table = system
                .table(name)
                .ok_or_else(|| SyncError::MissingSystemGrain(format!("{SYSTEM_GRAIN}.{name}")))?;
            self.adaptor.create_table(&system.name, table)?;
        }
        self.grains.insert(&GrainRecord::recover(system))?;
        self.upgrade(system)
    }

    /// Upgrades one grain whose bookkeeping row exists.
    fn upgrade(&mut self, grain: &Grain) -> Result<GrainOutcome> {
        let mut record = self
            .grains
            .get(&grain.name)?
            .ok_or_else(|| SyncError::Bookkeeping(format!("no row for grain '{}'", grain.name)))?;

        record.status = GrainStatus::Upgrading;
        self.grains.update(&record)?;
        self.adaptor.commit()?;

        match self.reconcile(grain) {
            Ok(()) => {
                record.status = GrainStatus::Ready;
                record.version = grain.version.clone();
                record.checksum = grain.checksum;
                record.length = grain.length;
                record.last_modified = now();
                record.message.clear();
                self.grains.update(&record)?;
                self.adaptor.commit()?;
                info!(grain = %grain.name, version = %grain.version, "grain upgraded");
                Ok(GrainOutcome::Upgraded)
            }
            Err(err) if err.is_critical() => Err(err),
            Err(err) => {
                error!(grain = %grain.name, error = %err, "grain upgrade failed");
                if let Err(rollback) = self.adaptor.rollback() {
                    warn!(grain = %grain.name, error = %rollback, "rollback failed");
                }
                let message = format!(
                    "{}/{}/{:08X}: {}",
                    grain.version, grain.length, grain.checksum, err
                );
                record.status = GrainStatus::Error;
                record.last_modified = now();
                record.message = message.clone();
                self.grains.update(&record)?;
                self.adaptor.commit()?;
                Ok(GrainOutcome::Failed(message))
            }
        }
    }

    fn reconcile(&mut self, grain: &Grain) -> Result<()> {
        let adaptor = self.adaptor;
        adaptor.create_schema_if_absent(&grain.name)?;

        let live = adaptor.read_live_indices(&grain.name)?;
        for stale in stale_indices(grain, &live) {
            debug!(grain = %grain.name, index = %stale.index_name, "dropping stale index");
            adaptor.drop_index(&grain.name, &stale)?;
        }

        self.tables.mark_orphans(grain)?;
        for table in &grain.tables {
            self.reconcile_table(grain, table)?;
            self.tables.ensure_present(&grain.name, &table.name)?;
        }

        let live = adaptor.read_live_indices(&grain.name)?;
        for stale in stale_indices(grain, &live) {
            adaptor.drop_index(&grain.name, &stale)?;
        }
        for (table, index) in missing_indices(grain, &live) {
            debug!(grain = %grain.name, index = %index.name, "creating index");
            adaptor.create_index(&grain.name, table, index)?;
        }
        Ok(())
    }

    fn reconcile_table(&self, grain: &Grain, table: &Table) -> Result<()> {
        let adaptor = self.adaptor;
        if !adaptor.table_exists(&grain.name, &table.name)? {
            debug!(grain = %grain.name, table = %table.name, "creating table");
            return adaptor.create_table(&grain.name, table);
        }

        let live_columns = adaptor.read_live_columns(&grain.name, table)?;
        for column in &table.columns {
            if !live_columns.contains(&column.name) {
                adaptor.create_column(&grain.name, table, column)?;
                continue;
            }
            let info = adaptor.read_live_column_info(&grain.name, table, column)?;
            if !adaptor.column_reflects(column, &info) {
                debug!(grain = %grain.name, table = %table.name, column = %column.name, "altering column");
                adaptor.alter_column(&grain.name, table, column, &info)?;
            }
        }

        let pk = adaptor.read_live_pk(&grain.name, table)?;
        if !pk.reflects(table) {
            adaptor.recreate_primary_key(&grain.name, table, &pk)?;
        }
        Ok(())
    }
}
