//! Integration tests for the score-sync-sqlite crate.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use score_sync_core::{
    Column, ColumnKind, Grain, Index, SYSTEM_GRAIN, Score, StringLength, Table, system_grain,
};
use score_sync_db::{
    Cursor, DbAdaptor, EngineConfig, EngineKind, Filter, FilterMap, GrainOutcome, GrainRecord,
    GrainStatus, GrainsTable, LiveColumnInfo, LiveFkInfo, LiveIndexInfo, LiveIndices, LivePkInfo,
    PreparedStatement, Result, SqlDialect, SqliteDialect, SyncError, TablesTable, Value, index_columns_match,
    synchronize,
};
use score_sync_sqlite::{SqliteAdaptor, connect};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The SQLite dialect, counting how often record statement text is built.
#[derive(Default)]
struct CountingDialect {
    record_sql: AtomicUsize,
}

impl CountingDialect {
    fn counted<T>(&self, sql: T) -> T {
        self.record_sql.fetch_add(1, Ordering::SeqCst);
        sql
    }

    fn record_sql_builds(&self) -> usize {
        self.record_sql.load(Ordering::SeqCst)
    }
}

impl SqlDialect for CountingDialect {
    fn kind(&self) -> EngineKind {
        SqliteDialect.kind()
    }

    fn quote_ident(&self, name: &str) -> String {
        SqliteDialect.quote_ident(name)
    }

    fn placeholder(&self, index: usize) -> String {
        SqliteDialect.placeholder(index)
    }

    fn field_type(&self, column: &Column) -> String {
        SqliteDialect.field_type(column)
    }

    fn default_literal(&self, column: &Column) -> Option<String> {
        SqliteDialect.default_literal(column)
    }

    fn identity_clause(&self) -> Option<&'static str> {
        SqliteDialect.identity_clause()
    }

    fn inline_identity_key(&self) -> bool {
        SqliteDialect.inline_identity_key()
    }

    fn table_name(&self, grain: &str, table: &str) -> String {
        SqliteDialect.table_name(grain, table)
    }

    fn index_name(&self, grain: &str, index: &str) -> String {
        SqliteDialect.index_name(grain, index)
    }

    fn create_schema_sql(&self, grain: &str) -> Option<String> {
        SqliteDialect.create_schema_sql(grain)
    }

    fn drop_index_sql(&self, grain: &str, index: &LiveIndexInfo) -> String {
        SqliteDialect.drop_index_sql(grain, index)
    }

    fn one_record_sql(&self, grain: &str, table: &Table) -> String {
        self.counted(SqliteDialect.one_record_sql(grain, table))
    }

    fn record_set_sql(&self, grain: &str, table: &Table, filters: &FilterMap) -> Result<String> {
        self.counted(SqliteDialect.record_set_sql(grain, table, filters))
    }

    fn insert_sql(&self, grain: &str, table: &Table, null_mask: &[bool]) -> Result<String> {
        self.counted(SqliteDialect.insert_sql(grain, table, null_mask))
    }

    fn update_sql(&self, grain: &str, table: &Table, equals_mask: &[bool]) -> Result<Option<String>> {
        self.counted(SqliteDialect.update_sql(grain, table, equals_mask))
    }

    fn delete_sql(&self, grain: &str, table: &Table) -> String {
        self.counted(SqliteDialect.delete_sql(grain, table))
    }

    fn delete_set_sql(&self, grain: &str, table: &Table, filters: &FilterMap) -> Result<String> {
        self.counted(SqliteDialect.delete_set_sql(grain, table, filters))
    }
}

/// Wraps the SQLite adaptor, recording every DDL call and failing table
/// creation for one chosen grain.
struct Recording {
    inner: SqliteAdaptor,
    dialect: CountingDialect,
    calls: RefCell<Vec<String>>,
    fail_grain: RefCell<Option<String>>,
}

impl Recording {
    fn new() -> Self {
        Self {
            inner: SqliteAdaptor::open_in_memory().unwrap(),
            dialect: CountingDialect::default(),
            calls: RefCell::new(Vec::new()),
            fail_grain: RefCell::new(None),
        }
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }

    fn fail_on(&self, grain: &str) {
        *self.fail_grain.borrow_mut() = Some(grain.to_string());
    }

    fn execute(&self, sql: &str) {
        self.inner.connection().execute_batch(sql).unwrap();
    }
}

impl DbAdaptor for Recording {
    fn dialect(&self) -> &dyn SqlDialect {
        &self.dialect
    }

    fn schema_exists(&self, grain: &str) -> Result<bool> {
        self.inner.schema_exists(grain)
    }

    fn create_schema_if_absent(&self, grain: &str) -> Result<()> {
        self.record(format!("create_schema {grain}"));
        self.inner.create_schema_if_absent(grain)
    }

    fn table_exists(&self, grain: &str, table: &str) -> Result<bool> {
        self.inner.table_exists(grain, table)
    }

    fn user_tables_exist(&self) -> Result<bool> {
        self.inner.user_tables_exist()
    }

    fn create_table(&self, grain: &str, table: &Table) -> Result<()> {
        self.record(format!("create_table {grain}.{}", table.name));
        if self.fail_grain.borrow().as_deref() == Some(grain) {
            return Err(SyncError::structural(
                format!("Cannot create table {grain}.{}", table.name),
                "injected failure",
            ));
        }
        self.inner.create_table(grain, table)
    }

    fn read_live_columns(&self, grain: &str, table: &Table) -> Result<BTreeSet<String>> {
        self.inner.read_live_columns(grain, table)
    }

    fn read_live_column_info(&self, grain: &str, table: &Table, column: &Column) -> Result<LiveColumnInfo> {
        self.inner.read_live_column_info(grain, table, column)
    }

    fn create_column(&self, grain: &str, table: &Table, column: &Column) -> Result<()> {
        self.record(format!("create_column {grain}.{}.{}", table.name, column.name));
        self.inner.create_column(grain, table, column)
    }

    fn alter_column(&self, grain: &str, table: &Table, column: &Column, live: &LiveColumnInfo) -> Result<()> {
        self.record(format!("alter_column {grain}.{}.{}", table.name, column.name));
        self.inner.alter_column(grain, table, column, live)
    }

    fn read_live_pk(&self, grain: &str, table: &Table) -> Result<LivePkInfo> {
        self.inner.read_live_pk(grain, table)
    }

    fn recreate_primary_key(&self, grain: &str, table: &Table, live: &LivePkInfo) -> Result<()> {
        self.record(format!("recreate_pk {grain}.{}", table.name));
        self.inner.recreate_primary_key(grain, table, live)
    }

    fn read_live_foreign_keys(&self, grain: &str, table: &Table) -> Result<Vec<LiveFkInfo>> {
        self.inner.read_live_foreign_keys(grain, table)
    }

    fn read_live_indices(&self, grain: &str) -> Result<LiveIndices> {
        self.inner.read_live_indices(grain)
    }

    fn create_index(&self, grain: &str, table: &Table, index: &Index) -> Result<()> {
        self.record(format!("create_index {grain}.{}", index.name));
        self.inner.create_index(grain, table, index)
    }

    fn drop_index(&self, grain: &str, index: &LiveIndexInfo) -> Result<()> {
        self.record(format!("drop_index {}", index.physical_name));
        self.inner.drop_index(grain, index)
    }

    fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement + '_>> {
        self.inner.prepare(sql)
    }

    fn commit(&self) -> Result<()> {
        self.inner.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.inner.rollback()
    }
}

fn person() -> Table {
    Table::new("person")
        .with_column(Column::integer("id").identity())
        .with_column(Column::string("name", StringLength::Bounded(60)).not_null())
        .with_column(Column::boolean("active").not_null().with_kind(ColumnKind::Boolean {
            default: Some(true),
        }))
        .with_primary_key(&["id"])
}

fn grain(name: &str, version: &str, order: i32, tables: Vec<Table>) -> Grain {
    Grain::new(name, version.parse().unwrap(), order, tables)
}

fn simple_grain(name: &str, order: i32) -> Grain {
    let table = Table::new("item")
        .with_column(Column::integer("id").identity())
        .with_column(Column::string("label", StringLength::Max))
        .with_primary_key(&["id"]);
    grain(name, "1.0", order, vec![table])
}

fn records(adaptor: &dyn DbAdaptor) -> Vec<GrainRecord> {
    let system = system_grain();
    GrainsTable::new(adaptor, &system).unwrap().load_all().unwrap()
}

fn record<'r>(records: &'r [GrainRecord], id: &str) -> &'r GrainRecord {
    records.iter().find(|r| r.id == id).unwrap()
}

fn set_state(adaptor: &Recording, grain: &str, status: GrainStatus) {
    adaptor.execute(&format!(
        r#"UPDATE "celesta.grains" SET "state" = {} WHERE "id" = '{grain}'"#,
        status.code()
    ));
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[test]
fn test_bootstrap_empty_database() {
    let adaptor = Recording::new();
    let report = synchronize(&adaptor, &Score::with_system(Vec::new())).unwrap();

    assert_eq!(report.outcome(SYSTEM_GRAIN), Some(&GrainOutcome::Upgraded));
    assert!(adaptor.table_exists(SYSTEM_GRAIN, "grains").unwrap());
    assert!(adaptor.table_exists(SYSTEM_GRAIN, "tables").unwrap());

    let rows = records(&adaptor);
    assert_eq!(rows.len(), 1);
    let system = record(&rows, SYSTEM_GRAIN);
    assert_eq!(system.status, GrainStatus::Ready);
    assert_eq!(system.version.to_string(), "1.0");
    assert_eq!(system.checksum, system_grain().checksum);
    assert!(system.message.is_empty());

    let system = system_grain();
    let mut tables = TablesTable::new(&adaptor, &system).unwrap();
    let names: Vec<String> = tables
        .list(SYSTEM_GRAIN)
        .unwrap()
        .into_iter()
        .filter(|t| !t.orphaned)
        .map(|t| t.table)
        .collect();
    assert_eq!(names, vec!["grains", "tables"]);
}

#[test]
fn test_foreign_database_is_refused() {
    let adaptor = Recording::new();
    adaptor.execute("CREATE TABLE legacy (x INTEGER)");

    let err = synchronize(&adaptor, &Score::with_system(vec![simple_grain("app", 1)])).unwrap_err();
    assert!(matches!(err, SyncError::ForeignDatabase { .. }), "{err}");
    assert!(adaptor.take_calls().is_empty());
    assert!(!adaptor.table_exists(SYSTEM_GRAIN, "grains").unwrap());
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

#[test]
fn test_second_run_is_idempotent() {
    let adaptor = Recording::new();
    let app = grain("app", "1.0", 10, vec![person().with_index(Index::new("idx_person_name", &["name"]))]);
    let score = Score::with_system(vec![app]);

    synchronize(&adaptor, &score).unwrap();
    assert!(!adaptor.take_calls().is_empty());

    let report = synchronize(&adaptor, &score).unwrap();
    assert!(adaptor.take_calls().is_empty());
    assert!(report.results.iter().all(|r| r.outcome == GrainOutcome::Unchanged));
}

#[test]
fn test_grains_are_processed_in_dependency_order() {
    let adaptor = Recording::new();
    let score = Score::with_system(vec![
        simple_grain("b", 20),
        simple_grain("c", 30),
        simple_grain("a", 10),
    ]);
    synchronize(&adaptor, &score).unwrap();

    let order: Vec<String> = adaptor
        .take_calls()
        .into_iter()
        .filter(|c| c.starts_with("create_schema "))
        .collect();
    assert_eq!(
        order,
        vec![
            "create_schema celesta",
            "create_schema celesta",
            "create_schema a",
            "create_schema b",
            "create_schema c",
        ]
    );
}

#[test]
fn test_downgrade_is_refused_without_ddl() {
    let adaptor = Recording::new();
    synchronize(&adaptor, &Score::with_system(vec![grain("app", "2.0", 1, vec![person()])])).unwrap();
    adaptor.take_calls();

    let older = grain("app", "1.9", 1, vec![person(), Table::new("extra")
        .with_column(Column::integer("id").not_null())
        .with_primary_key(&["id"])]);
    let err = synchronize(&adaptor, &Score::with_system(vec![older])).unwrap_err();
    assert!(matches!(err, SyncError::VersionLower { .. }), "{err}");
    assert!(err.is_critical());
    assert!(adaptor.take_calls().is_empty());
    assert_eq!(record(&records(&adaptor), "app").status, GrainStatus::Ready);
}

#[test]
fn test_inconsistent_versions_are_refused() {
    let adaptor = Recording::new();
    synchronize(&adaptor, &Score::with_system(vec![grain("app", "1.0,ext1.0", 1, vec![person()])])).unwrap();

    let err = synchronize(&adaptor, &Score::with_system(vec![grain("app", "2.0", 1, vec![person()])]))
        .unwrap_err();
    assert!(matches!(err, SyncError::VersionInconsistent { .. }), "{err}");
}

#[test]
fn test_changed_content_under_same_version_upgrades() {
    let adaptor = Recording::new();
    synchronize(&adaptor, &Score::with_system(vec![grain("app", "1.0", 1, vec![person()])])).unwrap();
    adaptor.take_calls();

    let changed = person().with_column(Column::string("email", StringLength::Bounded(120)));
    let app = grain("app", "1.0", 1, vec![changed]);
    let report = synchronize(&adaptor, &Score::with_system(vec![app.clone()])).unwrap();
    assert_eq!(report.outcome("app"), Some(&GrainOutcome::Upgraded));
    assert_eq!(adaptor.take_calls(), vec!["create_schema app", "create_column app.person.email"]);
    assert_eq!(record(&records(&adaptor), "app").checksum, app.checksum);
}

#[test]
fn test_locked_grain_is_skipped() {
    let adaptor = Recording::new();
    synchronize(&adaptor, &Score::with_system(vec![grain("app", "1.0", 1, vec![person()])])).unwrap();
    set_state(&adaptor, "app", GrainStatus::Lock);
    adaptor.take_calls();

    let report = synchronize(&adaptor, &Score::with_system(vec![grain("app", "0.1", 1, vec![])])).unwrap();
    assert_eq!(report.outcome("app"), Some(&GrainOutcome::Unchanged));
    assert!(adaptor.take_calls().is_empty());
    assert_eq!(record(&records(&adaptor), "app").status, GrainStatus::Lock);
}

#[test]
fn test_recover_forces_upgrade() {
    let adaptor = Recording::new();
    let score = Score::with_system(vec![grain("app", "1.0", 1, vec![person()])]);
    synchronize(&adaptor, &score).unwrap();
    set_state(&adaptor, "app", GrainStatus::Recover);

    let report = synchronize(&adaptor, &score).unwrap();
    assert_eq!(report.outcome("app"), Some(&GrainOutcome::Upgraded));
    assert_eq!(record(&records(&adaptor), "app").status, GrainStatus::Ready);
}

#[test]
fn test_unexpected_status_stops_the_run() {
    let adaptor = Recording::new();
    let score = Score::with_system(vec![simple_grain("app", 1), simple_grain("next", 2)]);
    synchronize(&adaptor, &score).unwrap();
    set_state(&adaptor, "app", GrainStatus::Upgrading);
    adaptor.take_calls();

    let err = synchronize(&adaptor, &score).unwrap_err();
    match err {
        SyncError::UnexpectedStatus { grain, status } => {
            assert_eq!(grain, "app");
            assert_eq!(status, "upgrading");
        }
        other => panic!("expected UnexpectedStatus, got {other}"),
    }
    assert!(adaptor.take_calls().is_empty());
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

#[test]
fn test_partial_failure_is_isolated() {
    let adaptor = Recording::new();
    let b = simple_grain("b", 20);
    let score = Score::with_system(vec![simple_grain("a", 10), b.clone(), simple_grain("c", 30)]);
    adaptor.fail_on("b");

    let err = synchronize(&adaptor, &score).unwrap_err();
    let SyncError::RunFailed(report) = &err else {
        panic!("expected RunFailed, got {err}");
    };
    assert!(err.to_string().contains("celesta.grains"));
    assert_eq!(report.outcome("a"), Some(&GrainOutcome::Upgraded));
    assert_eq!(report.outcome("c"), Some(&GrainOutcome::Upgraded));
    assert!(matches!(report.outcome("b"), Some(GrainOutcome::Failed(_))));

    let rows = records(&adaptor);
    assert_eq!(record(&rows, "a").status, GrainStatus::Ready);
    assert_eq!(record(&rows, "c").status, GrainStatus::Ready);
    let failed = record(&rows, "b");
    assert_eq!(failed.status, GrainStatus::Error);
    let prefix = format!("1.0/{}/{:08X}: ", b.length, b.checksum);
    assert!(failed.message.starts_with(&prefix), "{}", failed.message);
    assert!(failed.message.contains("injected failure"), "{}", failed.message);
    assert!(!adaptor.table_exists("b", "item").unwrap());

    // An ERROR row needs an operator before the next run.
    *adaptor.fail_grain.borrow_mut() = None;
    let err = synchronize(&adaptor, &score).unwrap_err();
    assert!(matches!(err, SyncError::UnexpectedStatus { .. }), "{err}");
}

#[test]
fn test_failed_grain_rolls_back_its_own_ddl() {
    let adaptor = Recording::new();
    let second = Table::new("second")
        .with_column(Column::integer("id").not_null())
        .with_primary_key(&["id"]);
    let app = grain("app", "1.0", 1, vec![person(), second]);
    let score = Score::with_system(vec![app]);

    synchronize(&adaptor, &score).unwrap();
    let changed = grain(
        "app",
        "1.1",
        1,
        vec![person().with_column(Column::integer("age")), Table::new("third")
            .with_column(Column::integer("id").not_null())
            .with_primary_key(&["id"])],
    );
    adaptor.fail_on("app");
    let err = synchronize(&adaptor, &Score::with_system(vec![changed])).unwrap_err();
    assert!(matches!(err, SyncError::RunFailed(_)));

    let live = adaptor.read_live_columns("app", &person()).unwrap();
    assert!(!live.contains("age"));
    let system = system_grain();
    let mut tables = TablesTable::new(&adaptor, &system).unwrap();
    assert!(tables.list("app").unwrap().iter().all(|t| !t.orphaned));
}

// ---------------------------------------------------------------------------
// Structure reconciliation
// ---------------------------------------------------------------------------

#[test]
fn test_index_fidelity_after_changes() {
    let adaptor = Recording::new();
    let table = Table::new("t")
        .with_column(Column::integer("id").identity())
        .with_column(Column::integer("a"))
        .with_column(Column::integer("b"))
        .with_column(Column::integer("c"))
        .with_primary_key(&["id"]);
    let v1 = grain("app", "1.0", 1, vec![table
        .clone()
        .with_index(Index::new("idx_ab", &["a", "b"]))
        .with_index(Index::new("idx_old", &["b"]))]);
    synchronize(&adaptor, &Score::with_system(vec![v1])).unwrap();
    adaptor.execute(r#"CREATE INDEX "app.idx_manual" ON "app.t" ("c")"#);
    adaptor.take_calls();

    let v2 = grain("app", "1.1", 1, vec![table
        .with_index(Index::new("idx_ab", &["b", "a"]))
        .with_index(Index::new("idx_c", &["c"]))]);
    synchronize(&adaptor, &Score::with_system(vec![v2.clone()])).unwrap();

    let calls = adaptor.take_calls();
    assert!(calls.contains(&"drop_index app.idx_ab".to_string()), "{calls:?}");
    assert!(calls.contains(&"drop_index app.idx_old".to_string()), "{calls:?}");
    assert!(calls.contains(&"drop_index app.idx_manual".to_string()), "{calls:?}");

    let live = adaptor.read_live_indices("app").unwrap();
    assert_eq!(live.len(), 2);
    for (table, index) in v2.indices() {
        let (_, columns) = live.iter().find(|(info, _)| info.is_for(table, index)).unwrap();
        assert!(index_columns_match(columns, index));
    }
}

#[test]
fn test_foreign_named_index_on_grain_table_is_dropped() {
    let adaptor = Recording::new();
    let table = Table::new("t")
        .with_column(Column::integer("id").identity())
        .with_column(Column::integer("b"))
        .with_primary_key(&["id"])
        .with_index(Index::new("idx_b", &["b"]));
    synchronize(&adaptor, &Score::with_system(vec![grain("app", "1.0", 1, vec![table.clone()])])).unwrap();
    adaptor.execute(r#"CREATE INDEX "idx_manual" ON "app.t" ("b")"#);
    adaptor.take_calls();

    synchronize(&adaptor, &Score::with_system(vec![grain("app", "1.1", 1, vec![table])])).unwrap();
    let calls = adaptor.take_calls();
    assert!(calls.contains(&"drop_index idx_manual".to_string()), "{calls:?}");
    assert!(!calls.iter().any(|c| c.contains("idx_b")), "{calls:?}");

    let remaining: i64 = adaptor
        .inner
        .connection()
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_manual'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(remaining, 0);
    let live = adaptor.read_live_indices("app").unwrap();
    let names: Vec<&str> = live.keys().map(|i| i.physical_name.as_str()).collect();
    assert_eq!(names, vec!["app.idx_b"]);
}

#[test]
fn test_columns_are_added_and_altered_with_data_kept() {
    let adaptor = Recording::new();
    let v1 = grain("app", "1.0", 1, vec![person().with_column(Column::string("legacy", StringLength::Max))]);
    synchronize(&adaptor, &Score::with_system(vec![v1.clone()])).unwrap();

    let mut cursor = Cursor::new(&adaptor, "app", v1.table("person").unwrap());
    cursor
        .insert(&[Value::Null, Value::from("ann"), Value::Null, Value::from("kept")])
        .unwrap();
    drop(cursor);
    adaptor.commit().unwrap();
    adaptor.take_calls();

    let v2_person = Table::new("person")
        .with_column(Column::integer("id").identity())
        .with_column(Column::string("name", StringLength::Bounded(200)).not_null())
        .with_column(Column::boolean("active").not_null().with_kind(ColumnKind::Boolean {
            default: Some(true),
        }))
        .with_column(Column::integer("score").not_null().with_kind(ColumnKind::Integer {
            identity: false,
            default: Some(5),
        }))
        .with_primary_key(&["id"]);
    let v2 = grain("app", "2.0", 1, vec![v2_person.clone()]);
    synchronize(&adaptor, &Score::with_system(vec![v2])).unwrap();

    assert_eq!(
        adaptor.take_calls(),
        vec![
            "create_schema app",
            "alter_column app.person.name",
            "create_column app.person.score",
        ]
    );
    let name = adaptor
        .read_live_column_info("app", &v2_person, v2_person.column("name").unwrap())
        .unwrap();
    assert_eq!(name.length, Some(StringLength::Bounded(200)));

    let live = adaptor.read_live_columns("app", &v2_person).unwrap();
    assert!(live.contains("legacy"));

    let mut cursor = Cursor::new(&adaptor, "app", &v2_person);
    let row = cursor.get(&[Value::Integer(1)]).unwrap().unwrap();
    assert_eq!(
        row,
        vec![
            Value::Integer(1),
            Value::from("ann"),
            Value::Boolean(true),
            Value::Integer(5),
        ]
    );
}

#[test]
fn test_removed_table_is_orphaned_not_dropped() {
    let adaptor = Recording::new();
    let extra = Table::new("extra")
        .with_column(Column::integer("id").not_null())
        .with_primary_key(&["id"]);
    synchronize(&adaptor, &Score::with_system(vec![grain("app", "1.0", 1, vec![person(), extra])])).unwrap();
    synchronize(&adaptor, &Score::with_system(vec![grain("app", "1.1", 1, vec![person()])])).unwrap();

    assert!(adaptor.table_exists("app", "extra").unwrap());
    let system = system_grain();
    let mut tables = TablesTable::new(&adaptor, &system).unwrap();
    let rows = tables.list("app").unwrap();
    let extra = rows.iter().find(|t| t.table == "extra").unwrap();
    assert!(extra.orphaned);
    let kept = rows.iter().find(|t| t.table == "person").unwrap();
    assert!(!kept.orphaned);

    // Reintroducing the table clears the flag.
    let extra = Table::new("extra")
        .with_column(Column::integer("id").not_null())
        .with_primary_key(&["id"]);
    synchronize(&adaptor, &Score::with_system(vec![grain("app", "1.2", 1, vec![person(), extra])])).unwrap();
    let rows = tables.list("app").unwrap();
    assert!(rows.iter().all(|t| !t.orphaned));
}

#[test]
fn test_primary_key_change_is_applied() {
    let adaptor = Recording::new();
    let link = |key: &[&str]| {
        Table::new("link")
            .with_column(Column::integer("a").not_null())
            .with_column(Column::integer("b").not_null())
            .with_primary_key(key)
    };
    synchronize(&adaptor, &Score::with_system(vec![grain("app", "1.0", 1, vec![link(&["a"])])])).unwrap();
    adaptor.take_calls();

    let v2 = link(&["a", "b"]);
    synchronize(&adaptor, &Score::with_system(vec![grain("app", "1.1", 1, vec![v2.clone()])])).unwrap();
    assert_eq!(adaptor.take_calls(), vec!["create_schema app", "recreate_pk app.link"]);
    assert_eq!(adaptor.read_live_pk("app", &v2).unwrap().columns, vec!["a", "b"]);
}

#[test]
fn test_new_identity_column_becomes_the_key() {
    let adaptor = Recording::new();
    let v1 = Table::new("link")
        .with_column(Column::integer("a").not_null())
        .with_primary_key(&["a"]);
    synchronize(&adaptor, &Score::with_system(vec![grain("app", "1.0", 1, vec![v1])])).unwrap();
    adaptor.execute(r#"INSERT INTO "app.link" ("a") VALUES (42)"#);
    adaptor.take_calls();

    let v2 = Table::new("link")
        .with_column(Column::integer("id").identity())
        .with_column(Column::integer("a").not_null())
        .with_primary_key(&["id"]);
    let report = synchronize(&adaptor, &Score::with_system(vec![grain("app", "1.1", 1, vec![v2.clone()])])).unwrap();
    assert_eq!(report.outcome("app"), Some(&GrainOutcome::Upgraded));
    assert_eq!(adaptor.take_calls(), vec!["create_schema app", "create_column app.link.id"]);

    assert_eq!(adaptor.read_live_pk("app", &v2).unwrap().columns, vec!["id"]);
    let id = adaptor.read_live_column_info("app", &v2, v2.column("id").unwrap()).unwrap();
    assert!(id.identity);

    let mut cursor = Cursor::new(&adaptor, "app", &v2);
    let row = cursor.get(&[Value::Integer(1)]).unwrap().unwrap();
    assert_eq!(row, vec![Value::Integer(1), Value::Integer(42)]);
}

#[test]
fn test_column_and_key_change_in_one_upgrade() {
    let adaptor = Recording::new();
    let link = |length: u32, key: &[&str]| {
        Table::new("link")
            .with_column(Column::integer("a").not_null())
            .with_column(Column::string("b", StringLength::Bounded(length)).not_null())
            .with_primary_key(key)
    };
    synchronize(&adaptor, &Score::with_system(vec![grain("app", "1.0", 1, vec![link(10, &["a"])])])).unwrap();
    adaptor.execute(r#"INSERT INTO "app.link" ("a", "b") VALUES (1, 'x')"#);
    adaptor.take_calls();

    let v2 = link(20, &["a", "b"]);
    let report = synchronize(&adaptor, &Score::with_system(vec![grain("app", "1.1", 1, vec![v2.clone()])])).unwrap();
    assert_eq!(report.outcome("app"), Some(&GrainOutcome::Upgraded));
    assert_eq!(
        adaptor.take_calls(),
        vec!["create_schema app", "alter_column app.link.b", "recreate_pk app.link"]
    );

    assert_eq!(adaptor.read_live_pk("app", &v2).unwrap().columns, vec!["a", "b"]);
    let b = adaptor.read_live_column_info("app", &v2, v2.column("b").unwrap()).unwrap();
    assert_eq!(b.length, Some(StringLength::Bounded(20)));
    let mut cursor = Cursor::new(&adaptor, "app", &v2);
    let row = cursor.get(&[Value::Integer(1), Value::from("x")]).unwrap();
    assert_eq!(row, Some(vec![Value::Integer(1), Value::from("x")]));
}

// ---------------------------------------------------------------------------
// Cursors and the statement cache
// ---------------------------------------------------------------------------

fn synced_person() -> (Recording, Table) {
    let adaptor = Recording::new();
    let table = person();
    synchronize(&adaptor, &Score::with_system(vec![grain("app", "1.0", 1, vec![table.clone()])])).unwrap();
    (adaptor, table)
}

#[test]
fn test_insert_leaves_out_null_columns() {
    let (adaptor, table) = synced_person();
    let mut cursor = Cursor::new(&adaptor, "app", &table);
    cursor.insert(&[Value::Null, Value::from("ann"), Value::Null]).unwrap();
    cursor.insert(&[Value::Null, Value::from("bob"), Value::Boolean(false)]).unwrap();

    let rows = cursor.select(&FilterMap::new()).unwrap();
    assert_eq!(
        rows,
        vec![
            vec![Value::Integer(1), Value::from("ann"), Value::Boolean(true)],
            vec![Value::Integer(2), Value::from("bob"), Value::Boolean(false)],
        ]
    );
}

#[test]
fn test_get_is_prepared_once() {
    let (adaptor, table) = synced_person();
    let mut cursor = Cursor::new(&adaptor, "app", &table);
    cursor.insert(&[Value::Null, Value::from("ann"), Value::Null]).unwrap();
    let after_insert = cursor.statement_builds();

    for _ in 0..5 {
        assert!(cursor.get(&[Value::Integer(1)]).unwrap().is_some());
    }
    assert!(cursor.get(&[Value::Integer(9)]).unwrap().is_none());
    assert_eq!(cursor.statement_builds(), after_insert + 1);
}

#[test]
fn test_record_sql_is_built_only_with_the_statement() {
    let (adaptor, table) = synced_person();
    let mut cursor = Cursor::new(&adaptor, "app", &table);
    let before = adaptor.dialect.record_sql_builds();

    for name in ["a", "b", "c"] {
        cursor.insert(&[Value::Null, Value::from(name), Value::Null]).unwrap();
    }
    for id in 1..=3 {
        let original = cursor.get(&[Value::Integer(id)]).unwrap().unwrap();
        let mut changed = original.clone();
        changed[1] = Value::from("z");
        assert!(cursor.update(&changed, Some(&original)).unwrap());
    }
    let mut by_name = FilterMap::new();
    by_name.insert("name".into(), Filter::equals("z"));
    assert_eq!(cursor.select(&by_name).unwrap().len(), 3);
    assert_eq!(cursor.select(&by_name).unwrap().len(), 3);
    assert!(cursor.delete(&[Value::Integer(1)]).unwrap());
    assert!(!cursor.delete(&[Value::Integer(1)]).unwrap());

    // One text per statement: insert, get, update, select, delete.
    assert_eq!(adaptor.dialect.record_sql_builds() - before, 5);
    assert_eq!(cursor.statement_builds(), 5);
}

#[test]
fn test_get_arity_is_checked_before_execution() {
    let (adaptor, table) = synced_person();
    let mut cursor = Cursor::new(&adaptor, "app", &table);
    let err = cursor.get(&[Value::Integer(1), Value::Integer(2)]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid number of 'get' arguments for 'app.person': expected 1, provided 2."
    );
    assert_eq!(cursor.statement_builds(), 0);
}

#[test]
fn test_filters_update_and_delete() {
    let (adaptor, table) = synced_person();
    let mut cursor = Cursor::new(&adaptor, "app", &table);
    for name in ["a", "b", "c", "d"] {
        cursor.insert(&[Value::Null, Value::from(name), Value::Null]).unwrap();
    }

    let mut range = FilterMap::new();
    range.insert("id".into(), Filter::range(2, 3));
    assert_eq!(cursor.select(&range).unwrap().len(), 2);

    let mut by_name = FilterMap::new();
    by_name.insert("name".into(), Filter::equals("d"));
    assert_eq!(cursor.select(&by_name).unwrap().len(), 1);

    let original = cursor.get(&[Value::Integer(1)]).unwrap().unwrap();
    let mut changed = original.clone();
    changed[2] = Value::Boolean(false);
    assert!(cursor.update(&changed, Some(&original)).unwrap());
    assert_eq!(cursor.get(&[Value::Integer(1)]).unwrap().unwrap(), changed);

    // Nothing changed: no statement, but the row is found.
    assert!(cursor.update(&changed, Some(&changed)).unwrap());

    assert!(cursor.delete(&[Value::Integer(4)]).unwrap());
    assert!(!cursor.delete(&[Value::Integer(4)]).unwrap());
    assert_eq!(cursor.delete_set(&range).unwrap(), 2);
    assert_eq!(cursor.select(&FilterMap::new()).unwrap().len(), 1);

    let mut unknown = FilterMap::new();
    unknown.insert("nope".into(), Filter::equals(1));
    assert!(matches!(cursor.select(&unknown), Err(SyncError::Usage(_))));
}

#[test]
fn test_try_insert_reports_existing_rows() {
    let (adaptor, table) = synced_person();
    let mut cursor = Cursor::new(&adaptor, "app", &table);
    let row = [Value::Integer(7), Value::from("x"), Value::Boolean(true)];
    assert!(cursor.try_insert(&row).unwrap());
    assert!(!cursor.try_insert(&row).unwrap());
}

// ---------------------------------------------------------------------------
// Factory and file databases
// ---------------------------------------------------------------------------

#[test]
fn test_connect_rejects_engines_without_adaptor() {
    let err = connect(&EngineConfig::new(EngineKind::Postgres, "host=db")).err().unwrap();
    assert!(matches!(err, SyncError::UnsupportedEngine(ref kind) if kind == "postgres"));
    assert!(err.is_critical());
}

#[test]
fn test_state_survives_reopening_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");
    let config = EngineConfig::new(EngineKind::Sqlite, path.to_string_lossy());
    let score = Score::with_system(vec![grain("app", "1.0", 1, vec![person()])]);

    {
        let adaptor = connect(&config).unwrap();
        synchronize(&adaptor, &score).unwrap();
    }

    let adaptor = connect(&config).unwrap();
    let report = synchronize(&adaptor, &score).unwrap();
    assert!(report.results.iter().all(|r| r.outcome == GrainOutcome::Unchanged));
    assert_eq!(record(&records(&adaptor), "app").status, GrainStatus::Ready);
}
