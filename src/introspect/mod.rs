//! Database introspection
//!
//! Every supported database implements [`CatalogSource`]; [`read_catalog`]
//! drives any of them to produce [`TableDescriptor`]s in a deterministic order.
//! Each driver is behind its own feature. MySQL, SQL Server and ClickHouse
//! read their catalogs through the [`TextQuery`] seam, which the bundled
//! `mysql` and `tiberius` clients implement.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info, trace};

use crate::prelude::{GormtoolError, TableDescriptor};
use crate::schema::{ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor};

mod clickhouse;
mod mysql;
mod sqlserver;

pub use clickhouse::ClickHouseCatalog;
pub use mysql::MysqlCatalog;
pub use sqlserver::SqlServerCatalog;

#[cfg(feature = "mysql")]
pub use mysql::MysqlClient;
#[cfg(feature = "sqlserver")]
pub use sqlserver::SqlServerClient;

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "postgres")]
pub use postgres::PostgresCatalog;

#[cfg(feature = "sqlite")]
mod sqlite;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCatalog;

/// Supported database kinds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DbKind {
    #[default]
    Mysql,
    Postgres,
    Sqlite,
    SqlServer,
    ClickHouse,
}

impl FromStr for DbKind {
    type Err = GormtoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mysql" => Ok(Self::Mysql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "sqlserver" | "mssql" => Ok(Self::SqlServer),
            "clickhouse" => Ok(Self::ClickHouse),
            other => Err(GormtoolError::Config(format!(
                "unknown db {:?} (supported: mysql, postgres, sqlite, sqlserver, clickhouse)",
                other
            ))),
        }
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Mysql => "mysql",
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
            Self::SqlServer => "sqlserver",
            Self::ClickHouse => "clickhouse",
        };
        f.write_str(s)
    }
}

impl DbKind {
    /// Open a read-only catalog connection
    ///
    /// The returned source owns the connection; dropping it closes it.
    pub fn connect(self, dsn: &str) -> Result<Box<dyn CatalogSource>, GormtoolError> {
        if dsn.trim().is_empty() {
            return Err(GormtoolError::Config("dsn cannot be empty".to_string()));
        }
        match self {
            Self::Mysql => connect_mysql(dsn),
            Self::Postgres => connect_postgres(dsn),
            Self::Sqlite => connect_sqlite(dsn),
            Self::SqlServer => connect_sqlserver(dsn),
            Self::ClickHouse => connect_clickhouse(dsn),
        }
    }
}

#[cfg(feature = "mysql")]
fn connect_mysql(dsn: &str) -> Result<Box<dyn CatalogSource>, GormtoolError> {
    Ok(Box::new(MysqlCatalog::connect(dsn)?))
}

#[cfg(not(feature = "mysql"))]
fn connect_mysql(_dsn: &str) -> Result<Box<dyn CatalogSource>, GormtoolError> {
    Err(GormtoolError::Config(
        "MySQL support not enabled. Rebuild with --features mysql".to_string(),
    ))
}

#[cfg(feature = "mysql")]
fn connect_clickhouse(dsn: &str) -> Result<Box<dyn CatalogSource>, GormtoolError> {
    Ok(Box::new(ClickHouseCatalog::connect(dsn)?))
}

#[cfg(not(feature = "mysql"))]
fn connect_clickhouse(_dsn: &str) -> Result<Box<dyn CatalogSource>, GormtoolError> {
    Err(GormtoolError::Config(
        "ClickHouse support not enabled. Rebuild with --features mysql".to_string(),
    ))
}

#[cfg(feature = "sqlserver")]
fn connect_sqlserver(dsn: &str) -> Result<Box<dyn CatalogSource>, GormtoolError> {
    Ok(Box::new(SqlServerCatalog::connect(dsn)?))
}

#[cfg(not(feature = "sqlserver"))]
fn connect_sqlserver(_dsn: &str) -> Result<Box<dyn CatalogSource>, GormtoolError> {
    Err(GormtoolError::Config(
        "SQL Server support not enabled. Rebuild with --features sqlserver".to_string(),
    ))
}

#[cfg(feature = "postgres")]
fn connect_postgres(dsn: &str) -> Result<Box<dyn CatalogSource>, GormtoolError> {
    Ok(Box::new(PostgresCatalog::connect(dsn)?))
}

#[cfg(not(feature = "postgres"))]
fn connect_postgres(_dsn: &str) -> Result<Box<dyn CatalogSource>, GormtoolError> {
    Err(GormtoolError::Config(
        "PostgreSQL support not enabled. Rebuild with --features postgres".to_string(),
    ))
}

#[cfg(feature = "sqlite")]
fn connect_sqlite(dsn: &str) -> Result<Box<dyn CatalogSource>, GormtoolError> {
    Ok(Box::new(SqliteCatalog::open(dsn)?))
}

#[cfg(not(feature = "sqlite"))]
fn connect_sqlite(_dsn: &str) -> Result<Box<dyn CatalogSource>, GormtoolError> {
    Err(GormtoolError::Config(
        "SQLite support not enabled. Rebuild with --features sqlite".to_string(),
    ))
}

/// Table selection applied while reading the catalog
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TableFilter {
    /// Only these tables, in this order (all tables when empty)
    pub include: Vec<String>,
    /// Exclude these tables
    pub exclude: Vec<String>,
}

impl TableFilter {
    fn is_excluded(&self, table_name: &str) -> bool {
        self.exclude.iter().any(|t| t == table_name)
    }
}

/// Catalog capabilities one database kind provides
///
/// Table enumeration must be deterministic for a fixed schema.
pub trait CatalogSource {
    fn kind(&self) -> DbKind;

    /// Base tables of the current schema/database, in enumeration order
    fn list_tables(&mut self) -> Result<Vec<String>, GormtoolError>;

    /// Columns in ordinal order
    fn columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>, GormtoolError>;

    /// Primary key column names in key order
    fn primary_key(&mut self, table: &str) -> Result<Vec<String>, GormtoolError>;

    fn indexes(&mut self, table: &str) -> Result<Vec<IndexDescriptor>, GormtoolError>;

    fn foreign_keys(&mut self, _table: &str) -> Result<Vec<ForeignKeyDescriptor>, GormtoolError> {
        Ok(Vec::new())
    }

    fn table_comment(&mut self, _table: &str) -> Result<Option<String>, GormtoolError> {
        Ok(None)
    }
}

/// Read descriptors for the selected tables
///
/// With an empty allow-list every table is read in enumeration order;
/// otherwise tables come back in allow-list order and a missing table is an
/// error.
pub fn read_catalog(
    source: &mut dyn CatalogSource,
    filter: &TableFilter,
) -> Result<Vec<TableDescriptor>, GormtoolError> {
    let kind = source.kind();
    info!(db = %kind, "Reading catalog");

    let all_tables = source.list_tables()?;
    debug!(count = ?all_tables.len(), "Found all tables");

    let selected: Vec<String> = if filter.include.is_empty() {
        all_tables
    } else {
        for name in &filter.include {
            if !all_tables.iter().any(|t| t == name) {
                return Err(GormtoolError::catalog(
                    name.as_str(),
                    format!("table not found in the {} catalog", kind),
                ));
            }
        }
        filter.include.clone()
    };

    let table_names: Vec<String> = selected
        .into_iter()
        .filter(|name| !filter.is_excluded(name))
        .collect();
    debug!(count = ?table_names.len(), "Tables after filtering");

    let mut tables = Vec::with_capacity(table_names.len());
    for table_name in table_names {
        debug!(table = ?table_name, "Introspecting table");
        tables.push(describe_table(source, table_name)?);
    }

    info!(tables = ?tables.len(), "Catalog read complete");
    Ok(tables)
}

fn describe_table(
    source: &mut dyn CatalogSource,
    name: String,
) -> Result<TableDescriptor, GormtoolError> {
    let columns = source.columns(&name)?;
    if columns.is_empty() {
        return Err(GormtoolError::catalog(name.as_str(), "table has no visible columns"));
    }
    trace!(table = ?name, columns = ?columns.len(), "Found columns");

    let primary_key = source.primary_key(&name)?;
    trace!(table = ?name, primary_key = ?primary_key, "Found primary key");

    let indexes = source.indexes(&name)?;
    trace!(table = ?name, indexes = ?indexes.len(), "Found indexes");

    let foreign_keys = source.foreign_keys(&name)?;
    trace!(table = ?name, foreign_keys = ?foreign_keys.len(), "Found foreign keys");

    let comment = source.table_comment(&name)?;

    Ok(TableDescriptor {
        name,
        comment,
        columns,
        indexes,
        primary_key,
        foreign_keys,
    })
}

/// One result row with every cell rendered as text (`None` for SQL NULL)
pub type TextRow = Vec<Option<String>>;

/// Minimal query seam for catalogs read through `information_schema`-style
/// SQL
///
/// Parameters are bound positionally as text.
pub trait TextQuery {
    fn query_text(&mut self, sql: &str, params: &[&str]) -> Result<Vec<TextRow>, GormtoolError>;
}

/// Typed access to a [`TextRow`] cell
pub(crate) fn cell(row: &TextRow, idx: usize) -> Option<&str> {
    row.get(idx).and_then(|c| c.as_deref())
}

pub(crate) fn cell_string(row: &TextRow, idx: usize) -> String {
    cell(row, idx).unwrap_or_default().to_string()
}

/// Interpret catalog booleans (`YES`, `1`, `true`, ...)
pub(crate) fn cell_flag(row: &TextRow, idx: usize) -> bool {
    matches!(
        cell(row, idx).map(|s| s.trim().to_ascii_lowercase()).as_deref(),
        Some("yes" | "1" | "true" | "t")
    )
}

/// Trim a catalog comment to `None` when blank
pub(crate) fn non_empty(comment: Option<String>) -> Option<String> {
    comment.filter(|c| !c.trim().is_empty())
}

/// Group `(index name, unique, primary, column)` rows into descriptors,
/// preserving first-seen index order
pub(crate) fn group_indexes(
    rows: impl IntoIterator<Item = (String, bool, bool, String)>,
) -> Vec<IndexDescriptor> {
    let mut indexes: Vec<IndexDescriptor> = Vec::new();
    for (name, unique, primary, column) in rows {
        if let Some(existing) = indexes.iter_mut().find(|i| i.name == name) {
            existing.columns.push(column);
        } else {
            indexes.push(IndexDescriptor {
                name,
                columns: vec![column],
                unique,
                primary,
            });
        }
    }
    indexes
}

/// Group `(constraint, column, referenced table, referenced column)` rows
pub(crate) fn group_foreign_keys(
    rows: impl IntoIterator<Item = (String, String, String, String)>,
) -> Vec<ForeignKeyDescriptor> {
    let mut keys: Vec<ForeignKeyDescriptor> = Vec::new();
    for (name, column, referenced_table, referenced_column) in rows {
        if let Some(existing) = keys.iter_mut().find(|k| k.name == name) {
            existing.columns.push(column);
            existing.referenced_columns.push(referenced_column);
        } else {
            keys.push(ForeignKeyDescriptor {
                name,
                columns: vec![column],
                referenced_table,
                referenced_columns: vec![referenced_column],
            });
        }
    }
    keys
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::schema::tests::column;

    /// Canned responses keyed by a substring of the SQL text
    #[derive(Default)]
    pub struct FakeQuery {
        pub responses: Vec<(&'static str, Vec<TextRow>)>,
        pub calls: Vec<(String, Vec<String>)>,
    }

    impl FakeQuery {
        pub fn respond(mut self, sql_fragment: &'static str, rows: Vec<Vec<Option<&str>>>) -> Self {
            let rows = rows
                .into_iter()
                .map(|r| r.into_iter().map(|c| c.map(str::to_string)).collect())
                .collect();
            self.responses.push((sql_fragment, rows));
            self
        }
    }

    impl TextQuery for FakeQuery {
        fn query_text(&mut self, sql: &str, params: &[&str]) -> Result<Vec<TextRow>, GormtoolError> {
            self.calls
                .push((sql.to_string(), params.iter().map(|p| p.to_string()).collect()));
            self.responses
                .iter()
                .find(|(fragment, _)| sql.contains(fragment))
                .map(|(_, rows)| rows.clone())
                .ok_or_else(|| GormtoolError::catalog("fake", format!("unexpected query: {}", sql)))
        }
    }

    /// In-memory catalog with fixed tables
    pub struct MemoryCatalog {
        pub tables: Vec<TableDescriptor>,
        pub column_calls: HashMap<String, usize>,
    }

    impl MemoryCatalog {
        pub fn new(tables: Vec<TableDescriptor>) -> Self {
            Self {
                tables,
                column_calls: HashMap::new(),
            }
        }

        fn table(&self, name: &str) -> Result<&TableDescriptor, GormtoolError> {
            self.tables
                .iter()
                .find(|t| t.name == name)
                .ok_or_else(|| GormtoolError::catalog(name, "no such table"))
        }
    }

    impl CatalogSource for MemoryCatalog {
        fn kind(&self) -> DbKind {
            DbKind::Mysql
        }

        fn list_tables(&mut self) -> Result<Vec<String>, GormtoolError> {
            Ok(self.tables.iter().map(|t| t.name.clone()).collect())
        }

        fn columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>, GormtoolError> {
            *self.column_calls.entry(table.to_string()).or_default() += 1;
            Ok(self.table(table)?.columns.clone())
        }

        fn primary_key(&mut self, table: &str) -> Result<Vec<String>, GormtoolError> {
            Ok(self.table(table)?.primary_key.clone())
        }

        fn indexes(&mut self, table: &str) -> Result<Vec<IndexDescriptor>, GormtoolError> {
            Ok(self.table(table)?.indexes.clone())
        }

        fn foreign_keys(&mut self, table: &str) -> Result<Vec<ForeignKeyDescriptor>, GormtoolError> {
            Ok(self.table(table)?.foreign_keys.clone())
        }

        fn table_comment(&mut self, table: &str) -> Result<Option<String>, GormtoolError> {
            Ok(self.table(table)?.comment.clone())
        }
    }

    pub fn three_tables() -> Vec<TableDescriptor> {
        use crate::schema::tests::table;
        let mut users = table("users", vec![column("id", "int"), column("email", "varchar(255)")]);
        users.primary_key = vec!["id".to_string()];
        let mut orders = table("orders", vec![column("id", "int"), column("user_id", "int")]);
        orders.primary_key = vec!["id".to_string()];
        let audit_log = table("audit_log", vec![column("message", "text")]);
        vec![users, orders, audit_log]
    }

    #[test]
    fn test_empty_filter_reads_all_in_enumeration_order() {
        let mut catalog = MemoryCatalog::new(three_tables());
        let tables = read_catalog(&mut catalog, &TableFilter::default()).unwrap();

        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["users", "orders", "audit_log"]);
        assert!(tables.iter().all(|t| !t.columns.is_empty()));
        assert_eq!(catalog.column_calls.get("orders"), Some(&1));
    }

    #[test]
    fn test_allow_list_order_is_kept() {
        let mut catalog = MemoryCatalog::new(three_tables());
        let filter = TableFilter {
            include: vec!["audit_log".to_string(), "users".to_string()],
            exclude: vec![],
        };
        let tables = read_catalog(&mut catalog, &filter).unwrap();

        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["audit_log", "users"]);
        assert!(!catalog.column_calls.contains_key("orders"));
    }

    #[test]
    fn test_missing_table_is_catalog_error() {
        let mut catalog = MemoryCatalog::new(three_tables());
        let filter = TableFilter {
            include: vec!["users".to_string(), "invoices".to_string()],
            exclude: vec![],
        };
        let err = read_catalog(&mut catalog, &filter).unwrap_err();

        match err {
            GormtoolError::Catalog { scope, .. } => assert_eq!(scope, "invoices"),
            other => panic!("expected catalog error, got {:?}", other),
        }
        // nothing was described before the allow-list was checked
        assert!(catalog.column_calls.is_empty());
    }

    #[test]
    fn test_exclude_list() {
        let mut catalog = MemoryCatalog::new(three_tables());
        let filter = TableFilter {
            include: vec![],
            exclude: vec!["orders".to_string()],
        };
        let tables = read_catalog(&mut catalog, &filter).unwrap();

        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["users", "audit_log"]);
    }

    #[test]
    fn test_db_kind_from_str() {
        assert_eq!("mysql".parse::<DbKind>().unwrap(), DbKind::Mysql);
        assert_eq!("PostgreSQL".parse::<DbKind>().unwrap(), DbKind::Postgres);
        assert_eq!("sqlite".parse::<DbKind>().unwrap(), DbKind::Sqlite);
        assert_eq!("mssql".parse::<DbKind>().unwrap(), DbKind::SqlServer);
        assert_eq!("clickhouse".parse::<DbKind>().unwrap(), DbKind::ClickHouse);
        assert!("oracle".parse::<DbKind>().is_err());
        assert_eq!(DbKind::SqlServer.to_string(), "sqlserver");
    }

    #[test]
    fn test_connect_rejects_bad_dsn_before_dialing() {
        for kind in [
            DbKind::Mysql,
            DbKind::Postgres,
            DbKind::Sqlite,
            DbKind::SqlServer,
            DbKind::ClickHouse,
        ] {
            let err = kind.connect("  ").err().unwrap();
            assert!(matches!(err, GormtoolError::Config(_)), "{}", kind);
        }

        // no database after '/'
        let err = DbKind::Mysql.connect("root@tcp(localhost:3306)").err().unwrap();
        assert!(matches!(err, GormtoolError::Config(_)));

        // native protocol URLs cannot reach the MySQL interface
        let err = DbKind::ClickHouse.connect("tcp://localhost:9000").err().unwrap();
        assert!(matches!(err, GormtoolError::Config(_)));

        let err = DbKind::SqlServer.connect("sqlserver://sa:pw@?database=shop").err().unwrap();
        assert!(matches!(err, GormtoolError::Config(_)));
    }

    #[test]
    fn test_group_indexes_preserves_order() {
        let rows = vec![
            ("idx_b".to_string(), false, false, "b".to_string()),
            ("idx_a".to_string(), true, false, "a1".to_string()),
            ("idx_b".to_string(), false, false, "c".to_string()),
            ("idx_a".to_string(), true, false, "a2".to_string()),
        ];
        let indexes = group_indexes(rows);

        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].name, "idx_b");
        assert_eq!(indexes[0].columns, vec!["b", "c"]);
        assert!(indexes[1].unique);
        assert_eq!(indexes[1].columns, vec!["a1", "a2"]);
    }

    #[test]
    fn test_cell_flag() {
        let row: TextRow = vec![
            Some("YES".to_string()),
            Some("0".to_string()),
            None,
            Some("t".to_string()),
        ];
        assert!(cell_flag(&row, 0));
        assert!(!cell_flag(&row, 1));
        assert!(!cell_flag(&row, 2));
        assert!(cell_flag(&row, 3));
        assert!(!cell_flag(&row, 9));
    }
}
