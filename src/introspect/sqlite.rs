use std::collections::HashSet;

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, error, info, trace};

use super::{group_foreign_keys, group_indexes, CatalogSource, DbKind};
use crate::prelude::GormtoolError;
use crate::schema::{declares_unsigned, ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor};

/// SQLite catalog read through `sqlite_master` and the pragma table functions
pub struct SqliteCatalog {
    conn: Connection,
}

impl SqliteCatalog {
    /// Open an existing database file (or `file:` URI) read-only
    pub fn open(path: &str) -> Result<Self, GormtoolError> {
        info!(path = ?path, "Opening SQLite database");
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            error!(path = ?path, error = ?e, "Failed to open SQLite database");
            GormtoolError::catalog("connection", format!("Failed to open {}: {}", path, e))
        })?;
        Ok(Self::new(conn))
    }

    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

fn catalog_error(scope: &str, what: &str, e: rusqlite::Error) -> GormtoolError {
    error!(scope = ?scope, error = ?e, "Failed to query {}", what);
    GormtoolError::catalog(scope, format!("Failed to query {}: {}", what, e))
}

/// Row of `pragma_table_info`
struct ColumnInfo {
    name: String,
    decl_type: String,
    notnull: bool,
    default: Option<String>,
    pk: i64,
    cid: i64,
}

impl SqliteCatalog {
    fn table_info(&self, table: &str) -> Result<Vec<ColumnInfo>, GormtoolError> {
        let mut stmt = self
            .conn
            .prepare(
                r#"SELECT cid, name, type, "notnull", dflt_value, pk
                FROM pragma_table_info(?1)
                ORDER BY cid"#,
            )
            .map_err(|e| catalog_error(table, "columns", e))?;

        let columns = stmt
            .query_map([table], |row| {
                Ok(ColumnInfo {
                    cid: row.get(0)?,
                    name: row.get(1)?,
                    decl_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    notnull: row.get::<_, i64>(3)? != 0,
                    default: row.get(4)?,
                    pk: row.get(5)?,
                })
            })
            .map_err(|e| catalog_error(table, "columns", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| catalog_error(table, "columns", e))?;

        Ok(columns)
    }
}

impl CatalogSource for SqliteCatalog {
    fn kind(&self) -> DbKind {
        DbKind::Sqlite
    }

    fn list_tables(&mut self) -> Result<Vec<String>, GormtoolError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .map_err(|e| catalog_error("catalog", "tables", e))?;

        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| catalog_error("catalog", "tables", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| catalog_error("catalog", "tables", e))?;

        trace!(tables = ?tables, "Tables found");
        Ok(tables)
    }

    fn columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>, GormtoolError> {
        let info = self.table_info(table)?;
        let pk_count = info.iter().filter(|c| c.pk > 0).count();

        let columns = info
            .into_iter()
            .map(|col| {
                // A lone INTEGER PRIMARY KEY aliases the rowid
                let rowid_alias =
                    pk_count == 1 && col.pk > 0 && col.decl_type.eq_ignore_ascii_case("integer");
                trace!(
                    column = ?col.name,
                    decl_type = ?col.decl_type,
                    notnull = ?col.notnull,
                    pk = ?col.pk,
                    "Parsed column"
                );
                ColumnDescriptor {
                    unsigned: declares_unsigned(&col.decl_type),
                    nullable: !(col.notnull || col.pk > 0),
                    default: col.default,
                    auto_increment: rowid_alias,
                    comment: None,
                    ordinal: (col.cid + 1).max(0) as u32,
                    name: col.name,
                    sql_type: col.decl_type,
                }
            })
            .collect();
        Ok(columns)
    }

    fn primary_key(&mut self, table: &str) -> Result<Vec<String>, GormtoolError> {
        let mut info = self.table_info(table)?;
        info.retain(|c| c.pk > 0);
        info.sort_by_key(|c| c.pk);
        Ok(info.into_iter().map(|c| c.name).collect())
    }

    fn indexes(&mut self, table: &str) -> Result<Vec<IndexDescriptor>, GormtoolError> {
        let mut stmt = self
            .conn
            .prepare(
                r#"SELECT il.name, il."unique", il.origin, ii.name
                FROM pragma_index_list(?1) AS il
                JOIN pragma_index_info(il.name) AS ii
                ORDER BY il.name, ii.seqno"#,
            )
            .map_err(|e| catalog_error(table, "indexes", e))?;

        let rows = stmt
            .query_map([table], |row| {
                let origin: String = row.get(2)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)? != 0,
                    origin == "pk",
                    // expression index members have no column name
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(|e| catalog_error(table, "indexes", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| catalog_error(table, "indexes", e))?;

        let expression: HashSet<String> = rows
            .iter()
            .filter(|(_, _, _, column)| column.is_none())
            .map(|(name, ..)| name.clone())
            .collect();
        if !expression.is_empty() {
            debug!(table = ?table, indexes = ?expression, "Skipping expression indexes");
        }

        Ok(group_indexes(rows.into_iter().filter_map(
            |(name, unique, primary, column)| {
                if expression.contains(&name) {
                    return None;
                }
                Some((name, unique, primary, column?))
            },
        )))
    }

    fn foreign_keys(&mut self, table: &str) -> Result<Vec<ForeignKeyDescriptor>, GormtoolError> {
        let mut stmt = self
            .conn
            .prepare(
                r#"SELECT id, "table", "from", "to"
                FROM pragma_foreign_key_list(?1)
                ORDER BY id, seq"#,
            )
            .map_err(|e| catalog_error(table, "foreign keys", e))?;

        let rows = stmt
            .query_map([table], |row| {
                let id: i64 = row.get(0)?;
                let referenced_table: String = row.get(1)?;
                let from: String = row.get(2)?;
                // NULL when the key references the parent's primary key implicitly
                let to: Option<String> = row.get(3)?;
                Ok((
                    format!("fk_{}_{}", table, id),
                    from,
                    referenced_table,
                    to.unwrap_or_default(),
                ))
            })
            .map_err(|e| catalog_error(table, "foreign keys", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| catalog_error(table, "foreign keys", e))?;

        Ok(group_foreign_keys(rows))
    }
}
