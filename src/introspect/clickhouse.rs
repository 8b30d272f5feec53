#[cfg(feature = "mysql")]
use tracing::info;
use tracing::{error, trace};

#[cfg(feature = "mysql")]
use super::mysql::MysqlClient;
use super::{cell, cell_string, non_empty, CatalogSource, DbKind, TextQuery, TextRow};
use crate::prelude::GormtoolError;
use crate::schema::{ColumnDescriptor, IndexDescriptor};

/// ClickHouse catalog read from `system.tables` / `system.columns`, scoped to
/// `currentDatabase()`
///
/// ClickHouse has no foreign keys; data-skipping indexes over plain columns
/// are reported as non-unique indexes.
pub struct ClickHouseCatalog<C: TextQuery> {
    conn: C,
}

#[cfg(feature = "mysql")]
impl ClickHouseCatalog<MysqlClient> {
    /// Connect through ClickHouse's MySQL-compatible interface
    pub fn connect(dsn: &str) -> Result<Self, GormtoolError> {
        info!("Connecting to ClickHouse over the MySQL interface");
        let client = MysqlClient::connect_text(&clickhouse_url(dsn)?)?;
        info!("Connected to database");
        Ok(Self::new(client))
    }
}

impl<C: TextQuery> ClickHouseCatalog<C> {
    pub fn new(conn: C) -> Self {
        Self { conn }
    }

    fn fetch(
        &mut self,
        scope: &str,
        what: &str,
        sql: &str,
        params: &[&str],
    ) -> Result<Vec<TextRow>, GormtoolError> {
        trace!(scope = ?scope, what = ?what, "Querying ClickHouse catalog");
        self.conn.query_text(sql, params).map_err(|e| {
            error!(scope = ?scope, error = ?e, "Failed to query {}", what);
            GormtoolError::catalog(scope, format!("Failed to query {}: {}", what, e))
        })
    }
}

impl<C: TextQuery> CatalogSource for ClickHouseCatalog<C> {
    fn kind(&self) -> DbKind {
        DbKind::ClickHouse
    }

    fn list_tables(&mut self) -> Result<Vec<String>, GormtoolError> {
        let sql = r#"
            SELECT name
            FROM system.tables
            WHERE database = currentDatabase()
                AND is_temporary = 0
                AND engine NOT IN ('View', 'MaterializedView', 'LiveView', 'Dictionary')
            ORDER BY name
        "#;
        let rows = self.fetch("catalog", "tables", sql, &[])?;
        Ok(rows.iter().map(|row| cell_string(row, 0)).collect())
    }

    fn columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>, GormtoolError> {
        let sql = r#"
            SELECT name, type, default_kind, default_expression, comment, position
            FROM system.columns
            WHERE database = currentDatabase()
                AND table = ?
            ORDER BY position
        "#;
        let rows = self.fetch(table, "columns", sql, &[table])?;

        rows.iter()
            .map(|row| {
                let sql_type = cell_string(row, 1);
                let has_default = cell(row, 2).is_some_and(|kind| !kind.trim().is_empty());
                let ordinal = cell(row, 5)
                    .and_then(|s| s.trim().parse::<u32>().ok())
                    .ok_or_else(|| GormtoolError::catalog(table, "column row without position"))?;
                Ok(ColumnDescriptor {
                    name: cell_string(row, 0),
                    nullable: sql_type.contains("Nullable("),
                    unsigned: sql_type.contains("UInt"),
                    sql_type,
                    default: if has_default {
                        Some(cell_string(row, 3))
                    } else {
                        None
                    },
                    auto_increment: false,
                    comment: non_empty(cell(row, 4).map(str::to_string)),
                    ordinal,
                })
            })
            .collect()
    }

    fn primary_key(&mut self, table: &str) -> Result<Vec<String>, GormtoolError> {
        let sql = r#"
            SELECT primary_key
            FROM system.tables
            WHERE database = currentDatabase()
                AND name = ?
        "#;
        let rows = self.fetch(table, "primary key", sql, &[table])?;
        let expr = rows.first().and_then(|row| cell(row, 0)).unwrap_or_default();
        Ok(plain_columns(expr).unwrap_or_default())
    }

    fn indexes(&mut self, table: &str) -> Result<Vec<IndexDescriptor>, GormtoolError> {
        let sql = r#"
            SELECT name, expr
            FROM system.data_skipping_indices
            WHERE database = currentDatabase()
                AND table = ?
            ORDER BY name
        "#;
        let rows = self.fetch(table, "indexes", sql, &[table])?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let columns = plain_columns(cell(row, 1).unwrap_or_default())?;
                Some(IndexDescriptor {
                    name: cell_string(row, 0),
                    columns,
                    unique: false,
                    primary: false,
                })
            })
            .collect())
    }

    fn table_comment(&mut self, table: &str) -> Result<Option<String>, GormtoolError> {
        let sql = r#"
            SELECT comment
            FROM system.tables
            WHERE database = currentDatabase()
                AND name = ?
        "#;
        let rows = self.fetch(table, "table comment", sql, &[table])?;
        Ok(non_empty(rows.first().and_then(|row| cell(row, 0)).map(str::to_string)))
    }
}

/// `mysql://` URL for the MySQL interface port named by a ClickHouse DSN
///
/// Query parameters belong to the native ClickHouse drivers and are dropped.
#[cfg_attr(not(feature = "mysql"), allow(dead_code))]
fn clickhouse_url(dsn: &str) -> Result<String, GormtoolError> {
    let dsn = dsn.trim();
    let rest = dsn
        .strip_prefix("clickhouse://")
        .or_else(|| dsn.strip_prefix("mysql://"))
        .ok_or_else(|| {
            GormtoolError::Config(
                "ClickHouse DSN must be a clickhouse:// URL pointing at the MySQL interface port"
                    .to_string(),
            )
        })?;
    let rest = rest.split_once('?').map_or(rest, |(main, _)| main);
    Ok(format!("mysql://{}", rest))
}

/// Split a key expression like `id, ts` or `(id, ts)` into column names;
/// `None` when it contains anything but bare identifiers
fn plain_columns(expr: &str) -> Option<Vec<String>> {
    let expr = expr.trim();
    let expr = expr
        .strip_prefix('(')
        .and_then(|e| e.strip_suffix(')'))
        .unwrap_or(expr);
    let columns: Vec<String> = expr
        .split(',')
        .map(|c| c.trim().trim_matches('`').to_string())
        .filter(|c| !c.is_empty())
        .collect();
    let plain = columns
        .iter()
        .all(|c| c.chars().all(|ch| ch.is_alphanumeric() || ch == '_'));
    if plain {
        Some(columns)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::tests::FakeQuery;
    use crate::introspect::{read_catalog, TableFilter};

    #[test]
    fn test_plain_columns() {
        assert_eq!(plain_columns("id"), Some(vec!["id".to_string()]));
        assert_eq!(
            plain_columns("(tenant_id, `ts`)"),
            Some(vec!["tenant_id".to_string(), "ts".to_string()])
        );
        assert_eq!(plain_columns(""), Some(vec![]));
        assert_eq!(plain_columns("toDate(ts)"), None);
    }

    #[test]
    fn test_clickhouse_url() {
        assert_eq!(
            clickhouse_url("clickhouse://default:pw@localhost:9004/analytics?dial_timeout=10s")
                .unwrap(),
            "mysql://default:pw@localhost:9004/analytics"
        );
        assert_eq!(
            clickhouse_url("mysql://default@ch:9004/analytics").unwrap(),
            "mysql://default@ch:9004/analytics"
        );
        assert!(matches!(
            clickhouse_url("tcp://localhost:9000?database=analytics"),
            Err(GormtoolError::Config(_))
        ));
    }

    #[test]
    fn test_reads_events_table() {
        let fake = FakeQuery::default()
            .respond("is_temporary = 0", vec![vec![Some("events")]])
            .respond(
                "FROM system.columns",
                vec![
                    vec![Some("id"), Some("UInt64"), Some(""), Some(""), Some(""), Some("1")],
                    vec![
                        Some("kind"),
                        Some("LowCardinality(Nullable(String))"),
                        Some(""),
                        Some(""),
                        Some("event kind"),
                        Some("2"),
                    ],
                    vec![
                        Some("ts"),
                        Some("DateTime64(3)"),
                        Some("DEFAULT"),
                        Some("now64()"),
                        Some(""),
                        Some("3"),
                    ],
                ],
            )
            .respond("SELECT primary_key", vec![vec![Some("id, ts")]])
            .respond(
                "system.data_skipping_indices",
                vec![
                    vec![Some("idx_kind"), Some("kind")],
                    vec![Some("idx_day"), Some("toDate(ts)")],
                ],
            )
            .respond("SELECT comment", vec![vec![Some("")]]);
        let mut catalog = ClickHouseCatalog::new(fake);

        let tables = read_catalog(&mut catalog, &TableFilter::default()).unwrap();
        let events = &tables[0];

        assert_eq!(events.primary_key, vec!["id", "ts"]);
        assert!(events.columns[0].unsigned);
        assert!(!events.columns[0].nullable);
        assert!(events.columns[1].nullable);
        assert_eq!(events.columns[2].default.as_deref(), Some("now64()"));
        assert_eq!(events.indexes.len(), 1);
        assert_eq!(events.indexes[0].columns, vec!["kind"]);
        assert_eq!(events.comment, None);
    }
}
