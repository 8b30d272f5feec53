#[cfg(feature = "mysql")]
use mysql::prelude::Queryable;
#[cfg(feature = "mysql")]
use mysql::{Conn, Opts, Row, Value};
#[cfg(feature = "mysql")]
use tracing::info;
use tracing::{error, trace};

use super::{
    cell, cell_flag, cell_string, group_foreign_keys, group_indexes, non_empty, CatalogSource,
    DbKind, TextQuery, TextRow,
};
use crate::prelude::GormtoolError;
use crate::schema::{declares_unsigned, ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor};

/// MySQL catalog read from `information_schema`, scoped to `DATABASE()`
pub struct MysqlCatalog<C: TextQuery> {
    conn: C,
}

#[cfg(feature = "mysql")]
impl MysqlCatalog<MysqlClient> {
    /// Connect with a `mysql://` URL or a Go driver DSN
    pub fn connect(dsn: &str) -> Result<Self, GormtoolError> {
        info!("Connecting to MySQL");
        let client = MysqlClient::connect(&mysql_url(dsn)?)?;
        info!("Connected to database");
        Ok(Self::new(client))
    }
}

impl<C: TextQuery> MysqlCatalog<C> {
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
        trace!(scope = ?scope, what = ?what, "Querying MySQL catalog");
        self.conn.query_text(sql, params).map_err(|e| {
            error!(scope = ?scope, error = ?e, "Failed to query {}", what);
            GormtoolError::catalog(scope, format!("Failed to query {}: {}", what, e))
        })
    }
}

impl<C: TextQuery> CatalogSource for MysqlCatalog<C> {
    fn kind(&self) -> DbKind {
        DbKind::Mysql
    }

    fn list_tables(&mut self) -> Result<Vec<String>, GormtoolError> {
        let sql = r#"
            SELECT TABLE_NAME
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = DATABASE()
                AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;
        let rows = self.fetch("catalog", "tables", sql, &[])?;
        Ok(rows.iter().map(|row| cell_string(row, 0)).collect())
    }

    fn columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>, GormtoolError> {
        let sql = r#"
            SELECT
                COLUMN_NAME,
                COLUMN_TYPE,
                IS_NULLABLE,
                COLUMN_DEFAULT,
                EXTRA,
                COLUMN_COMMENT,
                ORDINAL_POSITION
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE()
                AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;
        let rows = self.fetch(table, "columns", sql, &[table])?;

        rows.iter()
            .map(|row| {
                let sql_type = cell_string(row, 1);
                let ordinal = cell(row, 6)
                    .and_then(|s| s.trim().parse::<u32>().ok())
                    .ok_or_else(|| {
                        GormtoolError::catalog(table, "column row without ordinal position")
                    })?;
                Ok(ColumnDescriptor {
                    name: cell_string(row, 0),
                    unsigned: declares_unsigned(&sql_type),
                    sql_type,
                    nullable: cell_flag(row, 2),
                    default: cell(row, 3).map(str::to_string),
                    auto_increment: cell(row, 4)
                        .is_some_and(|extra| extra.to_lowercase().contains("auto_increment")),
                    comment: non_empty(cell(row, 5).map(str::to_string)),
                    ordinal,
                })
            })
            .collect()
    }

    fn primary_key(&mut self, table: &str) -> Result<Vec<String>, GormtoolError> {
        let sql = r#"
            SELECT COLUMN_NAME
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE()
                AND TABLE_NAME = ?
                AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
        "#;
        let rows = self.fetch(table, "primary key", sql, &[table])?;
        Ok(rows.iter().map(|row| cell_string(row, 0)).collect())
    }

    fn indexes(&mut self, table: &str) -> Result<Vec<IndexDescriptor>, GormtoolError> {
        let sql = r#"
            SELECT INDEX_NAME, NON_UNIQUE, COLUMN_NAME
            FROM information_schema.STATISTICS
            WHERE TABLE_SCHEMA = DATABASE()
                AND TABLE_NAME = ?
            ORDER BY INDEX_NAME, SEQ_IN_INDEX
        "#;
        let rows = self.fetch(table, "indexes", sql, &[table])?;
        Ok(group_indexes(rows.iter().map(|row| {
            let name = cell_string(row, 0);
            let primary = name == "PRIMARY";
            (name, !cell_flag(row, 1), primary, cell_string(row, 2))
        })))
    }

    fn foreign_keys(&mut self, table: &str) -> Result<Vec<ForeignKeyDescriptor>, GormtoolError> {
        let sql = r#"
            SELECT CONSTRAINT_NAME, COLUMN_NAME, REFERENCED_TABLE_NAME, REFERENCED_COLUMN_NAME
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE()
                AND TABLE_NAME = ?
                AND REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
        "#;
        let rows = self.fetch(table, "foreign keys", sql, &[table])?;
        Ok(group_foreign_keys(rows.iter().map(|row| {
            (
                cell_string(row, 0),
                cell_string(row, 1),
                cell_string(row, 2),
                cell_string(row, 3),
            )
        })))
    }

    fn table_comment(&mut self, table: &str) -> Result<Option<String>, GormtoolError> {
        let sql = r#"
            SELECT TABLE_COMMENT
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = DATABASE()
                AND TABLE_NAME = ?
        "#;
        let rows = self.fetch(table, "table comment", sql, &[table])?;
        Ok(non_empty(rows.first().and_then(|row| cell(row, 0)).map(str::to_string)))
    }
}

/// How statements reach the server
#[cfg(feature = "mysql")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    /// Server-side prepared statements
    Binary,
    /// Plain queries with parameters inlined as quoted literals
    Text,
}

/// [`TextQuery`] over a `mysql` crate connection
///
/// Also serves ClickHouse through its MySQL-compatible interface, which only
/// speaks the text protocol.
#[cfg(feature = "mysql")]
pub struct MysqlClient {
    conn: Conn,
    protocol: Protocol,
}

#[cfg(feature = "mysql")]
impl MysqlClient {
    pub fn connect(url: &str) -> Result<Self, GormtoolError> {
        Self::open(url, Protocol::Binary)
    }

    /// Connect to a server without prepared statement support
    pub fn connect_text(url: &str) -> Result<Self, GormtoolError> {
        Self::open(url, Protocol::Text)
    }

    fn open(url: &str, protocol: Protocol) -> Result<Self, GormtoolError> {
        let opts = Opts::from_url(url)
            .map_err(|e| GormtoolError::Config(format!("Invalid MySQL connection URL: {}", e)))?;
        let conn = Conn::new(opts).map_err(|e| {
            error!(error = ?e, "Failed to connect over the MySQL protocol");
            GormtoolError::catalog("connection", format!("Failed to connect: {}", e))
        })?;
        Ok(Self { conn, protocol })
    }
}

#[cfg(feature = "mysql")]
impl TextQuery for MysqlClient {
    fn query_text(&mut self, sql: &str, params: &[&str]) -> Result<Vec<TextRow>, GormtoolError> {
        let rows = match self.protocol {
            Protocol::Binary => {
                let params: Vec<Value> = params.iter().map(|p| Value::from(*p)).collect();
                self.conn.exec::<Row, _, _>(sql, params)
            }
            Protocol::Text => self.conn.query::<Row, _>(bind_literals(sql, params)?),
        }
        .map_err(|e| GormtoolError::catalog("query", e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| row.unwrap().into_iter().map(value_text).collect())
            .collect())
    }
}

#[cfg(feature = "mysql")]
fn value_text(value: Value) -> Option<String> {
    match value {
        Value::NULL => None,
        Value::Bytes(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Value::Int(n) => Some(n.to_string()),
        Value::UInt(n) => Some(n.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Double(f) => Some(f.to_string()),
        Value::Date(y, m, d, h, mi, s, _) => Some(format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            y, m, d, h, mi, s
        )),
        Value::Time(negative, days, h, mi, s, _) => Some(format!(
            "{}{:02}:{:02}:{:02}",
            if negative { "-" } else { "" },
            u32::from(h) + days * 24,
            mi,
            s
        )),
    }
}

/// Inline `?` placeholders outside string literals as quoted literals
#[cfg_attr(not(feature = "mysql"), allow(dead_code))]
pub(crate) fn bind_literals(sql: &str, params: &[&str]) -> Result<String, GormtoolError> {
    let mut out = String::with_capacity(sql.len());
    let mut remaining = params.iter();
    let mut in_literal = false;
    for c in sql.chars() {
        match c {
            '\'' => {
                in_literal = !in_literal;
                out.push(c);
            }
            '?' if !in_literal => {
                let value = remaining.next().ok_or_else(|| {
                    GormtoolError::catalog("query", "more placeholders than parameters")
                })?;
                out.push('\'');
                for v in value.chars() {
                    if v == '\'' || v == '\\' {
                        out.push('\\');
                    }
                    out.push(v);
                }
                out.push('\'');
            }
            _ => out.push(c),
        }
    }
    if remaining.next().is_some() {
        return Err(GormtoolError::catalog(
            "query",
            "more parameters than placeholders",
        ));
    }
    Ok(out)
}

/// `mysql://` connection URL for a MySQL DSN
///
/// Go driver DSNs (`user:pass@tcp(host:3306)/shop?parseTime=true`) are
/// rewritten; their driver parameters do not apply here and are dropped.
#[cfg_attr(not(feature = "mysql"), allow(dead_code))]
pub(crate) fn mysql_url(dsn: &str) -> Result<String, GormtoolError> {
    let dsn = dsn.trim();
    if dsn.starts_with("mysql://") {
        return Ok(dsn.to_string());
    }

    let main = dsn.split_once('?').map_or(dsn, |(main, _)| main);
    let slash = main.rfind('/').ok_or_else(|| {
        GormtoolError::Config("MySQL DSN must name a database after '/'".to_string())
    })?;
    let (head, database) = (&main[..slash], &main[slash + 1..]);
    let (userinfo, address) = match head.rfind('@') {
        Some(at) => (&head[..at], &head[at + 1..]),
        None => ("", head),
    };

    let address = match address.split_once('(') {
        Some((net, rest)) => {
            if net != "tcp" {
                return Err(GormtoolError::Config(format!(
                    "MySQL network {:?} is not supported, use tcp",
                    net
                )));
            }
            rest.strip_suffix(')').unwrap_or(rest)
        }
        None => address,
    };
    let address = if address.is_empty() {
        "127.0.0.1:3306"
    } else {
        address
    };

    let credentials = match userinfo.split_once(':') {
        _ if userinfo.is_empty() => String::new(),
        Some((user, pass)) => format!("{}:{}@", percent_encode(user), percent_encode(pass)),
        None => format!("{}@", percent_encode(userinfo)),
    };
    Ok(format!("mysql://{}{}/{}", credentials, address, database))
}

/// Escape everything but unreserved URL characters
#[cfg_attr(not(feature = "mysql"), allow(dead_code))]
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}
