use postgres::{Client, NoTls};
use tracing::{error, info, trace};

use super::{group_foreign_keys, group_indexes, non_empty, CatalogSource, DbKind};
use crate::prelude::GormtoolError;
use crate::schema::{ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor};

/// PostgreSQL catalog scoped to `current_schema()`
pub struct PostgresCatalog {
    client: Client,
}

impl PostgresCatalog {
    pub fn connect(dsn: &str) -> Result<Self, GormtoolError> {
        info!("Connecting to PostgreSQL");
        let client = Client::connect(dsn, NoTls).map_err(|e| {
            error!(error = ?e, "Failed to connect to PostgreSQL");
            GormtoolError::catalog("connection", format!("Failed to connect to PostgreSQL: {}", e))
        })?;
        info!("Connected to database");
        Ok(Self::new(client))
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn query(
        &mut self,
        scope: &str,
        what: &str,
        sql: &str,
        params: &[&(dyn postgres::types::ToSql + Sync)],
    ) -> Result<Vec<postgres::Row>, GormtoolError> {
        trace!(scope = ?scope, what = ?what, "Querying PostgreSQL catalog");
        self.client.query(sql, params).map_err(|e| {
            error!(scope = ?scope, error = ?e, "Failed to query {}", what);
            GormtoolError::catalog(scope, format!("Failed to query {}: {}", what, e))
        })
    }
}

impl CatalogSource for PostgresCatalog {
    fn kind(&self) -> DbKind {
        DbKind::Postgres
    }

    fn list_tables(&mut self) -> Result<Vec<String>, GormtoolError> {
        let sql = r#"
            SELECT c.relname AS table_name
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE c.relkind IN ('r', 'p')
                AND n.nspname = current_schema()
            ORDER BY c.relname
        "#;
        let rows = self.query("catalog", "tables", sql, &[])?;
        let tables = rows.iter().map(|row| row.get("table_name")).collect();
        trace!(tables = ?tables, "Tables found");
        Ok(tables)
    }

    fn columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>, GormtoolError> {
        let sql = r#"
            SELECT
                a.attname AS column_name,
                format_type(a.atttypid, a.atttypmod) AS data_type,
                NOT a.attnotnull AS is_nullable,
                pg_get_expr(d.adbin, d.adrelid) AS default_value,
                a.attidentity <> '' AS is_identity,
                col_description(c.oid, a.attnum) AS comment,
                a.attnum AS ordinal_position
            FROM pg_attribute a
            JOIN pg_class c ON c.oid = a.attrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            LEFT JOIN pg_attrdef d ON d.adrelid = c.oid AND d.adnum = a.attnum
            WHERE c.relname = $1
                AND n.nspname = current_schema()
                AND a.attnum > 0
                AND NOT a.attisdropped
            ORDER BY a.attnum
        "#;
        let rows = self.query(table, "columns", sql, &[&table])?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let column_name: String = row.get("column_name");
            let data_type: String = row.get("data_type");
            let is_nullable: bool = row.get("is_nullable");
            let default_value: Option<String> = row.get("default_value");
            let is_identity: bool = row.get("is_identity");
            let comment: Option<String> = row.get("comment");
            let ordinal: i16 = row.get("ordinal_position");

            let auto_increment = is_identity || is_sequence_default(&default_value);

            trace!(
                column = ?column_name,
                data_type = ?data_type,
                is_nullable = ?is_nullable,
                has_default = ?default_value.is_some(),
                auto_increment = ?auto_increment,
                "Parsed column"
            );

            columns.push(ColumnDescriptor {
                name: column_name,
                sql_type: data_type,
                nullable: is_nullable,
                default: default_value,
                unsigned: false,
                auto_increment,
                comment: non_empty(comment),
                ordinal: ordinal.max(0) as u32,
            });
        }

        Ok(columns)
    }

    fn primary_key(&mut self, table: &str) -> Result<Vec<String>, GormtoolError> {
        let sql = r#"
            SELECT a.attname AS column_name
            FROM pg_constraint con
            JOIN pg_class c ON c.oid = con.conrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = ANY(con.conkey)
            WHERE con.contype = 'p'
                AND c.relname = $1
                AND n.nspname = current_schema()
            ORDER BY array_position(con.conkey, a.attnum)
        "#;
        let rows = self.query(table, "primary key", sql, &[&table])?;
        let pk_columns = rows.iter().map(|row| row.get("column_name")).collect();
        trace!(table = ?table, primary_key = ?pk_columns, "Primary key found");
        Ok(pk_columns)
    }

    fn indexes(&mut self, table: &str) -> Result<Vec<IndexDescriptor>, GormtoolError> {
        let sql = r#"
            SELECT
                ic.relname AS index_name,
                i.indisunique AS is_unique,
                i.indisprimary AS is_primary,
                a.attname AS column_name
            FROM pg_index i
            JOIN pg_class c ON c.oid = i.indrelid
            JOIN pg_class ic ON ic.oid = i.indexrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = ANY(i.indkey)
            WHERE c.relname = $1
                AND n.nspname = current_schema()
            ORDER BY ic.relname, array_position(i.indkey::int2[], a.attnum)
        "#;
        let rows = self.query(table, "indexes", sql, &[&table])?;
        Ok(group_indexes(rows.iter().map(|row| {
            (
                row.get::<_, String>("index_name"),
                row.get::<_, bool>("is_unique"),
                row.get::<_, bool>("is_primary"),
                row.get::<_, String>("column_name"),
            )
        })))
    }

    fn foreign_keys(&mut self, table: &str) -> Result<Vec<ForeignKeyDescriptor>, GormtoolError> {
        let sql = r#"
            SELECT
                con.conname AS constraint_name,
                a.attname AS column_name,
                rc.relname AS referenced_table,
                ra.attname AS referenced_column
            FROM pg_constraint con
            JOIN pg_class c ON c.oid = con.conrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            JOIN pg_class rc ON rc.oid = con.confrelid
            JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, refnum, ord) ON true
            JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = k.attnum
            JOIN pg_attribute ra ON ra.attrelid = rc.oid AND ra.attnum = k.refnum
            WHERE con.contype = 'f'
                AND c.relname = $1
                AND n.nspname = current_schema()
            ORDER BY con.conname, k.ord
        "#;
        let rows = self.query(table, "foreign keys", sql, &[&table])?;
        Ok(group_foreign_keys(rows.iter().map(|row| {
            (
                row.get::<_, String>("constraint_name"),
                row.get::<_, String>("column_name"),
                row.get::<_, String>("referenced_table"),
                row.get::<_, String>("referenced_column"),
            )
        })))
    }

    fn table_comment(&mut self, table: &str) -> Result<Option<String>, GormtoolError> {
        let sql = r#"
            SELECT obj_description(c.oid, 'pg_class') AS comment
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE c.relname = $1
                AND n.nspname = current_schema()
        "#;
        let rows = self.query(table, "table comment", sql, &[&table])?;
        Ok(non_empty(rows.first().and_then(|row| row.get("comment"))))
    }
}

/// SERIAL/BIGSERIAL columns have nextval('sequence_name') as default
fn is_sequence_default(default_value: &Option<String>) -> bool {
    default_value
        .as_deref()
        .is_some_and(|d| d.to_lowercase().contains("nextval("))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_sequence_default() {
        assert!(is_sequence_default(&Some(
            "nextval('users_id_seq'::regclass)".to_string()
        )));
        assert!(!is_sequence_default(&Some("'default_value'".to_string())));
        assert!(!is_sequence_default(&Some("now()".to_string())));
        assert!(!is_sequence_default(&None));
    }
}
