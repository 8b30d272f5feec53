//! Catalog data structures
//!
//! These types describe what the catalog reader found and form the contract
//! between introspection (produces) and planning/emission (consumes). They are
//! never mutated once a table has been read.

/// Database table
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    pub name: String,
    pub comment: Option<String>,
    /// Columns in ordinal order
    pub columns: Vec<ColumnDescriptor>,
    pub indexes: Vec<IndexDescriptor>,
    /// Column names that form the primary key (in key order)
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|col| col.name == name)
    }

    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_key.iter().any(|pk| pk == column)
    }

    /// Get primary key columns in key order
    pub fn primary_key_columns(&self) -> Vec<&ColumnDescriptor> {
        self.primary_key
            .iter()
            .filter_map(|pk_name| self.column(pk_name))
            .collect()
    }

    /// Non-primary indexes that include `column`, with the column's 1-based
    /// position inside each index
    pub fn indexes_for(&self, column: &str) -> Vec<(&IndexDescriptor, usize)> {
        self.indexes
            .iter()
            .filter(|idx| !idx.primary)
            .filter_map(|idx| {
                idx.columns
                    .iter()
                    .position(|c| c == column)
                    .map(|pos| (idx, pos + 1))
            })
            .collect()
    }
}

/// A table column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Raw type string as reported by the catalog (e.g. `int unsigned`)
    pub sql_type: String,
    pub nullable: bool,
    /// Server-side default expression, if any
    pub default: Option<String>,
    /// Only meaningful for numeric types
    pub unsigned: bool,
    /// SERIAL, IDENTITY, AUTO_INCREMENT, or SQLite rowid alias
    pub auto_increment: bool,
    pub comment: Option<String>,
    /// 1-based position within the table
    pub ordinal: u32,
}

impl ColumnDescriptor {
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescriptor {
    pub name: String,
    /// Member columns in index order
    pub columns: Vec<String>,
    pub unique: bool,
    /// Index backing the primary key
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyDescriptor {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

/// Whether a declared column type carries an `unsigned` marker
pub fn declares_unsigned(sql_type: &str) -> bool {
    sql_type
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .any(|word| word == "unsigned")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn column(name: &str, sql_type: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            nullable: false,
            default: None,
            unsigned: declares_unsigned(sql_type),
            auto_increment: false,
            comment: None,
            ordinal: 0,
        }
    }

    pub fn table(name: &str, columns: Vec<ColumnDescriptor>) -> TableDescriptor {
        let columns = columns
            .into_iter()
            .enumerate()
            .map(|(i, mut col)| {
                col.ordinal = i as u32 + 1;
                col
            })
            .collect();
        TableDescriptor {
            name: name.to_string(),
            comment: None,
            columns,
            indexes: vec![],
            primary_key: vec![],
            foreign_keys: vec![],
        }
    }

    #[test]
    fn test_declares_unsigned() {
        assert!(declares_unsigned("int unsigned"));
        assert!(declares_unsigned("INT(10) UNSIGNED ZEROFILL"));
        assert!(declares_unsigned("bigint(20)unsigned"));
        assert!(!declares_unsigned("int"));
        assert!(!declares_unsigned("varchar(32)"));
    }

    #[test]
    fn test_primary_key_columns_in_key_order() {
        let mut t = table(
            "order_items",
            vec![
                column("item_id", "int"),
                column("order_id", "int"),
                column("qty", "int"),
            ],
        );
        t.primary_key = vec!["order_id".to_string(), "item_id".to_string()];

        let names: Vec<_> = t
            .primary_key_columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["order_id", "item_id"]);
        assert!(t.is_primary_key("item_id"));
        assert!(!t.is_primary_key("qty"));
    }

    #[test]
    fn test_indexes_for_skips_primary() {
        let mut t = table("users", vec![column("id", "int"), column("email", "text")]);
        t.indexes = vec![
            IndexDescriptor {
                name: "PRIMARY".to_string(),
                columns: vec!["id".to_string()],
                unique: true,
                primary: true,
            },
            IndexDescriptor {
                name: "idx_email_id".to_string(),
                columns: vec!["email".to_string(), "id".to_string()],
                unique: true,
                primary: false,
            },
        ];

        let hits = t.indexes_for("id");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.name, "idx_email_id");
        assert_eq!(hits[0].1, 2);
        assert!(t.indexes_for("missing").is_empty());
    }
}
