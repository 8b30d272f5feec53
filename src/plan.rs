//! Per-table field planning
//!
//! A [`TablePlan`] holds everything the emitters need for one table: the
//! resolved struct name and one [`FieldPlan`] per column, in column order.

use std::collections::HashMap;

use tracing::{debug, error};

use crate::config::GenerationConfig;
use crate::error::GormtoolError;
use crate::naming::{resolve_field_name, resolve_table_name, resolve_tag_name};
use crate::schema::{ColumnDescriptor, TableDescriptor};
use crate::types::{map_type, TargetType};

/// Index membership of one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHint {
    pub name: String,
    pub unique: bool,
    /// 1-based position of the column inside the index
    pub priority: usize,
}

/// Fully resolved output for one column
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPlan {
    pub column: String,
    /// Exported Go field name
    pub ident: String,
    /// `json` tag value
    pub tag_name: String,
    pub target: TargetType,
    pub sql_type: String,
    pub comment_lines: Vec<String>,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub nullable: bool,
    pub index_hints: Vec<IndexHint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TablePlan {
    pub table: TableDescriptor,
    pub struct_name: String,
    pub fields: Vec<FieldPlan>,
}

impl TablePlan {
    pub fn primary_key_fields(&self) -> Vec<&FieldPlan> {
        self.fields.iter().filter(|f| f.primary_key).collect()
    }
}

/// Plan one table
pub fn plan_table(
    table: &TableDescriptor,
    config: &GenerationConfig,
) -> Result<TablePlan, GormtoolError> {
    let struct_name = resolve_table_name(&table.name, &config.table_naming);

    let fields = table
        .columns
        .iter()
        .map(|col| plan_field(table, col, config))
        .collect::<Result<Vec<_>, _>>()?;

    check_unique(&table.name, &fields, |f| f.ident.as_str())?;
    check_unique(&table.name, &fields, |f| f.tag_name.as_str())?;

    debug!(
        table = ?table.name,
        struct_name = ?struct_name,
        fields = ?fields.len(),
        "Planned table"
    );

    Ok(TablePlan {
        table: table.clone(),
        struct_name,
        fields,
    })
}

/// Plan every table, rejecting two tables that resolve to the same struct name
pub fn plan_tables(
    tables: &[TableDescriptor],
    config: &GenerationConfig,
) -> Result<Vec<TablePlan>, GormtoolError> {
    let plans = tables
        .iter()
        .map(|t| plan_table(t, config))
        .collect::<Result<Vec<_>, _>>()?;

    let mut seen: HashMap<&str, &str> = HashMap::new();
    for plan in &plans {
        if let Some(first) = seen.insert(plan.struct_name.as_str(), plan.table.name.as_str()) {
            error!(struct_name = ?plan.struct_name, "Two tables resolve to the same struct");
            return Err(GormtoolError::NamingCollision {
                table: "<schema>".to_string(),
                identifier: plan.struct_name.clone(),
                first: first.to_string(),
                second: plan.table.name.clone(),
            });
        }
    }
    Ok(plans)
}

fn plan_field(
    table: &TableDescriptor,
    col: &ColumnDescriptor,
    config: &GenerationConfig,
) -> Result<FieldPlan, GormtoolError> {
    let target = map_type(&table.name, col, &config.type_policy)?;

    let index_hints = table
        .indexes_for(&col.name)
        .into_iter()
        .map(|(idx, priority)| IndexHint {
            name: idx.name.clone(),
            unique: idx.unique,
            priority,
        })
        .collect();

    Ok(FieldPlan {
        column: col.name.clone(),
        ident: resolve_field_name(&col.name),
        tag_name: resolve_tag_name(&col.name, config.json_tag_convention),
        target,
        sql_type: col.sql_type.clone(),
        comment_lines: comment_lines(col.comment.as_deref()),
        primary_key: table.is_primary_key(&col.name),
        auto_increment: col.auto_increment,
        nullable: col.nullable,
        index_hints,
    })
}

/// Split a catalog comment into trimmed, non-empty lines
pub(crate) fn comment_lines(comment: Option<&str>) -> Vec<String> {
    comment
        .map(|c| {
            c.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn check_unique<'a>(
    table: &str,
    fields: &'a [FieldPlan],
    key: impl Fn(&'a FieldPlan) -> &'a str,
) -> Result<(), GormtoolError> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for field in fields {
        let name = key(field);
        if let Some(first) = seen.insert(name, field.column.as_str()) {
            error!(table = ?table, identifier = ?name, "Naming collision");
            return Err(GormtoolError::NamingCollision {
                table: table.to_string(),
                identifier: name.to_string(),
                first: first.to_string(),
                second: field.column.clone(),
            });
        }
    }
    Ok(())
}
