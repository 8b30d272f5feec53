//! Go code generator
//!
//! Generates gorm models and a fluent query API built on `gorm.io/gorm/clause`.

use std::collections::BTreeSet;

use minijinja::{context, Environment, Value};
use tracing::{debug, info};

use crate::codegen::{CodeGenerator, OutputLayout, SourceUnit};
use crate::config::GenerationConfig;
use crate::error::GormtoolError;
use crate::plan::{FieldPlan, TablePlan};

/// Go code generator
pub struct GoGenerator {
    env: Environment<'static>,
}

impl GoGenerator {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);

        // Register templates
        env.add_template("model.go", include_str!("templates/model.go.jinja"))
            .expect("Failed to load go model template");
        env.add_template("query.go", include_str!("templates/query.go.jinja"))
            .expect("Failed to load go query template");
        env.add_template("entry.go", include_str!("templates/entry.go.jinja"))
            .expect("Failed to load go entry template");
        env.add_template("query_test.go", include_str!("templates/query_test.go.jinja"))
            .expect("Failed to load go query test template");
        env.add_template("test_helper.go", include_str!("templates/test_helper.go.jinja"))
            .expect("Failed to load go test helper template");

        Self { env }
    }

    fn render(&self, template: &str, unit: &str, ctx: Value) -> Result<String, GormtoolError> {
        let template = self
            .env
            .get_template(template)
            .map_err(|e| GormtoolError::CodeGen {
                unit: unit.to_string(),
                message: format!("Template error: {}", e),
            })?;

        template.render(ctx).map_err(|e| GormtoolError::CodeGen {
            unit: unit.to_string(),
            message: format!("Render error: {}", e),
        })
    }
}

impl Default for GoGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator for GoGenerator {
    fn emit_model(
        &self,
        plan: &TablePlan,
        config: &GenerationConfig,
        layout: &OutputLayout,
    ) -> Result<SourceUnit, GormtoolError> {
        let imports: BTreeSet<&str> = plan
            .fields
            .iter()
            .filter_map(|f| f.target.base.import())
            .collect();

        let ident_width = column_width(plan.fields.iter().map(|f| f.ident.as_str()));
        let types: Vec<String> = plan.fields.iter().map(|f| f.target.to_string()).collect();
        let type_width = column_width(types.iter().map(String::as_str));

        let fields_ctx: Vec<_> = plan
            .fields
            .iter()
            .zip(&types)
            .map(|(field, ty)| {
                let tag = struct_tag(&gorm_tag(field, config), &field.tag_name);
                context! {
                    comment_lines => &field.comment_lines,
                    line => format!(
                        "{:iw$} {:tw$} {}",
                        field.ident,
                        ty,
                        tag,
                        iw = ident_width,
                        tw = type_width,
                    ),
                }
            })
            .collect();

        let ctx = context! {
            package => &layout.model_package,
            imports => imports,
            struct_name => &plan.struct_name,
            table => &plan.table.name,
            table_literal => go_string(&plan.table.name),
            comment_lines => crate::plan::comment_lines(plan.table.comment.as_deref()),
            fields => fields_ctx,
        };

        let contents = self.render("model.go", &plan.table.name, ctx)?;
        debug!(table = ?plan.table.name, struct_name = ?plan.struct_name, "Rendered model");
        Ok(SourceUnit::new(layout.model_file(&plan.table.name), contents))
    }

    fn emit_query_api(
        &self,
        plan: &TablePlan,
        layout: &OutputLayout,
    ) -> Result<SourceUnit, GormtoolError> {
        let model_import = layout.require_model_import_path()?;

        let std_imports: BTreeSet<&str> = plan
            .fields
            .iter()
            .filter_map(|f| f.target.base.import())
            .collect();

        let fields_ctx: Vec<_> = plan
            .fields
            .iter()
            .map(|field| field_context(plan, field, layout))
            .collect();

        let ctx = context! {
            package => &layout.query_package,
            std_imports => std_imports,
            model_import => model_import,
            model_package => &layout.model_package,
            struct_name => &plan.struct_name,
            query_type => query_type(plan),
            table => &plan.table.name,
            fields => fields_ctx,
        };

        let contents = self.render("query.go", &plan.table.name, ctx)?;
        debug!(table = ?plan.table.name, "Rendered query API");
        Ok(SourceUnit::new(layout.query_file(&plan.table.name), contents))
    }

    fn emit_query_entry(
        &self,
        plans: &[TablePlan],
        layout: &OutputLayout,
    ) -> Result<SourceUnit, GormtoolError> {
        let ctx = context! {
            package => &layout.query_package,
            tables => plans.iter().map(|plan| {
                context! {
                    table => &plan.table.name,
                    struct_name => &plan.struct_name,
                    query_type => query_type(plan),
                }
            }).collect::<Vec<_>>(),
        };

        let contents = self.render("entry.go", "entry", ctx)?;
        info!(path = ?layout.entry_file, tables = plans.len(), "Rendered query entry");
        Ok(SourceUnit::new(layout.entry_file.clone(), contents))
    }

    fn emit_query_test(
        &self,
        plan: &TablePlan,
        layout: &OutputLayout,
    ) -> Result<SourceUnit, GormtoolError> {
        let sample = plan.fields.first().ok_or_else(|| GormtoolError::CodeGen {
            unit: plan.table.name.clone(),
            message: "table has no fields to query".to_string(),
        })?;

        let ctx = context! {
            package => &layout.query_package,
            struct_name => &plan.struct_name,
            needs_time => sample.target.base.import() == Some("time"),
            sample => context! {
                ident => &sample.ident,
                zero => sample.target.base.zero_literal(),
            },
        };

        let contents = self.render("query_test.go", &plan.table.name, ctx)?;
        Ok(SourceUnit::new(layout.query_test_file(&plan.table.name), contents))
    }

    fn emit_test_helper(
        &self,
        plans: &[TablePlan],
        layout: &OutputLayout,
    ) -> Result<SourceUnit, GormtoolError> {
        let ctx = context! {
            package => &layout.query_package,
            model_import => layout.require_model_import_path()?,
            model_package => &layout.model_package,
            structs => plans.iter().map(|p| &p.struct_name).collect::<Vec<_>>(),
        };

        let contents = self.render("test_helper.go", "test helper", ctx)?;
        Ok(SourceUnit::new(layout.test_helper_file(), contents))
    }
}

fn query_type(plan: &TablePlan) -> String {
    format!("{}Query", plan.struct_name)
}

/// Build template context for one field of the query API
fn field_context(plan: &TablePlan, field: &FieldPlan, layout: &OutputLayout) -> Value {
    let column = go_string(&field.column);
    context! {
        ident => &field.ident,
        column => &field.column,
        column_literal => &column,
        column_expr => format!(
            "tableColumn({}.TableName{}, {})",
            layout.model_package, plan.struct_name, column
        ),
        param_type => field.target.base.name(),
        ordered => field.target.base.is_ordered(),
        string => field.target.base.is_string(),
        nullable => field.nullable,
    }
}

fn column_width<'a>(items: impl Iterator<Item = &'a str>) -> usize {
    items.map(|s| s.chars().count()).max().unwrap_or(0)
}

/// Build the `gorm` tag value for a field
fn gorm_tag(field: &FieldPlan, config: &GenerationConfig) -> String {
    let mut parts = vec![format!("column:{}", tag_value(&field.column))];
    if config.field_with_type_tag {
        parts.push(format!("type:{}", tag_value(&field.sql_type)));
    }
    if field.primary_key {
        parts.push("primaryKey".to_string());
    }
    if field.auto_increment {
        parts.push("autoIncrement:true".to_string());
    }
    if !field.nullable && !field.primary_key {
        parts.push("not null".to_string());
    }
    if config.field_with_index_tag {
        for hint in &field.index_hints {
            let kind = if hint.unique { "uniqueIndex" } else { "index" };
            parts.push(format!(
                "{}:{},priority:{}",
                kind,
                tag_value(&hint.name),
                hint.priority
            ));
        }
    }
    parts.join(";")
}

/// gorm splits tag settings on `;` unless it is backslash-escaped
fn tag_value(value: &str) -> String {
    value.replace(';', "\\;")
}

/// Full struct tag literal: a raw string unless the tag itself holds a backtick
fn struct_tag(gorm: &str, json: &str) -> String {
    let tag = format!(
        "gorm:\"{}\" json:\"{}\"",
        escape_tag_value(gorm),
        escape_tag_value(json)
    );
    if tag.contains('`') {
        go_string(&tag)
    } else {
        format!("`{}`", tag)
    }
}

/// Struct tag values are unquoted with Go string rules
fn escape_tag_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Interpreted Go string literal
fn go_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
