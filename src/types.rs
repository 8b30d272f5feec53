//! SQL type to Go type mapping
//!
//! The mapping is a fixed lookup over a normalized SQL base type. Anything the
//! table does not know is rejected instead of being guessed, since a wrong Go
//! type silently corrupts values on scan.

use std::fmt;

use tracing::trace;

use crate::error::GormtoolError;
use crate::schema::ColumnDescriptor;

/// Policy flags that shape the mapped type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypePolicy {
    /// Pointer type when the column is nullable
    pub field_nullable: bool,
    /// Pointer type when the column has a default value
    pub field_coverable: bool,
    /// Unsigned Go integer when the column is unsigned
    pub field_signable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GoType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    String,
    Bytes,
    Time,
}

impl GoType {
    pub fn name(&self) -> &'static str {
        match self {
            GoType::Bool => "bool",
            GoType::Int8 => "int8",
            GoType::Int16 => "int16",
            GoType::Int32 => "int32",
            GoType::Int64 => "int64",
            GoType::Uint8 => "uint8",
            GoType::Uint16 => "uint16",
            GoType::Uint32 => "uint32",
            GoType::Uint64 => "uint64",
            GoType::Float32 => "float32",
            GoType::Float64 => "float64",
            GoType::String => "string",
            GoType::Bytes => "[]byte",
            GoType::Time => "time.Time",
        }
    }

    /// Package the type needs imported
    pub fn import(&self) -> Option<&'static str> {
        match self {
            GoType::Time => Some("time"),
            _ => None,
        }
    }

    /// Supports range comparisons in generated predicates
    pub fn is_ordered(&self) -> bool {
        !matches!(self, GoType::Bool | GoType::Bytes)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, GoType::String)
    }

    /// Go literal for the zero value
    pub fn zero_literal(&self) -> &'static str {
        match self {
            GoType::Bool => "false",
            GoType::String => "\"\"",
            GoType::Bytes => "[]byte{}",
            GoType::Time => "time.Time{}",
            _ => "0",
        }
    }

    /// Next signed width, so an unsigned range still fits
    fn widen(self) -> Self {
        match self {
            GoType::Int8 => GoType::Int16,
            GoType::Int16 => GoType::Int32,
            GoType::Int32 => GoType::Int64,
            other => other,
        }
    }

    fn to_unsigned(self) -> Self {
        match self {
            GoType::Int8 => GoType::Uint8,
            GoType::Int16 => GoType::Uint16,
            GoType::Int32 => GoType::Uint32,
            GoType::Int64 => GoType::Uint64,
            other => other,
        }
    }
}

/// Resolved Go type for a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetType {
    pub base: GoType,
    /// Rendered as a pointer
    pub optional: bool,
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            write!(f, "*{}", self.base.name())
        } else {
            f.write_str(self.base.name())
        }
    }
}

/// Map a column to its Go type under `policy`
///
/// `table` only names the column in errors.
pub fn map_type(
    table: &str,
    column: &ColumnDescriptor,
    policy: &TypePolicy,
) -> Result<TargetType, GormtoolError> {
    let normalized = normalize(&column.sql_type);

    let base = if normalized.array {
        None
    } else {
        lookup(&normalized)
    };
    let Some(mut base) = base else {
        return Err(GormtoolError::UnsupportedType {
            table: table.to_string(),
            column: column.name.clone(),
            sql_type: column.sql_type.clone(),
        });
    };

    let unsigned = column.unsigned || normalized.unsigned;
    if unsigned {
        base = if policy.field_signable {
            base.to_unsigned()
        } else {
            base.widen()
        };
    }

    let nullable = column.nullable || normalized.nullable;
    let optional = base != GoType::Bytes
        && ((policy.field_nullable && nullable)
            || (policy.field_coverable && column.has_default()));

    let target = TargetType { base, optional };
    trace!(
        column = ?column.name,
        sql_type = ?column.sql_type,
        base = ?normalized.base,
        go_type = %target,
        "Mapped column type"
    );
    Ok(target)
}

/// SQL type with parameters, wrappers and sign markers removed
#[derive(Debug, Default, PartialEq)]
struct NormalizedType {
    /// Lowercased base name, e.g. `character varying`
    base: String,
    /// Base name as written, for case-sensitive ClickHouse names
    raw_base: String,
    /// First type parameter, e.g. `255` in `varchar(255)`
    param: Option<String>,
    nullable: bool,
    unsigned: bool,
    array: bool,
}

fn normalize(sql_type: &str) -> NormalizedType {
    let mut out = NormalizedType::default();
    let mut current = sql_type.trim();

    // ClickHouse wrappers
    loop {
        if let Some(inner) = peel_wrapper(current, "nullable") {
            out.nullable = true;
            current = inner;
        } else if let Some(inner) = peel_wrapper(current, "lowcardinality") {
            current = inner;
        } else {
            break;
        }
    }

    let lower = current.to_lowercase();
    if lower.ends_with("[]") || lower.starts_with("array(") {
        out.array = true;
        return out;
    }

    // Strip parenthesized parameters, remembering the first one
    let mut stripped = String::with_capacity(current.len());
    let mut depth = 0usize;
    let mut param = String::new();
    let mut first_param_done = false;
    for c in current.chars() {
        match c {
            '(' => {
                depth += 1;
                stripped.push(' ');
            }
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    first_param_done = true;
                }
            }
            _ if depth > 0 => {
                if !first_param_done && depth == 1 && !param.contains(',') {
                    param.push(c);
                }
            }
            _ => stripped.push(c),
        }
    }
    let param = param.split(',').next().unwrap_or_default().trim().to_string();
    if !param.is_empty() {
        out.param = Some(param);
    }

    let mut words = Vec::new();
    let mut raw_words = Vec::new();
    for word in stripped.split_whitespace() {
        match word.to_lowercase().as_str() {
            "unsigned" => out.unsigned = true,
            "signed" | "zerofill" => {}
            lower_word => {
                words.push(lower_word.to_string());
                raw_words.push(word.to_string());
            }
        }
    }
    out.base = words.join(" ");
    out.raw_base = raw_words.join(" ");

    if out.raw_base.starts_with("UInt") {
        out.unsigned = true;
    }
    out
}

/// `Nullable(T)` -> `T`, case-insensitive on the wrapper name
fn peel_wrapper<'a>(s: &'a str, wrapper: &str) -> Option<&'a str> {
    let open = wrapper.len();
    if s.len() > open + 1
        && s.is_char_boundary(open)
        && s[..open].eq_ignore_ascii_case(wrapper)
        && s[open..].starts_with('(')
        && s.ends_with(')')
    {
        Some(s[open + 1..s.len() - 1].trim())
    } else {
        None
    }
}

fn lookup(t: &NormalizedType) -> Option<GoType> {
    // ClickHouse integer and float names are case-sensitive and clash with
    // PostgreSQL aliases once lowercased (`Int8` vs `int8`).
    let clickhouse = match t.raw_base.as_str() {
        "Int8" | "UInt8" => Some(GoType::Int8),
        "Int16" | "UInt16" => Some(GoType::Int16),
        "Int32" | "UInt32" => Some(GoType::Int32),
        "Int64" | "UInt64" => Some(GoType::Int64),
        "Float32" => Some(GoType::Float32),
        "Float64" => Some(GoType::Float64),
        _ => None,
    };
    if clickhouse.is_some() {
        return clickhouse;
    }

    let go = match t.base.as_str() {
        "bool" | "boolean" => GoType::Bool,
        "bit" => match t.param.as_deref().map(str::parse::<u32>) {
            Some(Ok(n)) if n > 1 => GoType::Bytes,
            _ => GoType::Bool,
        },

        "tinyint" | "int1" => GoType::Int8,
        "smallint" | "int2" | "smallserial" | "serial2" | "year" => GoType::Int16,
        "mediumint" | "int" | "integer" | "int4" | "serial" | "serial4" => GoType::Int32,
        "bigint" | "int8" | "bigserial" | "serial8" => GoType::Int64,

        // Every floating type widens to float64 except an explicit float4, since
        // "float" and "real" mean different widths across databases.
        "float4" => GoType::Float32,
        "float" | "real" | "double" | "double precision" | "float8" => GoType::Float64,
        "decimal" | "numeric" | "dec" | "fixed" | "money" | "smallmoney" | "decimal32"
        | "decimal64" | "decimal128" => GoType::Float64,

        "char" | "character" | "nchar" | "varchar" | "character varying" | "nvarchar"
        | "varchar2" | "text" | "tinytext" | "mediumtext" | "longtext" | "ntext" | "clob"
        | "citext" | "string" | "fixedstring" | "name" | "sysname" => GoType::String,
        "json" | "jsonb" | "xml" | "uuid" | "uniqueidentifier" | "enum" | "enum8"
        | "enum16" | "set" | "inet" | "cidr" | "macaddr" | "macaddr8" | "ipv4" | "ipv6"
        | "interval" | "bit varying" | "varbit" | "tsvector" => GoType::String,
        "time" | "time without time zone" | "time with time zone" | "timetz" => GoType::String,

        "date" | "date32" | "datetime" | "datetime2" | "datetime64" | "smalldatetime"
        | "datetimeoffset" | "timestamp" | "timestamp without time zone"
        | "timestamp with time zone" | "timestamptz" => GoType::Time,

        "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" | "bytea"
        | "image" | "rowversion" => GoType::Bytes,

        _ => return None,
    };
    Some(go)
}
