use std::path::PathBuf;

use thiserror::Error;

/// gormtool errors
///
/// Every variant is terminal for a generation run.
#[derive(Error, Debug)]
pub enum GormtoolError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read catalog for '{scope}': {message}")]
    Catalog { scope: String, message: String },

    #[error("Unsupported SQL type '{sql_type}' for column '{table}.{column}'")]
    UnsupportedType {
        table: String,
        column: String,
        sql_type: String,
    },

    #[error(
        "Naming collision in '{table}': '{first}' and '{second}' both resolve to '{identifier}'"
    )]
    NamingCollision {
        table: String,
        identifier: String,
        first: String,
        second: String,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Emit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Code generation failed for '{unit}': {message}")]
    CodeGen { unit: String, message: String },
}

impl GormtoolError {
    pub(crate) fn catalog(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Catalog {
            scope: scope.into(),
            message: message.into(),
        }
    }

    /// Name of the pipeline component that raised the error
    pub fn component(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Catalog { .. } => "catalog reader",
            Self::UnsupportedType { .. } => "type mapper",
            Self::NamingCollision { .. } => "naming resolver",
            Self::Emit { .. } => "file output",
            Self::CodeGen { .. } => "emitter",
        }
    }
}
