//! # gormtool
//!
//! Generate gorm models and a type-safe query API from database schemas
//!
//! This crate provides a CLI tool and library for introspecting database schemas
//! and generating Go data access code.

pub mod codegen;
pub mod config;
pub mod driver;
pub mod error;
pub mod introspect;
pub mod naming;
pub mod plan;
pub mod schema;
pub mod types;

pub mod prelude {
    pub use crate::codegen::{CodeGenerator, GoGenerator, OutputLayout, SourceUnit, WriteStatus};
    pub use crate::config::{GenerationConfig, RawConfig};
    pub use crate::driver::{generate, generate_with, GenerationReport, Stage};
    pub use crate::error::GormtoolError;
    pub use crate::introspect::{read_catalog, CatalogSource, DbKind, TableFilter, TextQuery};
    pub use crate::naming::NameConvention;
    pub use crate::plan::{FieldPlan, TablePlan};
    pub use crate::schema::{ColumnDescriptor, IndexDescriptor, TableDescriptor};
    pub use crate::types::{GoType, TargetType, TypePolicy};
}

#[cfg(feature = "postgres")]
pub use introspect::PostgresCatalog;
#[cfg(feature = "sqlite")]
pub use introspect::SqliteCatalog;
