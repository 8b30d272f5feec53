//! Code generation
//!
//! This module turns table plans into Go source units and writes them to
//! disk. The output layout mirrors a typical gorm project: a model package
//! next to a query package, both under the parent of the configured output
//! path.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, error, trace};

use crate::config::GenerationConfig;
use crate::naming::resolve_package_name;
use crate::plan::TablePlan;
use crate::prelude::GormtoolError;

pub mod go;

pub use go::GoGenerator;

/// Suffix of every generated per-table file
pub const GENERATED_SUFFIX: &str = ".gen.go";

/// Name of the shared test helper file
pub const TEST_HELPER_FILE: &str = "gen_test.go";

/// One generated file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub contents: String,
}

/// Outcome of writing a [`SourceUnit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Written,
    /// The file already held identical bytes and was left untouched
    Unchanged,
}

impl SourceUnit {
    pub fn new(path: PathBuf, contents: String) -> Self {
        Self { path, contents }
    }

    /// Write the unit unless the file already holds the same bytes
    pub fn write_if_changed(&self) -> Result<WriteStatus, GormtoolError> {
        let emit_error = |source: std::io::Error| {
            error!(path = ?self.path, error = ?source, "Failed to write generated file");
            GormtoolError::Emit {
                path: self.path.clone(),
                source,
            }
        };

        if let Ok(existing) = fs::read(&self.path) {
            if existing == self.contents.as_bytes() {
                trace!(path = ?self.path, "Generated file unchanged");
                return Ok(WriteStatus::Unchanged);
            }
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(emit_error)?;
            }
        }
        fs::write(&self.path, &self.contents).map_err(emit_error)?;
        debug!(path = ?self.path, bytes = self.contents.len(), "Wrote generated file");
        Ok(WriteStatus::Written)
    }
}

/// Where generated files go and how the packages are named
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub query_dir: PathBuf,
    pub query_package: String,
    pub model_dir: PathBuf,
    pub model_package: String,
    /// Go import path of the model package, when known
    pub model_import_path: Option<String>,
    pub entry_file: PathBuf,
}

impl OutputLayout {
    /// Resolve the layout relative to the current working directory
    pub fn resolve(config: &GenerationConfig) -> Result<Self, GormtoolError> {
        let cwd = std::env::current_dir().map_err(|e| {
            GormtoolError::Config(format!("Failed to read current directory: {}", e))
        })?;
        Self::resolve_in(config, &cwd)
    }

    /// Resolve the layout with relative paths taken against `base`
    pub fn resolve_in(config: &GenerationConfig, base: &Path) -> Result<Self, GormtoolError> {
        let query_dir = normalize(&base.join(&config.out_path));
        let query_name = query_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                GormtoolError::Config(format!(
                    "outPath {:?} does not name a directory",
                    config.out_path
                ))
            })?;

        let model_root = query_dir.parent().unwrap_or(&query_dir);
        let model_dir = normalize(&model_root.join(&config.model_pkg_name));
        if model_dir == query_dir {
            return Err(GormtoolError::Config(format!(
                "model package {:?} and query package share the directory {}",
                config.model_pkg_name,
                query_dir.display()
            )));
        }

        let model_import_path = match &config.model_import_path {
            Some(path) => Some(path.clone()),
            None => discover_import_path(&model_dir)?,
        };

        let layout = Self {
            entry_file: query_dir.join(&config.out_file),
            query_package: resolve_package_name(&query_name),
            model_package: resolve_package_name(&config.model_pkg_name),
            query_dir,
            model_dir,
            model_import_path,
        };
        debug!(layout = ?layout, "Resolved output layout");
        Ok(layout)
    }

    pub fn model_file(&self, table: &str) -> PathBuf {
        self.model_dir.join(format!("{}{}", table, GENERATED_SUFFIX))
    }

    pub fn query_file(&self, table: &str) -> PathBuf {
        self.query_dir.join(format!("{}{}", table, GENERATED_SUFFIX))
    }

    pub fn query_test_file(&self, table: &str) -> PathBuf {
        self.query_dir.join(format!("{}.gen_test.go", table))
    }

    pub fn test_helper_file(&self) -> PathBuf {
        self.query_dir.join(TEST_HELPER_FILE)
    }

    /// Import path the query package needs for the models
    pub fn require_model_import_path(&self) -> Result<&str, GormtoolError> {
        self.model_import_path.as_deref().ok_or_else(|| {
            GormtoolError::Config(format!(
                "cannot determine the Go import path of {} (no go.mod found); set modelImportPath",
                self.model_dir.display()
            ))
        })
    }
}

/// Lexically remove `.` and resolve `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Derive the model import path from the nearest go.mod above `model_dir`
fn discover_import_path(model_dir: &Path) -> Result<Option<String>, GormtoolError> {
    for dir in model_dir.ancestors() {
        let go_mod = dir.join("go.mod");
        if !go_mod.is_file() {
            continue;
        }
        let text = fs::read_to_string(&go_mod).map_err(|e| {
            GormtoolError::Config(format!("Failed to read {}: {}", go_mod.display(), e))
        })?;
        let Some(module) = module_path(&text) else {
            return Err(GormtoolError::Config(format!(
                "{} has no module directive",
                go_mod.display()
            )));
        };

        let relative = model_dir.strip_prefix(dir).unwrap_or(Path::new(""));
        let mut import = module.to_string();
        for part in relative.components() {
            import.push('/');
            import.push_str(&part.as_os_str().to_string_lossy());
        }
        debug!(go_mod = ?go_mod, import = ?import, "Derived model import path");
        return Ok(Some(import));
    }
    trace!(model_dir = ?model_dir, "No go.mod found");
    Ok(None)
}

/// Module path declared by a go.mod file
fn module_path(go_mod: &str) -> Option<&str> {
    go_mod.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("module")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let module = rest.trim().trim_matches('"');
        (!module.is_empty()).then_some(module)
    })
}

/// Trait for target-language emitters
pub trait CodeGenerator {
    /// One model file per table
    fn emit_model(
        &self,
        plan: &TablePlan,
        config: &GenerationConfig,
        layout: &OutputLayout,
    ) -> Result<SourceUnit, GormtoolError>;

    /// Query builder for one table
    fn emit_query_api(
        &self,
        plan: &TablePlan,
        layout: &OutputLayout,
    ) -> Result<SourceUnit, GormtoolError>;

    /// Entry file binding every table's query builder
    fn emit_query_entry(
        &self,
        plans: &[TablePlan],
        layout: &OutputLayout,
    ) -> Result<SourceUnit, GormtoolError>;

    /// Smoke tests for one table's query builder
    fn emit_query_test(
        &self,
        plan: &TablePlan,
        layout: &OutputLayout,
    ) -> Result<SourceUnit, GormtoolError>;

    /// Shared test fixture used by every query test
    fn emit_test_helper(
        &self,
        plans: &[TablePlan],
        layout: &OutputLayout,
    ) -> Result<SourceUnit, GormtoolError>;
}
