//! Generation driver
//!
//! Runs the pipeline once: read the catalog, plan every table, emit models,
//! then (unless `only_model`) emit the query API. Any failure aborts the run
//! with the originating error; files already written stay on disk.

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::codegen::{CodeGenerator, GoGenerator, OutputLayout, SourceUnit, WriteStatus};
use crate::config::GenerationConfig;
use crate::introspect::{read_catalog, CatalogSource};
use crate::plan::plan_tables;
use crate::prelude::GormtoolError;

/// Pipeline progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    CatalogLoaded,
    ModelsPlanned,
    ModelsEmitted,
    QueryApiEmitted,
    Done,
}

impl Stage {
    fn can_advance_to(self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::Idle, Stage::CatalogLoaded)
                | (Stage::CatalogLoaded, Stage::ModelsPlanned)
                | (Stage::ModelsPlanned, Stage::ModelsEmitted)
                | (Stage::ModelsEmitted, Stage::QueryApiEmitted)
                | (Stage::ModelsEmitted, Stage::Done)
                | (Stage::QueryApiEmitted, Stage::Done)
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Idle => "idle",
            Stage::CatalogLoaded => "catalog loaded",
            Stage::ModelsPlanned => "models planned",
            Stage::ModelsEmitted => "models emitted",
            Stage::QueryApiEmitted => "query api emitted",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}

/// Summary of one generation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationReport {
    pub stage: Stage,
    /// Tables in generation order
    pub tables: Vec<String>,
    pub written: Vec<PathBuf>,
    /// Files whose bytes already matched
    pub unchanged: Vec<PathBuf>,
}

impl GenerationReport {
    fn new() -> Self {
        Self {
            stage: Stage::Idle,
            tables: Vec::new(),
            written: Vec::new(),
            unchanged: Vec::new(),
        }
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "invalid transition {} -> {}",
            self.stage,
            next
        );
        debug!(from = %self.stage, to = %next, "Pipeline stage");
        self.stage = next;
    }

    fn write(&mut self, unit: &SourceUnit) -> Result<(), GormtoolError> {
        match unit.write_if_changed()? {
            WriteStatus::Written => self.written.push(unit.path.clone()),
            WriteStatus::Unchanged => self.unchanged.push(unit.path.clone()),
        }
        Ok(())
    }

    /// Every file the run produced, written or unchanged
    pub fn files(&self) -> usize {
        self.written.len() + self.unchanged.len()
    }
}

/// Generate Go code for the selected tables of `source`
///
/// Output paths are resolved against the current working directory.
pub fn generate(
    source: &mut dyn CatalogSource,
    config: &GenerationConfig,
) -> Result<GenerationReport, GormtoolError> {
    let layout = OutputLayout::resolve(config)?;
    generate_with(source, config, &layout, &GoGenerator::new())
}

/// Generate with an explicit layout and emitter
pub fn generate_with(
    source: &mut dyn CatalogSource,
    config: &GenerationConfig,
    layout: &OutputLayout,
    emitter: &dyn CodeGenerator,
) -> Result<GenerationReport, GormtoolError> {
    // fail on configuration before touching the database
    if !config.only_model {
        layout.require_model_import_path()?;
    }

    let mut report = GenerationReport::new();

    let tables = read_catalog(source, &config.filter)?;
    report.tables = tables.iter().map(|t| t.name.clone()).collect();
    report.advance(Stage::CatalogLoaded);

    if tables.is_empty() {
        warn!("No tables found after filtering");
    }

    let plans = plan_tables(&tables, config)?;
    report.advance(Stage::ModelsPlanned);

    for plan in &plans {
        let unit = emitter.emit_model(plan, config, layout)?;
        report.write(&unit)?;
    }
    info!(
        models = plans.len(),
        dir = ?layout.model_dir,
        "Models generated"
    );
    report.advance(Stage::ModelsEmitted);

    if config.only_model {
        debug!("Only models requested, skipping query API");
        report.advance(Stage::Done);
        return Ok(report);
    }

    for plan in &plans {
        let unit = emitter.emit_query_api(plan, layout)?;
        report.write(&unit)?;
    }
    report.write(&emitter.emit_query_entry(&plans, layout)?)?;

    if config.with_unit_test {
        report.write(&emitter.emit_test_helper(&plans, layout)?)?;
        for plan in &plans {
            report.write(&emitter.emit_query_test(plan, layout)?)?;
        }
    }
    info!(
        tables = plans.len(),
        dir = ?layout.query_dir,
        unit_tests = config.with_unit_test,
        "Query API generated"
    );
    report.advance(Stage::QueryApiEmitted);

    report.advance(Stage::Done);
    info!(
        written = report.written.len(),
        unchanged = report.unchanged.len(),
        "Generation complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::introspect::tests::{three_tables, MemoryCatalog};
    use crate::plan::tests::config;
    use crate::schema::tests::{column, table};

    fn setup() -> (tempfile::TempDir, GenerationConfig, OutputLayout) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.model_import_path = Some("example.com/shop/dao/model".to_string());
        let layout = OutputLayout::resolve_in(&config, dir.path()).unwrap();
        (dir, config, layout)
    }

    fn run(
        tables: Vec<crate::schema::TableDescriptor>,
        config: &GenerationConfig,
        layout: &OutputLayout,
    ) -> Result<GenerationReport, GormtoolError> {
        let mut catalog = MemoryCatalog::new(tables);
        generate_with(&mut catalog, config, layout, &GoGenerator::new())
    }

    #[test]
    fn test_full_run() {
        let (_dir, config, layout) = setup();
        let report = run(three_tables(), &config, &layout).unwrap();

        assert_eq!(report.stage, Stage::Done);
        assert_eq!(report.tables, vec!["users", "orders", "audit_log"]);
        // 3 models, 3 query builders, 1 entry file
        assert_eq!(report.written.len(), 7);
        for table in ["users", "orders", "audit_log"] {
            assert!(layout.model_file(table).is_file());
            assert!(layout.query_file(table).is_file());
        }
        assert!(layout.entry_file.is_file());
        assert!(!layout.test_helper_file().exists());
    }

    #[test]
    fn test_only_model_skips_query_api() {
        let (_dir, mut config, mut layout) = setup();
        config.only_model = true;
        // no import path is needed without the query API
        layout.model_import_path = None;

        let report = run(three_tables(), &config, &layout).unwrap();

        assert_eq!(report.stage, Stage::Done);
        assert_eq!(report.written.len(), 3);
        assert!(report.written.iter().all(|p| p.starts_with(&layout.model_dir)));
        assert!(!layout.query_dir.exists());
    }

    #[test]
    fn test_rerun_is_unchanged() {
        let (_dir, config, layout) = setup();
        let first = run(three_tables(), &config, &layout).unwrap();
        let before = fs::read(layout.query_file("orders")).unwrap();

        let second = run(three_tables(), &config, &layout).unwrap();

        assert!(second.written.is_empty());
        assert_eq!(second.unchanged.len(), first.written.len());
        assert_eq!(fs::read(layout.query_file("orders")).unwrap(), before);
    }

    #[test]
    fn test_unit_tests_are_emitted() {
        let (_dir, mut config, layout) = setup();
        config.with_unit_test = true;

        let report = run(three_tables(), &config, &layout).unwrap();

        assert_eq!(report.files(), 11);
        assert!(layout.test_helper_file().is_file());
        assert!(layout.query_test_file("audit_log").is_file());
    }

    #[test]
    fn test_missing_import_path_fails_before_reading() {
        let (_dir, config, mut layout) = setup();
        layout.model_import_path = None;
        let mut catalog = MemoryCatalog::new(three_tables());

        let err = generate_with(&mut catalog, &config, &layout, &GoGenerator::new()).unwrap_err();

        assert!(matches!(err, GormtoolError::Config(_)));
        assert!(catalog.column_calls.is_empty());
    }

    #[test]
    fn test_unsupported_type_aborts_before_writing() {
        let (_dir, config, layout) = setup();
        let mut tables = three_tables();
        tables.push(table("shapes", vec![column("outline", "polygon")]));

        let err = run(tables, &config, &layout).unwrap_err();

        assert!(matches!(err, GormtoolError::UnsupportedType { .. }));
        assert!(!layout.model_dir.exists());
    }

    #[test]
    fn test_stage_transitions() {
        assert!(Stage::Idle.can_advance_to(Stage::CatalogLoaded));
        assert!(Stage::ModelsEmitted.can_advance_to(Stage::Done));
        assert!(Stage::ModelsEmitted.can_advance_to(Stage::QueryApiEmitted));
        assert!(!Stage::Idle.can_advance_to(Stage::ModelsEmitted));
        assert!(!Stage::Done.can_advance_to(Stage::Idle));
    }
}
