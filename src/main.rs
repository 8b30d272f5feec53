use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{debug, error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use gormtool::config::{
    load_env_file, GenerationConfig, RawConfig, DEFAULT_MODEL_PKG, DEFAULT_OUT_FILE,
    DEFAULT_OUT_PATH,
};
use gormtool::driver::generate;
use gormtool::error::GormtoolError;
use gormtool::introspect::DbKind;
use gormtool::naming::NameConvention;

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum Database {
    #[default]
    Mysql,
    Postgres,
    Sqlite,
    Sqlserver,
    Clickhouse,
}

impl From<Database> for DbKind {
    fn from(db: Database) -> Self {
        match db {
            Database::Mysql => DbKind::Mysql,
            Database::Postgres => DbKind::Postgres,
            Database::Sqlite => DbKind::Sqlite,
            Database::Sqlserver => DbKind::SqlServer,
            Database::Clickhouse => DbKind::ClickHouse,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum TagStrategy {
    /// `created_at` -> `createdAt`
    Camel,
    /// `created_at` -> `CreatedAt`
    Pascal,
    /// Column name unchanged
    #[default]
    Under,
}

impl From<TagStrategy> for NameConvention {
    fn from(strategy: TagStrategy) -> Self {
        match strategy {
            TagStrategy::Camel => NameConvention::Camel,
            TagStrategy::Pascal => NameConvention::Pascal,
            TagStrategy::Under => NameConvention::Under,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "gormtool")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Database connection string (falls back to GORMTOOL_DSN)
    #[arg(long)]
    dsn: Option<String>,

    /// Database type
    #[arg(long, value_enum, default_value_t = Database::Mysql)]
    db: Database,

    /// Comma-separated list of tables to generate (default: all)
    #[arg(long, value_delimiter = ',')]
    tables: Vec<String>,

    /// Comma-separated list of tables to skip
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Only generate models, without the query API
    #[arg(long)]
    only_model: bool,

    /// Query package directory
    #[arg(long, default_value = DEFAULT_OUT_PATH)]
    out_path: String,

    /// Query entry file name
    #[arg(long, default_value = DEFAULT_OUT_FILE)]
    out_file: String,

    /// Generate unit tests for the query API
    #[arg(long)]
    with_unit_test: bool,

    /// Model package, relative to the parent of the query directory
    #[arg(long, default_value = DEFAULT_MODEL_PKG)]
    model_pkg_name: String,

    /// Go import path of the model package (default: derived from go.mod)
    #[arg(long)]
    model_import_path: Option<String>,

    /// Use pointer types for nullable columns
    #[arg(long)]
    field_nullable: bool,

    /// Use pointer types for columns with a default value
    #[arg(long)]
    field_coverable: bool,

    /// Emit index settings in the gorm tag
    #[arg(long)]
    field_with_index_tag: bool,

    /// Emit the column type in the gorm tag
    #[arg(long)]
    field_with_type_tag: bool,

    /// Use unsigned Go integers for unsigned columns
    #[arg(long)]
    field_signable: bool,

    /// Naming strategy for json tags
    #[arg(long, value_enum, default_value_t = TagStrategy::Under)]
    json_tag_name_strategy: TagStrategy,

    /// Table names are already singular; use them for struct names as is
    #[arg(long)]
    singular_table: bool,

    /// Prefix stripped from table names
    #[arg(long, default_value = "")]
    table_prefix: String,

    /// YAML config file; replaces the generation flags above
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Path to .env file
    #[arg(long, default_value = "./.env")]
    env_file: PathBuf,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn to_raw(&self) -> RawConfig {
        RawConfig {
            dsn: self.dsn.clone().unwrap_or_default(),
            db: DbKind::from(self.db).to_string(),
            tables: self.tables.clone(),
            exclude: self.exclude.clone(),
            only_model: self.only_model,
            out_path: self.out_path.clone(),
            out_file: self.out_file.clone(),
            with_unit_test: self.with_unit_test,
            model_pkg_name: self.model_pkg_name.clone(),
            model_import_path: self.model_import_path.clone(),
            field_nullable: self.field_nullable,
            field_coverable: self.field_coverable,
            field_with_index_tag: self.field_with_index_tag,
            field_with_type_tag: self.field_with_type_tag,
            field_signable: self.field_signable,
            json_tag_name_strategy: NameConvention::from(self.json_tag_name_strategy).to_string(),
            table_prefix: self.table_prefix.clone(),
            singular_table: self.singular_table,
        }
    }
}

fn main() {
    if let Err(e) = run() {
        let component = e
            .downcast_ref::<GormtoolError>()
            .map(GormtoolError::component)
            .unwrap_or("cli");
        error!(error = ?e, component = component, "Fatal error");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("gormtool v{}", env!("CARGO_PKG_VERSION"));

    load_env_file(&cli.env_file).context("Failed to load environment file")?;

    let raw = match &cli.config {
        Some(path) => {
            info!(path = ?path, "Using config file, generation flags are ignored");
            RawConfig::from_yaml_file(path).context("Failed to load config file")?
        }
        None => cli.to_raw(),
    };
    let config = GenerationConfig::from_raw(raw).context("Invalid configuration")?;

    info!(
        db = %config.db,
        dsn = %config.redacted_dsn(),
        out_path = ?config.out_path,
        only_model = config.only_model,
        with_unit_test = config.with_unit_test,
        "Starting code generation"
    );
    if !config.filter.include.is_empty() || !config.filter.exclude.is_empty() {
        debug!(filter = ?config.filter, "Table filter configured");
    }

    let report = {
        let mut source = config.db.connect(&config.dsn).with_context(|| {
            format!(
                "Failed to connect to {} at {}",
                config.db,
                config.redacted_dsn()
            )
        })?;
        info!("Connected to database");

        generate(source.as_mut(), &config).context("Code generation failed")?
        // connection closes when `source` drops here
    };

    info!(
        tables = report.tables.len(),
        written = report.written.len(),
        unchanged = report.unchanged.len(),
        "Done"
    );

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // RUST_LOG wins over -v when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}
