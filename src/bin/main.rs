//! Strata CLI - compile and run dynamic views
//!
//! Usage:
//!   strata compile --schema <schema.toml> --view <view.toml> [--at <timestamp>] [--dialect <dialect>]
//!   strata check --schema <schema.toml>
//!   strata query --schema <schema.toml> --view <view.toml> [--db <file>] [--at <timestamp>]
//!
//! Examples:
//!   strata compile --schema demos/schema.toml --view demos/samples.toml
//!   strata query --schema demos/schema.toml --view demos/samples.toml --db app.db

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use strata::config::Settings;
use strata::context::QueryContext;
use strata::executor::{SqliteExecutor, ViewSession};
use strata::filter::ViewDefinition;
use strata::schema::SchemaRegistry;
use strata::sql::Dialect;
use strata::value::parse_timestamp;
use strata::view::{Page, ViewCompiler};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Strata - dynamic views over hierarchical and bitemporal entities")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a view to its primary SQL and collection sub-selects
    Compile {
        /// Path to the schema file
        #[arg(short, long)]
        schema: PathBuf,

        /// Path to the view file
        #[arg(short, long)]
        view: PathBuf,

        /// Read versioned entities as of this timestamp
        #[arg(long)]
        at: Option<String>,

        /// SQL dialect to generate
        #[arg(short, long, default_value = "postgres")]
        dialect: DialectArg,
    },

    /// Validate a schema file
    Check {
        /// Path to the schema file
        #[arg(short, long)]
        schema: PathBuf,
    },

    /// Run a view against a SQLite database and print the rows as JSON
    Query {
        /// Path to the schema file
        #[arg(short, long)]
        schema: PathBuf,

        /// Path to the view file
        #[arg(short, long)]
        view: PathBuf,

        /// Database file (defaults to [connection] path in strata.toml)
        #[arg(long)]
        db: Option<String>,

        /// Read versioned entities as of this timestamp
        #[arg(long)]
        at: Option<String>,
    },
}

#[derive(Clone, ValueEnum)]
enum DialectArg {
    Postgres,
    Sqlite,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Sqlite => Dialect::Sqlite,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Compile {
            schema,
            view,
            at,
            dialect,
        } => cmd_compile(&settings, schema, view, at, dialect),
        Commands::Check { schema } => cmd_check(schema),
        Commands::Query { schema, view, db, at } => cmd_query(&settings, schema, view, db, at),
    }
}

fn query_context(at: Option<String>) -> Result<QueryContext, String> {
    match at {
        None => Ok(QueryContext::new()),
        Some(text) => parse_timestamp(&text)
            .map(QueryContext::at)
            .ok_or_else(|| format!("invalid timestamp '{}'", text)),
    }
}

fn cmd_compile(
    settings: &Settings,
    schema: PathBuf,
    view: PathBuf,
    at: Option<String>,
    dialect: DialectArg,
) -> ExitCode {
    let registry = match SchemaRegistry::from_file(&schema) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error loading schema '{}': {}", schema.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let definition = match ViewDefinition::from_file(&view) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error loading view '{}': {}", view.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let ctx = match query_context(at) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = definition.to_tree(&registry).and_then(|tree| {
        ViewCompiler::new(&registry, &settings.view)
            .with_dialect(dialect.into())
            .compile(&tree, &ctx, Page::new(definition.offset, definition.limit))
    });

    match result {
        Ok(compiled) => {
            println!("{};", compiled.primary_sql());
            for sub in &compiled.sub_selects {
                println!();
                println!("-- collection: {}", sub.path);
                println!("{};", sub.template_sql());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Compilation error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_check(schema: PathBuf) -> ExitCode {
    match SchemaRegistry::from_file(&schema) {
        Ok(registry) => {
            println!("✓ {} is valid", schema.display());
            for entity in registry.iter() {
                let kind = match (entity.is_versioned(), entity.discriminator()) {
                    (true, _) => " (bitemporal)",
                    (false, Some(_)) => " (subtype)",
                    (false, None) => "",
                };
                println!(
                    "  - {} -> {}{}, {} attributes",
                    entity.name(),
                    entity.table(),
                    kind,
                    entity.attributes().len()
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ {}: {}", schema.display(), e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_query(
    settings: &Settings,
    schema: PathBuf,
    view: PathBuf,
    db: Option<String>,
    at: Option<String>,
) -> ExitCode {
    let registry = match SchemaRegistry::from_file(&schema) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error loading schema '{}': {}", schema.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let definition = match ViewDefinition::from_file(&view) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error loading view '{}': {}", view.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let ctx = match query_context(at) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let path = match db {
        Some(path) => path,
        None => match settings
            .connection
            .dialect()
            .and_then(|_| settings.connection.resolved_path())
        {
            Ok(path) => path,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
    };
    let executor = match SqliteExecutor::open(&path) {
        Ok(executor) => executor,
        Err(e) => {
            eprintln!("Error opening database '{}': {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    let mut session = ViewSession::new(executor, &registry, &settings.view);
    let result = definition.to_tree(&registry).and_then(|tree| {
        session.select(&tree, &ctx, Page::new(definition.offset, definition.limit))
    });

    match result {
        Ok(view) => {
            let rows: Vec<_> = view.rows().collect();
            match serde_json::to_string_pretty(&rows) {
                Ok(json) => {
                    println!("{}", json);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Error serializing rows: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Err(e) => {
            eprintln!("Query error: {}", e);
            ExitCode::FAILURE
        }
    }
}
