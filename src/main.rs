use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use gatekeeper::abac::{DataSource, Engine, Schema};
use gatekeeper::errors::GatekeeperError;
use gatekeeper::settings::Settings;
use miette::{IntoDiagnostic, Result};
use serde_json::{json, Value};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "gatekeeper",
    version,
    about = "Attribute-based access control decisions"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decide an action on a resource and print the winning rule decision
    Check {
        #[command(flatten)]
        request: Request,
        /// Resource (object) name, e.g. t_client
        #[arg(long)]
        resource: String,
    },
    /// Apply the decision to a record and print the masked record
    Mask {
        #[command(flatten)]
        request: Request,
        /// JSON list of object metas
        #[arg(long)]
        schema: PathBuf,
        /// JSON record to mask
        #[arg(long)]
        record: PathBuf,
        /// Object name of the record
        #[arg(long)]
        object: String,
    },
}

#[derive(Args, Debug)]
struct Request {
    /// JSON rule document
    #[arg(long)]
    rules: PathBuf,
    /// JSON subject attributes
    #[arg(long)]
    subject: PathBuf,
    /// JSON context attributes
    #[arg(long)]
    context: Option<PathBuf>,
    /// Action, e.g. data_GET
    #[arg(long)]
    action: String,
}

fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    // load settings
    let settings = Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    let output = match cli.command {
        Command::Check { request, resource } => {
            let engine = build_engine(&settings, &request)?;
            let (allowed, decision) = engine.check(&resource, &request.action)?;
            json!({ "allowed": allowed, "decision": decision })
        }
        Command::Mask {
            request,
            schema,
            record,
            object,
        } => {
            let engine = build_engine(&settings, &request)?;
            let schema = Schema::from_value(read_json(&schema)?).into_diagnostic()?;
            let record = schema.record(&object, &read_json(&record)?)?;
            engine.mask_record(record, &request.action)?.to_value()
        }
    };

    println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
    Ok(())
}

fn build_engine(settings: &Settings, request: &Request) -> Result<Engine> {
    let rules = settings.engine.compile_rules(&read_json(&request.rules)?)?;
    let mut data_source = DataSource::new(read_json(&request.subject)?);
    if let Some(context) = &request.context {
        data_source = data_source.with_context(read_json(context)?);
    }
    Ok(Engine::with_settings(data_source, rules, &settings.engine))
}

fn read_json(path: &Path) -> Result<Value, GatekeeperError> {
    let display = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|source| GatekeeperError::Io {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| GatekeeperError::Json {
        path: display,
        source,
    })
}
