//! CLI definition and dispatch.
//!
//! Every command goes through the same domain calls as any other
//! front end: a control plane built from the config file, modules
//! registered by role, and a run gated by `run.execute`.

use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::file_text_adapter::FileTextSource;
use crate::adapters::jsonl_report_adapter::JsonlReportAdapter;
use crate::domain::config::SimConfig;
use crate::domain::config_validation::validate_config;
use crate::domain::control_plane::{ControlPlane, RunRequest};
use crate::domain::error::SimError;
use crate::domain::registry::{Module, ModuleKind, classify};
use crate::domain::simulation::RunOutcome;

const DATA_MODULE: &str = "cli_data";

#[derive(Parser, Debug)]
#[command(name = "simtrader", about = "Bar-driven trading simulator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest and print the summary as JSON
    Backtest {
        /// Config JSON; the paper profile when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Bars as CSV, or a data module as JSON
        #[arg(short, long)]
        data: PathBuf,
        /// Strategy module JSON replacing the configured strategy
        #[arg(short, long)]
        strategy: Option<PathBuf>,
        /// Exec module JSON merged onto the execution policy
        #[arg(long)]
        exec: Option<PathBuf>,
        /// Risk module JSON overwriting risk limits
        #[arg(long)]
        risk: Option<PathBuf>,
        /// Directory for audit.jsonl, trace.jsonl and summary.json
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value = "admin")]
        role: String,
        #[arg(long, default_value = "cli")]
        actor: String,
    },
    /// Validate a config file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print a config file's content hash
    Hash {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Classify and validate a plugin payload
    Import {
        #[arg(short, long)]
        plugin: PathBuf,
        /// Declared kind; detected from the payload's shape when omitted
        #[arg(short, long)]
        kind: Option<String>,
    },
    /// Print the paper-trading profile as JSON
    Profile,
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            data,
            strategy,
            exec,
            risk,
            output,
            role,
            actor,
        } => {
            let modules = ModulePaths {
                strategy,
                exec,
                risk,
            };
            run_backtest(
                config.as_deref(),
                &data,
                &modules,
                output.as_deref(),
                &actor,
                &role,
            )
            .and_then(|outcome| print_json(&serde_json::to_value(&outcome.summary)?))
        }
        Command::Validate { config } => run_validate(&config),
        Command::Hash { config } => {
            load_config(&config).and_then(|cfg| {
                println!("{}", cfg.content_hash()?);
                Ok(())
            })
        }
        Command::Import { plugin, kind } => run_import(&plugin, kind.as_deref()),
        Command::Profile => SimConfig::paper().to_json_pretty().map(|text| println!("{text}")),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.reason_code(), "{e}");
            ExitCode::from(&e)
        }
    }
}

#[derive(Debug, Default)]
pub struct ModulePaths {
    pub strategy: Option<PathBuf>,
    pub exec: Option<PathBuf>,
    pub risk: Option<PathBuf>,
}

pub fn load_config(path: &Path) -> Result<SimConfig, SimError> {
    let text = read(path)?;
    SimConfig::from_json(&text).map_err(|e| SimError::ConfigParse {
        reason: format!("{}: {}", path.display(), e),
    })
}

fn read(path: &Path) -> Result<String, SimError> {
    fs::read_to_string(path).map_err(|e| SimError::DataSource {
        reason: format!("failed to read {}: {}", path.display(), e),
    })
}

fn read_json(path: &Path) -> Result<Value, SimError> {
    serde_json::from_str(&read(path)?).map_err(|e| SimError::ModuleRejected {
        reason: format!("{}: {}", path.display(), e),
    })
}

/// A `.json` data file is a data module payload; anything else is CSV.
fn data_payload(path: &Path) -> Result<Value, SimError> {
    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
        read_json(path)
    } else {
        Ok(json!({"type": "embedded_csv", "csv": read(path)?}))
    }
}

/// Build a control plane from the config, register the data and any
/// module files under `role`, then run.
pub fn run_backtest(
    config_path: Option<&Path>,
    data_path: &Path,
    modules: &ModulePaths,
    output: Option<&Path>,
    actor: &str,
    role: &str,
) -> Result<RunOutcome, SimError> {
    let config = match config_path {
        Some(path) => load_config(path)?,
        None => SimConfig::paper(),
    };
    let base = data_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let mut plane = ControlPlane::new(config, Box::new(FileTextSource::new(base)))?;

    plane.register_module(actor, role, ModuleKind::Data, DATA_MODULE, &data_payload(data_path)?)?;
    let mut request = RunRequest::new(actor, role);
    request.data = Some(DATA_MODULE.to_string());

    let named = [
        (ModuleKind::Strategy, &modules.strategy, &mut request.strategy),
        (ModuleKind::Exec, &modules.exec, &mut request.exec),
        (ModuleKind::Risk, &modules.risk, &mut request.risk),
    ];
    for (kind, path, slot) in named {
        if let Some(path) = path {
            let name = format!("cli_{}", kind);
            plane.register_module(actor, role, kind, &name, &read_json(path)?)?;
            *slot = Some(name);
        }
    }

    let outcome = plane.run(&request)?;
    if let Some(dir) = output {
        plane.export(role, &outcome, &JsonlReportAdapter::new(dir.to_path_buf()))?;
    }
    Ok(outcome)
}

fn run_validate(path: &Path) -> Result<(), SimError> {
    let config = load_config(path)?;
    if let Err(e) = validate_config(&config) {
        if let SimError::RuleParse {
            condition, source, ..
        } = &e
        {
            eprintln!("{}", source.display_with_context(condition));
        }
        return Err(e);
    }
    let strategy = config.strategy.compile()?;
    tracing::info!(
        rules = strategy.rules.len(),
        warmup = strategy.warmup_bars(),
        mode = ?config.execution.active_mode(),
        "config is valid"
    );
    println!("{}", config.content_hash()?);
    Ok(())
}

/// Classify (unless `kind` is given) and parse a plugin payload, printing
/// `{"kind": ..., "name": ...}`.
pub fn describe_plugin(payload: &Value, kind: Option<&str>) -> Result<Value, SimError> {
    let kind = match kind {
        Some(k) => k.parse::<ModuleKind>()?,
        None => classify(payload).ok_or_else(|| SimError::ModuleRejected {
            reason: "payload matches no module kind".into(),
        })?,
    };
    Module::parse(kind, payload)?;
    let name = payload.get("name").and_then(Value::as_str);
    Ok(json!({"kind": kind.as_str(), "name": name}))
}

fn run_import(path: &Path, kind: Option<&str>) -> Result<(), SimError> {
    let description = describe_plugin(&read_json(path)?, kind)?;
    print_json(&description)
}

fn print_json(value: &Value) -> Result<(), SimError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
