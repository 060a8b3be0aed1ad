use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use tactica_engine::{
    records::{SIMILARITY_COLUMNS, TRAINING_COLUMNS, WORKLOAD_COLUMNS},
    EngineConfig, PredictionQuery, PredictionService, RecordTable,
};
use tactica_logging::{JsonLogger, LogLevel, LogRecord};

#[derive(Parser, Debug)]
#[command(
    name = "tactica",
    version,
    about = "Tactical-principle suggestions from planning history"
)]
struct Cli {
    /// Engine configuration (TOML). Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Trains the model from a planning CSV and stores it.
    Train {
        /// Planning CSV with categoria, bloque, dia and principio columns.
        #[arg(long)]
        data: PathBuf,
    },
    /// Suggests principles for a category, block and weekday.
    Predict {
        #[arg(long)]
        category: String,
        #[arg(long)]
        block: String,
        #[arg(long)]
        weekday: String,
        /// Season as YYYY-MM.
        #[arg(long)]
        season: Option<String>,
        /// Number of suggestions.
        #[arg(long)]
        top: Option<usize>,
    },
    /// Lists the microcycles most similar to a reference one.
    Similar {
        #[arg(long)]
        data: PathBuf,
        /// Reference microcycle.
        #[arg(long)]
        unit: String,
        #[arg(long, default_value_t = 3)]
        k: usize,
    },
    /// Estimates the weekly principle load of a category.
    Workload {
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        category: String,
    },
    /// Shows the loaded model.
    Status,
    /// Counts records and checks whether they are enough to train.
    Summary {
        #[arg(long)]
        data: PathBuf,
    },
    /// Moves the stored model aside and starts untrained.
    Reset,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Train { .. } => "train",
            Self::Predict { .. } => "predict",
            Self::Similar { .. } => "similar",
            Self::Workload { .. } => "workload",
            Self::Status => "status",
            Self::Summary { .. } => "summary",
            Self::Reset => "reset",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let result = run(&config, &cli.command);
    record_invocation(&config, cli.command.name(), result.as_ref().err());
    print_json(&result?)
}

fn run(config: &EngineConfig, command: &Commands) -> Result<Value> {
    let service = PredictionService::open(config)?;
    let value = match command {
        Commands::Train { data } => {
            let table = load_table(data, &TRAINING_COLUMNS)?;
            let outcome = service.train(table.records())?;
            json!({
                "message": format!(
                    "model trained: accuracy {:.2}, F1 {:.2}",
                    outcome.stats.accuracy, outcome.stats.f1
                ),
                "outcome": outcome,
            })
        }
        Commands::Predict {
            category,
            block,
            weekday,
            season,
            top,
        } => {
            let mut query = PredictionQuery::new(category, block, weekday);
            if let Some(season) = season {
                query = query.with_season(season);
            }
            let predictions = service.predict(&query, *top)?;
            Value::Array(
                predictions
                    .iter()
                    .map(|p| {
                        json!({
                            "principle": p.principle,
                            "confidence": p.confidence,
                            "percentage": p.percentage(),
                            "warnings": p.warnings,
                        })
                    })
                    .collect(),
            )
        }
        Commands::Similar { data, unit, k } => {
            let table = load_table(data, &SIMILARITY_COLUMNS)?;
            let results = service.similar(table.records(), unit, *k)?;
            Value::Array(
                results
                    .iter()
                    .map(|r| {
                        json!({
                            "unit_id": r.unit_id,
                            "similarity": r.similarity,
                            "percentage": r.percentage(),
                        })
                    })
                    .collect(),
            )
        }
        Commands::Workload { data, category } => {
            let table = load_table(data, &WORKLOAD_COLUMNS)?;
            serde_json::to_value(service.workload(table.records(), category)?)?
        }
        Commands::Status => serde_json::to_value(service.status())?,
        Commands::Summary { data } => {
            let table = RecordTable::from_csv_path(data)
                .with_context(|| format!("loading {}", data.display()))?;
            json!({
                "summary": table.summary(),
                "readiness": table.readiness(config.training.min_samples),
            })
        }
        Commands::Reset => {
            let backup = service.reset()?;
            json!({
                "reset": true,
                "backup": backup.map(|p| p.display().to_string()),
            })
        }
    };
    Ok(value)
}

fn load_table(path: &Path, required: &[&str]) -> Result<RecordTable> {
    let table = RecordTable::from_csv_path(path)
        .with_context(|| format!("loading {}", path.display()))?;
    table.require_columns(required)?;
    Ok(table)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Appends one record per invocation to the configured log; failures only warn.
fn record_invocation(config: &EngineConfig, command: &str, error: Option<&anyhow::Error>) {
    let Some(path) = &config.log_path else {
        return;
    };
    let level = if error.is_some() {
        LogLevel::Warn
    } else {
        LogLevel::Info
    };
    let record = LogRecord::new("tactica.cli", level, "command_finished").with_metadata(json!({
        "command": command,
        "error": error.map(|err| format!("{err:#}")),
    }));
    if let Err(err) =
        JsonLogger::with_min_level(path, config.log_level).and_then(|logger| logger.log(&record))
    {
        eprintln!("warning: could not write log: {err:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_predict_with_global_config() {
        let cli = Cli::try_parse_from([
            "tactica",
            "predict",
            "--category",
            "Cadete",
            "--block",
            "Inicial",
            "--weekday",
            "Lunes",
            "--top",
            "3",
            "--config",
            "engine.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("engine.toml")));
        match cli.command {
            Commands::Predict { category, top, season, .. } => {
                assert_eq!(category, "Cadete");
                assert_eq!(top, Some(3));
                assert_eq!(season, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn similar_defaults_k_to_three() {
        let cli =
            Cli::try_parse_from(["tactica", "similar", "--data", "plan.csv", "--unit", "MC1"])
                .unwrap();
        assert!(matches!(cli.command, Commands::Similar { k: 3, .. }));
        assert_eq!(cli.command.name(), "similar");
    }
}
