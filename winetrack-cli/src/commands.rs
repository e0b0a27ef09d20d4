//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use anyhow::Context;
use std::path::{Path, PathBuf};
use winetrack_ml::config::{
    ConfigOverrides, OutputOverrides, TrackingOverrides, WinetrackConfig, load_config,
    workspace_config_path,
};
use winetrack_ml::tracking::{get_tracking_uri, open_store, set_tracking_uri};
use winetrack_ml::{Dataset, TrainingRunner};

/// The training command's source, uploaded with every run.
const SOURCE_FILE_NAME: &str = "commands.rs";
const SOURCE: &str = include_str!("commands.rs");

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Train {
            tracking_uri,
            experiment,
            output,
        } => {
            let accuracy =
                handle_train(tracking_uri, experiment, output, workspace, config_path).await?;
            println!("{}", format_accuracy(accuracy));
            Ok(())
        }
        Commands::TrackingUri { set } => {
            for line in handle_tracking_uri(set.as_deref(), workspace, config_path)? {
                println!("{line}");
            }
            Ok(())
        }
        Commands::Config { action } => handle_config(action, workspace, config_path),
    }
}

fn load(
    workspace: &Path,
    config_path: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> anyhow::Result<WinetrackConfig> {
    load_config(Some(workspace), config_path, overrides)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

async fn handle_train(
    tracking_uri: Option<String>,
    experiment: Option<String>,
    output: Option<PathBuf>,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<f64> {
    let overrides = ConfigOverrides {
        tracking: TrackingOverrides {
            experiment_name: experiment,
        },
        output: OutputOverrides {
            confusion_matrix_path: output,
        },
    };
    let config = load(workspace, config_path, Some(&overrides))?;

    if let Some(uri) = &tracking_uri {
        set_tracking_uri(uri)?;
    }
    let uri = get_tracking_uri(config.tracking.uri.as_deref())?;
    tracing::info!(uri = %uri, experiment = %config.tracking.experiment_name, "Tracking store");

    let store = open_store(&uri, &config.tracking)?;
    let dataset = Dataset::wine()?;
    let outcome = TrainingRunner::new(store, config)
        .with_source(SOURCE_FILE_NAME, SOURCE)
        .run(&dataset)
        .await
        .with_context(|| format!("tracked training against {uri} failed"))?;

    tracing::info!(
        run_id = %outcome.run_id,
        experiment_id = %outcome.experiment_id,
        image = %outcome.image_path.display(),
        "Run finished"
    );
    Ok(outcome.accuracy)
}

/// Lines printed by `tracking-uri`: the current URI, and after `set` the new one.
fn handle_tracking_uri(
    set: Option<&str>,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<Vec<String>> {
    let config = load(workspace, config_path, None)?;
    let configured = config.tracking.uri.as_deref();

    let mut lines = vec![
        "Tracking uri scheme:".to_string(),
        get_tracking_uri(configured)?.to_string(),
    ];
    if let Some(raw) = set {
        set_tracking_uri(raw)?;
        lines.push("Tracking uri scheme:".to_string());
        lines.push(get_tracking_uri(configured)?.to_string());
    }
    Ok(lines)
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }

            let toml_str = toml::to_string_pretty(&WinetrackConfig::with_defaults())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace, config_path, None)?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

/// Print whole numbers with one decimal, like `1.0`.
fn format_accuracy(accuracy: f64) -> String {
    if accuracy.fract() == 0.0 {
        format!("{accuracy:.1}")
    } else {
        accuracy.to_string()
    }
}
