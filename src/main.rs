use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gopass_bridge::config::{default_config_path, ResolvedConfig};
use gopass_bridge::diagnostics::Diagnostic;
use gopass_bridge::ephemeral::{read_env, read_secret, EnvOptions};
use gopass_bridge::resource::{value_needed, ReadOutcome, SecretPlan, SecretResource};
use gopass_bridge::state::StateFile;
use secrecy::{ExposeSecret, SecretString};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "gopass-bridge")]
#[command(about = "Ephemeral gopass secrets and write-only secret write-back")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the state file location
    #[arg(long)]
    state: Option<PathBuf>,

    /// Override the gopass binary
    #[arg(long)]
    gopass_binary: Option<String>,

    /// Override the gopass store (mount) name
    #[arg(long)]
    store: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a single secret value
    Secret {
        /// Path of the secret (e.g. infrastructure/db/password)
        path: String,
    },
    /// Print every secret under a path as JSON
    Env {
        /// Path prefix (e.g. env/terraform/scaleway/istr)
        path: String,
        /// Include nested secrets, not only immediate children
        #[arg(long)]
        recursive: bool,
        /// Print the nested tree instead of the flat map
        #[arg(long)]
        tree: bool,
    },
    /// Write a secret read from stdin when its version changes
    Apply {
        path: String,
        /// Version of the value; bump it to write a new value
        #[arg(long)]
        version: Option<i64>,
        /// Keep the secret in gopass when the resource is destroyed
        #[arg(long)]
        keep: bool,
        /// Do not read a value from stdin
        #[arg(long)]
        no_value: bool,
    },
    /// Check a managed secret for out-of-band changes
    Refresh { path: String },
    /// Stop managing a secret, removing it unless it was applied with --keep
    Destroy { path: String },
    /// Start managing an existing secret
    Import { path: String },
    /// Show current configuration
    Config,
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        eprintln!("{diagnostic}\n");
    }
}

fn read_stdin_value() -> Result<SecretString> {
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read secret value from stdin")?;
    let value = buf.strip_suffix('\n').unwrap_or(&buf);
    let value = value.strip_suffix('\r').unwrap_or(value);
    Ok(SecretString::from(value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = ResolvedConfig::load_or_default(&config_path).with_context(|| {
        format!(
            "Failed to load gopass-bridge config: {}",
            config_path.display()
        )
    })?;
    if let Some(state) = cli.state {
        config.state_file = state;
    }
    if let Some(binary) = cli.gopass_binary {
        config.gopass.binary = binary;
    }
    if let Some(store) = cli.store {
        config.gopass.store = Some(store);
    }

    if let Command::Config = cli.command {
        println!("Config file: {}", config_path.display());
        println!("State file: {}", config.state_file.display());
        println!("gopass binary: {}", config.gopass.binary);
        println!(
            "Store: {}",
            config.gopass.store.as_deref().unwrap_or("(default)")
        );
        println!(
            "Store path: {}",
            config.gopass.store_path.as_deref().unwrap_or("(gopass default)")
        );
        return Ok(());
    }

    let store = config.build_store()?;
    let state_file = StateFile::new(&config.state_file);

    match cli.command {
        Command::Secret { path } => {
            let value = read_secret(&store, &path).await?;
            println!("{}", value.expose_secret());
        }
        Command::Env {
            path,
            recursive,
            tree,
        } => {
            let env = read_env(&store, &path, EnvOptions { recursive }).await?;
            print_diagnostics(&env.diagnostics);
            let json = if tree {
                serde_json::to_string_pretty(&env.credentials)?
            } else {
                serde_json::to_string_pretty(&env.values)?
            };
            println!("{json}");
        }
        Command::Apply {
            path,
            version,
            keep,
            no_value,
        } => {
            let mut state = state_file.load().await?;
            // an unchanged version never writes, so stdin is left alone
            let value_wo = if !no_value && value_needed(state.get(&path), &path, version) {
                Some(read_stdin_value()?)
            } else {
                None
            };
            let plan = SecretPlan {
                path: path.clone(),
                value_wo,
                value_wo_version: version,
                delete_on_remove: !keep,
            };

            let resource = SecretResource::new(&store);
            let applied = resource.apply(state.get(&path), plan).await?;
            print_diagnostics(&applied.diagnostics);

            if applied.written {
                tracing::info!(path = %path, "Secret written");
            }
            state.put(applied.state);
            state_file.save(&state).await?;
        }
        Command::Refresh { path } => {
            let mut state = state_file.load().await?;
            let current = state
                .get(&path)
                .cloned()
                .with_context(|| format!("{path:?} is not managed; import it first"))?;

            let resource = SecretResource::new(&store);
            match resource.read(&current).await? {
                ReadOutcome::Present {
                    state: refreshed,
                    diagnostics,
                } => {
                    print_diagnostics(&diagnostics);
                    println!("{path}: {} revision(s)", refreshed.revision_count);
                    state.put(refreshed);
                }
                ReadOutcome::Removed => {
                    eprintln!("{path} no longer exists in gopass; removed from state");
                    state.remove(&path);
                }
            }
            state_file.save(&state).await?;
        }
        Command::Destroy { path } => {
            let mut state = state_file.load().await?;
            let current = state
                .get(&path)
                .cloned()
                .with_context(|| format!("{path:?} is not managed"))?;

            let resource = SecretResource::new(&store);
            let diagnostics = resource.delete(&current).await?;
            print_diagnostics(&diagnostics);
            state.remove(&path);
            state_file.save(&state).await?;
        }
        Command::Import { path } => {
            let mut state = state_file.load().await?;
            let resource = SecretResource::new(&store);
            let imported = resource.import(&path).await?;
            println!(
                "Imported {path} ({} revision(s)). Apply with --version to manage its value.",
                imported.revision_count
            );
            state.put(imported);
            state_file.save(&state).await?;
        }
        // printed before the store is built
        Command::Config => {}
    }

    Ok(())
}
