use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use modelviz::app::App;
use modelviz::config::Config;
use modelviz::export::ExportFormat;
use modelviz::logging::init_logging;
use modelviz::providers::catalog;
use modelviz::{ComparisonSession, Provider, SelectedModel, TimeRange};
use colored::Colorize;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "modelviz")]
#[command(about = "Compare outputs, latency and cost of AI models across providers")]
#[command(version)]
struct Cli {
    /// Configuration file (replaces the default search)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one prompt to several models and compare the results
    Compare {
        /// Prompt text
        #[arg(short, long)]
        prompt: String,
        /// Optional system prompt
        #[arg(short, long)]
        system: Option<String>,
        /// Model as provider:model_id (repeatable)
        #[arg(short, long = "model")]
        models: Vec<SelectedModel>,
        /// Add the models of a saved blend
        #[arg(short, long)]
        blend: Option<String>,
        /// Tag stored with the session (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Deadline for the whole comparison in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Do not save the session
        #[arg(long)]
        no_save: bool,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// List saved comparison sessions
    Sessions {
        /// Show last N sessions
        #[arg(long)]
        limit: Option<usize>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Show a saved session with its analysis
    Show {
        id: String,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Export a saved session as JSON or Markdown
    Export {
        id: String,
        #[arg(short, long, value_enum, default_value = "markdown")]
        format: ExportFormat,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a saved session
    Delete { id: String },
    /// Show aggregated API usage metrics
    Metrics {
        #[arg(short, long, value_enum, default_value = "week")]
        range: TimeRange,
        /// Delete all recorded metrics instead
        #[arg(long)]
        clear: bool,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Manage provider API keys
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },
    /// List known models
    Models {
        /// Only this provider
        #[arg(value_enum)]
        provider: Option<Provider>,
        /// Ask the provider API instead of the built-in catalog
        #[arg(long)]
        remote: bool,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Manage blended model groups
    Blend {
        #[command(subcommand)]
        action: BlendAction,
    },
    /// Show or refresh model pricing
    Pricing {
        #[command(subcommand)]
        action: PricingAction,
    },
}

#[derive(Subcommand)]
enum KeysAction {
    /// Store the API key for a provider
    Set {
        #[arg(value_enum)]
        provider: Provider,
        key: String,
    },
    /// List configured keys (masked)
    List {
        #[arg(long)]
        json: bool,
    },
    /// Remove the API key for a provider
    Remove {
        #[arg(value_enum)]
        provider: Provider,
    },
    /// Check that a provider accepts the stored key
    Test {
        #[arg(value_enum)]
        provider: Provider,
    },
}

#[derive(Subcommand)]
enum BlendAction {
    /// Create a blend from provider:model_id entries
    Add {
        name: String,
        #[arg(short, long = "model", required = true)]
        models: Vec<SelectedModel>,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List blends
    List {
        #[arg(long)]
        json: bool,
    },
    /// Remove a blend
    Remove { name: String },
}

#[derive(Subcommand)]
enum PricingAction {
    /// Show prices, optionally filtered by model name
    Show {
        filter: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Fetch the latest LiteLLM price sheet
    Refresh,
}

impl Commands {
    fn json_output(&self) -> bool {
        match self {
            Commands::Compare { json, .. }
            | Commands::Sessions { json, .. }
            | Commands::Show { json, .. }
            | Commands::Metrics { json, .. }
            | Commands::Models { json, .. } => *json,
            Commands::Keys {
                action: KeysAction::List { json },
            }
            | Commands::Blend {
                action: BlendAction::List { json },
            }
            | Commands::Pricing {
                action: PricingAction::Show { json, .. },
            } => *json,
            _ => false,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let json = cli.command.json_output();

    let mut config = match Config::load_with(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => handle_error(e, json),
    };
    if let Commands::Compare {
        timeout: Some(secs), ..
    } = &cli.command
    {
        config.comparison.timeout_secs = *secs;
        if let Err(e) = config.validate() {
            handle_error(e, json);
        }
    }

    let _log_guard = init_logging(&config);

    match run(cli.command, config).await {
        Ok(()) => Ok(()),
        Err(e) => handle_error(e, json),
    }
}

async fn run(command: Commands, config: Config) -> Result<()> {
    let app = App::new(config)?;
    let _watcher = app.start_key_watcher();

    match command {
        Commands::Compare {
            prompt,
            system,
            mut models,
            blend,
            tags,
            no_save,
            json,
            ..
        } => {
            if let Some(name) = blend {
                let blend = app
                    .blends
                    .get(&name)?
                    .with_context(|| format!("No blend named '{}'", name))?;
                for model in blend.models {
                    if !models.contains(&model) {
                        models.push(model);
                    }
                }
            }

            let mut session = ComparisonSession::new(prompt, system, models);
            session.metadata.tags = tags;

            if !json {
                println!(
                    "⏳ Comparing {} models...",
                    session.models.len().to_string().bright_white().bold()
                );
            }
            let (session, analysis) = app.comparison.run_comparison(session, !no_save).await?;
            app.display.display_comparison(&session, &analysis, json);
        }
        Commands::Sessions { limit, json } => {
            let sessions = app.comparison.get_all_sessions()?;
            app.display.display_sessions(&sessions, limit, json);
        }
        Commands::Show { id, json } => {
            let session = find_session(&app, &id)?;
            let analysis = app
                .comparison
                .analyze_results(&session.id, session.results.as_deref().unwrap_or(&[]));
            app.display.display_comparison(&session, &analysis, json);
        }
        Commands::Export { id, format, output } => {
            let session = find_session(&app, &id)?;
            let analysis = app
                .comparison
                .analyze_results(&session.id, session.results.as_deref().unwrap_or(&[]));
            let rendered = app.comparison.export_results(&session, &analysis, format)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    eprintln!("✅ Exported {} to {}", session.id, path.display());
                }
                None => print!("{}", rendered),
            }
        }
        Commands::Delete { id } => {
            if !app.comparison.delete_session(&id)? {
                anyhow::bail!("Session {} not found", id);
            }
            println!("🗑  Deleted session {}", id);
        }
        Commands::Metrics { range, clear, json } => {
            if clear {
                app.metrics.clear().await?;
                println!("🗑  Cleared all recorded metrics");
            } else {
                let metrics = app.metrics.get_aggregated_metrics(range)?;
                app.display.display_metrics(&metrics, json);
            }
        }
        Commands::Keys { action } => run_keys(&app, action).await?,
        Commands::Models {
            provider,
            remote,
            json,
        } => {
            let providers = match provider {
                Some(p) => vec![p],
                None => Provider::ALL.to_vec(),
            };
            for provider in providers {
                let models = if remote {
                    app.registry.get(provider)?.list_models().await?
                } else {
                    catalog::default_models(provider)
                };
                app.display.display_models(provider, &models, json);
            }
        }
        Commands::Blend { action } => match action {
            BlendAction::Add {
                name,
                models,
                description,
            } => {
                let blend = app.blends.add(&name, description, models)?;
                println!(
                    "✅ Created blend {} with {} models",
                    blend.name.bright_white().bold(),
                    blend.models.len()
                );
            }
            BlendAction::List { json } => {
                let blends = app.blends.list()?;
                app.display.display_blends(&blends, json);
            }
            BlendAction::Remove { name } => {
                if !app.blends.remove(&name)? {
                    anyhow::bail!("No blend named '{}'", name);
                }
                println!("🗑  Removed blend {}", name);
            }
        },
        Commands::Pricing { action } => match action {
            PricingAction::Show { filter, json } => {
                let needle = filter.map(|f| f.to_ascii_lowercase());
                let entries: Vec<_> = app
                    .pricing
                    .entries()
                    .into_iter()
                    .filter(|(model, _)| needle.as_ref().map_or(true, |n| model.to_ascii_lowercase().contains(n)))
                    .collect();
                app.display.display_pricing(&entries, json);
            }
            PricingAction::Refresh => {
                let client = reqwest::Client::builder()
                    .timeout(std::time::Duration::from_secs(app.config.providers.request_timeout_secs))
                    .build()
                    .context("Failed to create HTTP client")?;
                let mut catalog = (*app.pricing).clone();
                let count = catalog.refresh(&app.store, &client).await?;
                println!("✅ Updated pricing for {} models", count.to_string().bright_white().bold());
            }
        },
    }

    Ok(())
}

async fn run_keys(app: &App, action: KeysAction) -> Result<()> {
    match action {
        KeysAction::Set { provider, key } => {
            app.keys.set_key(provider, &key)?;
            println!("✅ Saved {} API key", provider.display_name());
        }
        KeysAction::List { json } => {
            let keys = app.keys.masked_keys()?;
            app.display.display_keys(&keys, json);
        }
        KeysAction::Remove { provider } => {
            if app.keys.remove_key(provider)? {
                println!("🗑  Removed {} API key", provider.display_name());
            } else {
                println!("No {} API key was configured", provider.display_name());
            }
        }
        KeysAction::Test { provider } => {
            let client = app.registry.get(provider)?;
            client
                .test_connection()
                .await
                .with_context(|| format!("{} rejected the connection test", provider.display_name()))?;
            println!("✅ {} API key works", provider.display_name());
        }
    }
    Ok(())
}

fn find_session(app: &App, id: &str) -> Result<ComparisonSession> {
    app.comparison
        .get_session(id)?
        .with_context(|| format!("Session {} not found", id))
}

fn handle_error(e: anyhow::Error, json: bool) -> ! {
    if json {
        println!("{}", serde_json::json!({ "error": format!("{:#}", e) }));
    } else {
        eprintln!("Error: {:#}", e);
    }
    process::exit(1);
}
