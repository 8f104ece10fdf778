//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod model_list;
pub mod provider_list;
pub mod say;
pub mod settings;


use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::cli::model_list::list_models;
use crate::cli::provider_list::list_providers;
use crate::cli::say::run_say;
use crate::cli::settings::{save_settings, show_settings};
use crate::core::config::{default_config_path, Config};
use crate::core::manager::ChatManager;
use crate::core::providers::{ClientFactory, ProviderError, ProviderRegistry};
use crate::core::store::Database;
use crate::logging;
use crate::ui::chat_loop::run_chat;

#[derive(Parser)]
#[command(name = "llmschat")]
#[command(about = "A terminal chat client for hosted LLM providers")]
#[command(
    long_about = "llmschat keeps several chats open at once against a hosted LLM provider. \
Replies stream in the background, so you can switch chats while one is still answering.\n\n\
Getting started:\n\
  llmschat providers                 List the provider catalog\n\
  llmschat models <provider>         List a provider's models\n\
  llmschat settings set ...          Choose provider, model and API key\n\
  llmschat                           Start chatting\n\n\
Logging:\n\
  LLMSCHAT_LOG or RUST_LOG           Log filter, e.g. llmschat=debug (written to stderr)\n\n\
Chat commands:\n\
  /new /list /switch <n> /rename <title> /delete [n] /stop /help /quit"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file to use instead of the platform default
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Database file to use instead of the configured one
    #[arg(long, global = true, value_name = "PATH")]
    pub database: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the interactive chat (default)
    Chat,
    /// Send one prompt and print the reply
    Say {
        /// Prompt text; multiple words are joined with spaces
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// List the provider catalog
    Providers,
    /// List the models of one provider
    Models {
        /// Provider name, e.g. OpenAI
        provider: String,
    },
    /// Show or change the active provider, model and API key
    Settings {
        #[command(subcommand)]
        command: Option<SettingsCommands>,
    },
    /// Show or change configuration values
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Show the saved settings (default)
    Show,
    /// Replace the saved settings
    Set {
        /// Your display name
        #[arg(long)]
        name: String,
        /// Provider name from `llmschat providers`
        #[arg(long)]
        provider: String,
        /// Model name from `llmschat models <provider>`
        #[arg(long)]
        model: String,
        /// API key for the provider
        #[arg(long, value_name = "KEY")]
        api_key: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the current configuration (default)
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key, e.g. greeting or base-url.OpenAI
        key: String,
        /// Value to set; multiple words are joined with spaces
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        value: Vec<String>,
    },
    /// Reset a configuration value to its default
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

/// Print a provider error with recovery hints and exit with its code.
pub(crate) fn exit_with_provider_error(err: &ProviderError) -> ! {
    eprintln!("❌ {err}");
    print_quick_fixes(err);
    std::process::exit(err.exit_code());
}

fn print_quick_fixes(err: &ProviderError) {
    let fixes = err.quick_fixes();
    if !fixes.is_empty() {
        eprintln!();
        eprintln!("💡 Quick fixes:");
        for fix in fixes {
            eprintln!("  • {fix}");
        }
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut config = match Config::load_from_path(&config_path) {
        Ok(config) => config,
        Err(err) => {
            logging::init(None);
            return Err(err.into());
        }
    };
    logging::init(config.log_filter.as_deref());
    debug!(path = %config_path.display(), "configuration loaded");

    let command = args.command.unwrap_or(Commands::Chat);
    if let Commands::Config { command } = command {
        match command.unwrap_or(ConfigCommands::Show) {
            ConfigCommands::Show => config.print_all(),
            ConfigCommands::Set { key, value } => {
                let value = value.join(" ");
                config.set_value(&key, &value)?;
                config.save_to_path(&config_path)?;
                println!("✅ Set {key} to: {}", value.trim());
            }
            ConfigCommands::Unset { key } => {
                config.unset_value(&key)?;
                config.save_to_path(&config_path)?;
                println!("✅ Unset {key}");
            }
        }
        return Ok(());
    }

    let database_path = match args.database {
        Some(path) => path,
        None => config.database_path()?,
    };
    let db = Database::open(&database_path)?;
    let registry = ProviderRegistry::with_builtins();

    match command {
        Commands::Chat => {
            let factory = ClientFactory::new(db, registry, config.client_options());
            if let Err(err) = factory.resolve_config() {
                eprintln!("⚠️  {err}");
                print_quick_fixes(&err);
                eprintln!();
            }
            let (manager, events) = ChatManager::new(Arc::new(factory), config.greeting());
            run_chat(manager, events).await
        }
        Commands::Say { prompt } => {
            let factory = ClientFactory::new(db, registry, config.client_options());
            run_say(&factory, prompt).await
        }
        Commands::Providers => list_providers(&db, &registry),
        Commands::Models { provider } => list_models(&db, &provider),
        Commands::Settings { command } => match command.unwrap_or(SettingsCommands::Show) {
            SettingsCommands::Show => show_settings(&db),
            SettingsCommands::Set {
                name,
                provider,
                model,
                api_key,
            } => save_settings(&db, &registry, &name, &provider, &model, &api_key),
        },
        Commands::Config { .. } => Ok(()),
    }
}
