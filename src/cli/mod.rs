//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod chat;
pub mod conversations;
pub mod say;

#[cfg(test)]
mod tests;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::api::{ChatBackend, HttpBackend};
use crate::auth::{self, ui::prompt_password, TokenStore, TOKEN_ENV};
use crate::core::config::data::{Config, ConfigKey};
use crate::core::config::{Settings, SettingsOverrides};
use crate::core::failure::describe_failure;
use crate::core::session::{SessionManager, SessionOptions};
use crate::core::state_store::{ConversationStore, FileConversationStore};
use crate::utils::logging::TranscriptLog;

pub const LOG_ENV: &str = "KBCHAT_LOG";
pub const NOT_SIGNED_IN: &str = "Not signed in. Run `kbchat login <identifier>` or set KBCHAT_TOKEN.";

#[derive(Parser)]
#[command(name = "kbchat")]
#[command(version)]
#[command(about = "Chat with a knowledge-base assistant from the terminal")]
#[command(
    long_about = "kbchat talks to a knowledge-base chat backend. Replies are streamed as they \
are generated, and conversations are kept on the server so they can be listed, renamed, \
and resumed later.\n\n\
Authentication:\n\
  Use 'kbchat login <identifier>' to store a token in your system keyring.\n\n\
Environment Variables:\n\
  KBCHAT_TOKEN       Bearer token (used when the keyring has none)\n\
  KBCHAT_BASE_URL    Backend URL (defaults to http://127.0.0.1:8000)\n\
  KBCHAT_KB          Knowledge base bound to new conversations\n\
  KBCHAT_CONFIG_DIR  Directory holding config.toml and state.toml\n\
  KBCHAT_LOG         Diagnostic log filter, e.g. 'kbchat=debug' (falls back to RUST_LOG)\n\n\
Commands inside the chat:\n\
  /help             Show all chat commands\n\
  /log <filename>   Enable transcript logging to the file\n\
  /log              Toggle transcript logging pause/resume"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Backend base URL
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Knowledge base to bind new conversations to
    #[arg(long, global = true, value_name = "KB_UUID")]
    pub kb: Option<String>,

    /// Append the conversation transcript to the specified file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the interactive chat (default)
    Chat,
    /// Send one message and stream the reply to stdout
    Say {
        /// Message to send
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// List conversations, most recent first
    List {
        /// Page of results to show
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Print a conversation's history and make it the active one
    Resume {
        /// Conversation uuid, or its position in `kbchat list`
        chat: String,
    },
    /// Rename a conversation
    Rename {
        /// Conversation uuid, or its position in `kbchat list`
        chat: String,
        /// New title
        #[arg(trailing_var_arg = true, required = true)]
        title: Vec<String>,
    },
    /// Delete a conversation
    Delete {
        /// Conversation uuid, or its position in `kbchat list`
        chat: String,
    },
    /// Forget the active conversation; the next message starts a new one
    New,
    /// Sign in and store the token in the system keyring
    Login {
        /// Account name or email
        identifier: String,
    },
    /// Remove the stored token and forget the active conversation
    Logout,
    /// Set configuration values, or show them when no key is given
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value to set for the key
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Option<Vec<String>>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

/// Diagnostics go to stderr so they never interleave with streamed replies.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

pub fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

fn load_settings(args: &Args) -> Result<Settings, Box<dyn Error>> {
    let config = Config::load()?;
    let overrides = SettingsOverrides {
        base_url: args.base_url.clone(),
        kb_uuid: args.kb.clone(),
    };
    let settings = Settings::resolve(&config, &overrides);
    debug!(base_url = %settings.base_url, kb = ?settings.kb_uuid, mode = %settings.reply_mode, "resolved settings");
    Ok(settings)
}

fn open_store() -> Result<Arc<dyn ConversationStore>, Box<dyn Error>> {
    Ok(Arc::new(FileConversationStore::new(Config::get_state_path()?)))
}

/// Builds a session against the configured backend using the stored token.
pub fn open_session(settings: &Settings) -> Result<SessionManager, Box<dyn Error>> {
    let token = TokenStore::new().resolve_token();
    let backend: Arc<dyn ChatBackend> = Arc::new(HttpBackend::new(
        settings.base_url.clone(),
        token,
        settings.request_timeout,
    )?);
    Ok(SessionManager::new(
        backend,
        open_store()?,
        SessionOptions {
            kb_uuid: settings.kb_uuid.clone(),
            reply_mode: settings.reply_mode,
            list_page_size: settings.list_page_size,
        },
    ))
}

async fn run_login(settings: &Settings, identifier: &str) -> Result<(), Box<dyn Error>> {
    let password = prompt_password()?;
    let client = reqwest::Client::builder()
        .connect_timeout(settings.request_timeout)
        .build()?;
    let token = auth::login(
        &client,
        &settings.base_url,
        identifier,
        &password,
        settings.request_timeout,
    )
    .await
    .map_err(|err| describe_failure(&err, "Login failed"))?;

    TokenStore::new().store_token(&token)?;
    println!("✅ Signed in as {identifier}");
    Ok(())
}

/// Removes the stored token and resets the session, abandoning any reply
/// still streaming.
pub fn sign_out(session: &mut SessionManager) -> Result<(), Box<dyn Error>> {
    session.logout();
    let removed = match TokenStore::new().clear_token() {
        Ok(removed) => removed,
        Err(err) if err.is_recoverable() => {
            eprintln!("⚠️  {err}");
            false
        }
        Err(err) => return Err(err.into()),
    };
    if removed {
        println!("✅ Signed out");
    } else {
        println!("No stored token to remove.");
    }
    if std::env::var_os(TOKEN_ENV).is_some() {
        eprintln!("⚠️  {TOKEN_ENV} is still set in the environment");
    }
    Ok(())
}

fn run_set(key: Option<String>, value: Option<Vec<String>>) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load()?;
    let (Some(key), Some(value)) = (key, value.filter(|parts| !parts.is_empty())) else {
        config.print_all();
        return Ok(());
    };
    let key = ConfigKey::parse(&key)?;
    let value = value.join(" ");
    config.set_value(key, &value)?;
    config.save()?;
    println!("✅ Set {} to: {}", key.name(), value.trim());
    Ok(())
}

fn run_unset(key: &str) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load()?;
    let key = ConfigKey::parse(key)?;
    config.unset_value(key);
    config.save()?;
    println!("✅ Unset {}", key.name());
    Ok(())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let transcript = TranscriptLog::new(args.log.clone());

    match args.command.as_ref().unwrap_or(&Commands::Chat) {
        Commands::Chat => {
            let settings = load_settings(&args)?;
            let session = open_session(&settings)?;
            chat::run_chat(session, transcript, &settings).await
        }
        Commands::Say { prompt } => {
            let settings = load_settings(&args)?;
            let session = open_session(&settings)?;
            say::run_say(session, transcript, &prompt.join(" ")).await
        }
        Commands::List { page } => {
            let session = open_session(&load_settings(&args)?)?;
            conversations::run_list(&session, *page).await
        }
        Commands::Resume { chat } => {
            let mut session = open_session(&load_settings(&args)?)?;
            conversations::run_resume(&mut session, chat).await
        }
        Commands::Rename { chat, title } => {
            let session = open_session(&load_settings(&args)?)?;
            conversations::run_rename(&session, chat, &title.join(" ")).await
        }
        Commands::Delete { chat } => {
            let mut session = open_session(&load_settings(&args)?)?;
            conversations::run_delete(&mut session, chat).await
        }
        Commands::New => {
            let mut session = open_session(&load_settings(&args)?)?;
            session.new_conversation();
            println!("✅ The next message starts a new conversation");
            Ok(())
        }
        Commands::Login { identifier } => run_login(&load_settings(&args)?, identifier).await,
        Commands::Logout => {
            let mut session = open_session(&load_settings(&args)?)?;
            sign_out(&mut session)
        }
        Commands::Set { key, value } => run_set(key.clone(), value.clone()),
        Commands::Unset { key } => run_unset(key),
    }
}
