//! Interactive line-based chat.
//!
//! Stdin lines and reply updates are multiplexed with `tokio::select!`, so
//! slash commands keep working while a reply streams. Commands that switch
//! conversation abandon the in-flight reply; plain messages sent while busy
//! are refused.

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::warn;

use crate::cli::conversations::{resolve_chat, write_sources, write_summaries, write_turns, write_update};
use crate::cli::say::rejection_message;
use crate::cli::sign_out;
use crate::core::config::Settings;
use crate::core::session::{SessionManager, SessionUpdate, SubmitOutcome};
use crate::utils::logging::TranscriptLog;

const HELP_TEXT: &str = "\
Chat commands:
  /new                    Start a new conversation
  /list [page]            List conversations
  /resume <n|uuid>        Switch to a conversation and show its history
  /rename <n|uuid> <title>
                          Rename a conversation
  /delete <n|uuid>        Delete a conversation
  /kb [uuid|off]          Show, set, or clear the knowledge base for new conversations
  /log [filename]         Log the transcript to a file, or pause/resume logging
  /logout                 Sign out and forget the active conversation
  /help                   Show this help
  /quit                   Leave the chat

Anything else is sent as a message. Positions refer to the last /list.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KbCommand {
    Show,
    Clear,
    Bind(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Empty,
    Message(String),
    New,
    List(u32),
    Resume(String),
    Rename { chat: String, title: String },
    Delete(String),
    Kb(KbCommand),
    Log(Option<PathBuf>),
    Logout,
    Help,
    Quit,
    /// A known command with bad arguments; carries the usage line.
    Invalid(&'static str),
    Unknown(String),
}

/// Parses one line of input. Lines not starting with `/` are messages.
pub fn parse_input(line: &str) -> ReplInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ReplInput::Empty;
    }
    let Some(command_line) = trimmed.strip_prefix('/') else {
        return ReplInput::Message(trimmed.to_string());
    };

    let (command, rest) = match command_line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (command_line, ""),
    };
    match command.to_ascii_lowercase().as_str() {
        "new" => ReplInput::New,
        "list" if rest.is_empty() => ReplInput::List(1),
        "list" => match rest.parse::<u32>() {
            Ok(page) if page > 0 => ReplInput::List(page),
            _ => ReplInput::Invalid("Usage: /list [page]"),
        },
        "resume" if !rest.is_empty() => ReplInput::Resume(rest.to_string()),
        "resume" => ReplInput::Invalid("Usage: /resume <n|uuid>"),
        "rename" => match rest.split_once(char::is_whitespace) {
            Some((chat, title)) if !title.trim().is_empty() => ReplInput::Rename {
                chat: chat.to_string(),
                title: title.trim().to_string(),
            },
            _ => ReplInput::Invalid("Usage: /rename <n|uuid> <title>"),
        },
        "delete" if !rest.is_empty() => ReplInput::Delete(rest.to_string()),
        "delete" => ReplInput::Invalid("Usage: /delete <n|uuid>"),
        "kb" => match rest {
            "" => ReplInput::Kb(KbCommand::Show),
            "off" | "none" => ReplInput::Kb(KbCommand::Clear),
            uuid => ReplInput::Kb(KbCommand::Bind(uuid.to_string())),
        },
        "log" if rest.is_empty() => ReplInput::Log(None),
        "log" => ReplInput::Log(Some(PathBuf::from(rest))),
        "logout" => ReplInput::Logout,
        "help" | "?" => ReplInput::Help,
        "quit" | "exit" | "q" => ReplInput::Quit,
        _ => ReplInput::Unknown(command.to_string()),
    }
}

enum Wake {
    Update(Option<SessionUpdate>),
    Line(Option<String>),
}

fn show_prompt() -> io::Result<()> {
    let mut stdout = io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()
}

fn report(message: impl std::fmt::Display) {
    eprintln!("❌ {message}");
}

struct ChatLoop {
    session: SessionManager,
    transcript: TranscriptLog,
}

impl ChatLoop {
    fn log_turn_at(&self, index_from_end: usize) {
        let turns = self.session.turns();
        let Some(turn) = turns.len().checked_sub(index_from_end + 1).and_then(|i| turns.get(i)) else {
            return;
        };
        if let Err(err) = self.transcript.log_turn(turn) {
            warn!(error = %err, "could not write transcript");
        }
    }

    fn log_note(&self, note: &str) {
        if let Err(err) = self.transcript.log_note(note) {
            warn!(error = %err, "could not write transcript");
        }
    }

    /// Returns true once the reply has settled and the prompt should return.
    fn apply_update(&self, update: SessionUpdate) -> io::Result<bool> {
        let mut stdout = io::stdout();
        write_update(&mut stdout, &update)?;
        match update {
            SessionUpdate::Fragment(_) | SessionUpdate::Context(_) => Ok(false),
            SessionUpdate::Completed => {
                if let Some(reply) = self.session.log().last() {
                    write_sources(&mut stdout, reply.context_snippets())?;
                }
                self.log_turn_at(0);
                Ok(true)
            }
            SessionUpdate::Failed(err) => {
                report(&err);
                Ok(true)
            }
        }
    }

    async fn send(&mut self, text: String) {
        match self.session.submit(&text).await {
            SubmitOutcome::Streaming { .. } => self.log_turn_at(1),
            SubmitOutcome::Rejected(reason) => eprintln!("⚠️  {}", rejection_message(reason)),
            SubmitOutcome::Failed(err) => report(&err),
        }
    }

    /// Runs one parsed line. Returns false when the user asked to leave.
    async fn handle(&mut self, input: ReplInput) -> Result<bool, Box<dyn Error>> {
        match input {
            ReplInput::Empty => {}
            ReplInput::Message(text) => self.send(text).await,
            ReplInput::New => {
                self.session.new_conversation();
                self.log_note("New conversation");
                println!("✅ The next message starts a new conversation");
            }
            ReplInput::List(page) => match self.session.directory().list(page).await {
                Ok(summaries) if summaries.is_empty() => println!("No conversations found."),
                Ok(summaries) => write_summaries(
                    &mut io::stdout(),
                    &summaries,
                    page == 1,
                    self.session.active_chat(),
                )?,
                Err(err) => report(err),
            },
            ReplInput::Resume(reference) => {
                let chat_uuid = match resolve_chat(&self.session, &reference).await {
                    Ok(chat_uuid) => chat_uuid,
                    Err(err) => {
                        report(err);
                        return Ok(true);
                    }
                };
                match self.session.resume(&chat_uuid).await {
                    Ok(()) => {
                        self.log_note(&format!("Resumed conversation {chat_uuid}"));
                        write_turns(&mut io::stdout(), self.session.turns())?;
                        println!("✅ Resumed conversation {chat_uuid}");
                    }
                    Err(err) => report(err),
                }
            }
            ReplInput::Rename { chat, title } => {
                let result: Result<String, Box<dyn Error>> = match resolve_chat(&self.session, &chat).await {
                    Ok(chat_uuid) => self
                        .session
                        .directory()
                        .rename(&chat_uuid, &title)
                        .await
                        .map(|()| chat_uuid)
                        .map_err(Into::into),
                    Err(err) => Err(err),
                };
                match result {
                    Ok(chat_uuid) => println!("✅ Renamed {chat_uuid} to: {title}"),
                    Err(err) => report(err),
                }
            }
            ReplInput::Delete(reference) => {
                let chat_uuid = match resolve_chat(&self.session, &reference).await {
                    Ok(chat_uuid) => chat_uuid,
                    Err(err) => {
                        report(err);
                        return Ok(true);
                    }
                };
                match self.session.delete_conversation(&chat_uuid).await {
                    Ok(true) => {
                        println!("✅ Deleted {chat_uuid}; the next message starts a new conversation")
                    }
                    Ok(false) => println!("✅ Deleted {chat_uuid}"),
                    Err(err) => report(err),
                }
            }
            ReplInput::Kb(KbCommand::Show) => match self.session.kb_binding() {
                Some(kb) => println!("New conversations use knowledge base {kb}"),
                None => println!("No knowledge base bound; the backend default is used"),
            },
            ReplInput::Kb(KbCommand::Clear) => {
                self.session.set_kb_binding(None);
                println!("✅ Knowledge base binding cleared");
            }
            ReplInput::Kb(KbCommand::Bind(kb)) => {
                self.session.set_kb_binding(Some(kb.clone()));
                println!("✅ New conversations will use knowledge base {kb}");
            }
            ReplInput::Log(path) => {
                let result = match path {
                    Some(path) => self.transcript.set_log_file(path),
                    None => self.transcript.toggle_logging(),
                };
                match result {
                    Ok(message) => println!("{message}"),
                    Err(err) => report(err),
                }
            }
            ReplInput::Logout => match sign_out(&mut self.session) {
                Ok(()) => self.log_note("Signed out"),
                Err(err) => report(err),
            },
            ReplInput::Help => println!("{HELP_TEXT}"),
            ReplInput::Quit => return Ok(false),
            ReplInput::Invalid(usage) => eprintln!("⚠️  {usage}"),
            ReplInput::Unknown(command) => {
                eprintln!("⚠️  Unknown command /{command}. Type /help for commands.")
            }
        }
        Ok(true)
    }
}

fn stdin_lines() -> Lines<BufReader<Stdin>> {
    BufReader::new(tokio::io::stdin()).lines()
}

pub async fn run_chat(
    mut session: SessionManager,
    transcript: TranscriptLog,
    settings: &Settings,
) -> Result<(), Box<dyn Error>> {
    println!("kbchat connected to {}", settings.base_url);
    println!("Transcript logging: {}", transcript.get_status_string());
    println!("Type /help for commands, /quit to leave.");
    println!();

    match session.restore().await {
        Ok(true) => write_turns(&mut io::stdout(), session.turns())?,
        Ok(false) => {}
        Err(err) => report(err),
    }

    let mut chat = ChatLoop {
        session,
        transcript,
    };
    let mut lines = stdin_lines();
    show_prompt()?;

    loop {
        let wake = tokio::select! {
            update = chat.session.next_update(), if chat.session.is_busy() => Wake::Update(update),
            line = lines.next_line() => Wake::Line(line?),
        };

        match wake {
            Wake::Update(Some(update)) => {
                if chat.apply_update(update)? {
                    show_prompt()?;
                }
            }
            Wake::Update(None) => {}
            Wake::Line(None) => break,
            Wake::Line(Some(line)) => {
                if !chat.handle(parse_input(&line)).await? {
                    break;
                }
                if !chat.session.is_busy() {
                    show_prompt()?;
                }
            }
        }
    }

    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_messages() {
        assert_eq!(parse_input("   "), ReplInput::Empty);
        assert_eq!(
            parse_input("  What is X?  "),
            ReplInput::Message("What is X?".into())
        );
    }

    #[test]
    fn conversation_commands_parse_arguments() {
        assert_eq!(parse_input("/new"), ReplInput::New);
        assert_eq!(parse_input("/list"), ReplInput::List(1));
        assert_eq!(parse_input("/list 3"), ReplInput::List(3));
        assert_eq!(parse_input("/RESUME 2"), ReplInput::Resume("2".into()));
        assert_eq!(
            parse_input("/rename 1   My  new title "),
            ReplInput::Rename {
                chat: "1".into(),
                title: "My  new title".into(),
            }
        );
        assert_eq!(parse_input("/delete abc-123"), ReplInput::Delete("abc-123".into()));
    }

    #[test]
    fn missing_arguments_report_usage() {
        assert!(matches!(parse_input("/list zero"), ReplInput::Invalid(_)));
        assert!(matches!(parse_input("/list 0"), ReplInput::Invalid(_)));
        assert!(matches!(parse_input("/resume"), ReplInput::Invalid(_)));
        assert!(matches!(parse_input("/rename 1"), ReplInput::Invalid(_)));
        assert!(matches!(parse_input("/delete "), ReplInput::Invalid(_)));
    }

    #[test]
    fn settings_commands_parse() {
        assert_eq!(parse_input("/kb"), ReplInput::Kb(KbCommand::Show));
        assert_eq!(parse_input("/kb off"), ReplInput::Kb(KbCommand::Clear));
        assert_eq!(
            parse_input("/kb kb-42"),
            ReplInput::Kb(KbCommand::Bind("kb-42".into()))
        );
        assert_eq!(parse_input("/log"), ReplInput::Log(None));
        assert_eq!(
            parse_input("/log chat.md"),
            ReplInput::Log(Some(PathBuf::from("chat.md")))
        );
        assert_eq!(parse_input("/logout"), ReplInput::Logout);
        assert_eq!(parse_input("/help"), ReplInput::Help);
        assert_eq!(parse_input("/exit"), ReplInput::Quit);
        assert_eq!(parse_input("/frobnicate now"), ReplInput::Unknown("frobnicate".into()));
    }

    #[tokio::test]
    async fn stdin_reader_is_available() {
        let _lines = stdin_lines();
    }
}
