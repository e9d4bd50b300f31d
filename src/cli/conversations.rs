//! Conversation-directory commands and the plain-text rendering they share
//! with the chat loop.

use std::error::Error;
use std::io::{self, Write};

use unicode_segmentation::UnicodeSegmentation;

use crate::api::ConversationSummary;
use crate::core::message::{Turn, TurnRole};
use crate::core::session::{SessionManager, SessionUpdate};

const SNIPPET_PREVIEW_LENGTH: usize = 100;

/// Writes one applied step of a reply as it arrives.
///
/// Context snippets are not echoed here; they are shown once the reply
/// completes, see [`write_sources`].
pub fn write_update<W: Write>(out: &mut W, update: &SessionUpdate) -> io::Result<()> {
    match update {
        SessionUpdate::Fragment(text) => {
            write!(out, "{text}")?;
            out.flush()
        }
        SessionUpdate::Context(_) => Ok(()),
        SessionUpdate::Completed | SessionUpdate::Failed(_) => writeln!(out),
    }
}

fn preview(snippet: &str) -> String {
    let first_line = snippet.lines().map(str::trim).find(|line| !line.is_empty()).unwrap_or("");
    let mut graphemes = first_line.graphemes(true);
    let mut shown: String = graphemes.by_ref().take(SNIPPET_PREVIEW_LENGTH).collect();
    if graphemes.next().is_some() {
        shown.push('…');
    }
    shown
}

pub fn write_sources<W: Write>(out: &mut W, snippets: &[String]) -> io::Result<()> {
    if snippets.is_empty() {
        return Ok(());
    }
    writeln!(out, "Sources:")?;
    for (index, snippet) in snippets.iter().enumerate() {
        writeln!(out, "  [{}] {}", index + 1, preview(snippet))?;
    }
    Ok(())
}

/// Renders turns the same way the transcript log records them.
pub fn write_turns<W: Write>(out: &mut W, turns: &[Turn]) -> io::Result<()> {
    for turn in turns.iter().filter(|turn| !turn.is_provisional()) {
        match turn.role() {
            TurnRole::User => writeln!(out, "You: {}", turn.content())?,
            TurnRole::Assistant => {
                writeln!(out, "{}", turn.content())?;
                write_sources(out, turn.context_snippets())?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

/// One line per conversation. Positions are only printed for the first page,
/// since that is the page numeric references resolve against.
pub fn write_summaries<W: Write>(
    out: &mut W,
    summaries: &[ConversationSummary],
    numbered: bool,
    active: Option<&str>,
) -> io::Result<()> {
    for (index, summary) in summaries.iter().enumerate() {
        let marker = if active == Some(summary.uuid.as_str()) { '*' } else { ' ' };
        let position = if numbered {
            format!("{:>3}.", index + 1)
        } else {
            "   -".to_string()
        };
        let updated = summary
            .last_updated_display()
            .map(|when| format!("  ({when})"))
            .unwrap_or_default();
        writeln!(
            out,
            "{marker}{position} {}{updated}  {}",
            summary.display_title(),
            summary.uuid
        )?;
    }
    Ok(())
}

/// Resolves a position or uuid. Positions need a fresh first page.
pub async fn resolve_chat(session: &SessionManager, reference: &str) -> Result<String, Box<dyn Error>> {
    let directory = session.directory();
    if reference.trim().parse::<usize>().is_ok() {
        directory.refresh().await?;
    }
    directory
        .resolve_reference(reference)
        .ok_or_else(|| format!("No conversation matches '{}'", reference.trim()).into())
}

pub async fn run_list(session: &SessionManager, page: u32) -> Result<(), Box<dyn Error>> {
    let summaries = session.directory().list(page).await?;
    let mut out = io::stdout();
    if summaries.is_empty() {
        if page <= 1 {
            writeln!(out, "No conversations yet.")?;
        } else {
            writeln!(out, "No conversations on page {page}.")?;
        }
        return Ok(());
    }
    write_summaries(&mut out, &summaries, page <= 1, session.active_chat())?;
    Ok(())
}

pub async fn run_resume(session: &mut SessionManager, reference: &str) -> Result<(), Box<dyn Error>> {
    let chat_uuid = resolve_chat(session, reference).await?;
    session.resume(&chat_uuid).await?;
    let mut out = io::stdout();
    write_turns(&mut out, session.turns())?;
    writeln!(out, "✅ Resumed conversation {chat_uuid}")?;
    Ok(())
}

pub async fn run_rename(session: &SessionManager, reference: &str, title: &str) -> Result<(), Box<dyn Error>> {
    let chat_uuid = resolve_chat(session, reference).await?;
    session.directory().rename(&chat_uuid, title).await?;
    println!("✅ Renamed {chat_uuid} to: {}", title.trim());
    Ok(())
}

pub async fn run_delete(session: &mut SessionManager, reference: &str) -> Result<(), Box<dyn Error>> {
    let chat_uuid = resolve_chat(session, reference).await?;
    let was_active = session.delete_conversation(&chat_uuid).await?;
    println!("✅ Deleted {chat_uuid}");
    if was_active {
        println!("The next message starts a new conversation.");
    }
    Ok(())
}
