//! One-shot "say" command: send a message and stream the reply to stdout

use std::error::Error;
use std::io::{self, Write};

use tracing::warn;

use crate::cli::conversations::{write_sources, write_update};
use crate::cli::NOT_SIGNED_IN;
use crate::core::session::{RejectReason, SessionManager, SessionUpdate, SubmitOutcome};
use crate::utils::logging::TranscriptLog;

/// User-facing text for a refused submit.
pub fn rejection_message(reason: RejectReason) -> &'static str {
    match reason {
        RejectReason::EmptyInput => "Message is empty",
        RejectReason::Unauthenticated => NOT_SIGNED_IN,
        RejectReason::Busy => "A reply is still in progress",
    }
}

pub async fn run_say(
    mut session: SessionManager,
    transcript: TranscriptLog,
    prompt: &str,
) -> Result<(), Box<dyn Error>> {
    if prompt.trim().is_empty() {
        return Err("Usage: kbchat say <prompt>".into());
    }

    match session.submit(prompt).await {
        SubmitOutcome::Streaming { .. } => {}
        SubmitOutcome::Rejected(reason) => return Err(rejection_message(reason).into()),
        SubmitOutcome::Failed(err) => return Err(Box::new(err)),
    }
    if let Some(turn) = session.turns().iter().rev().find(|turn| turn.is_user()) {
        if let Err(err) = transcript.log_turn(turn) {
            warn!(error = %err, "could not write transcript");
        }
    }

    let mut stdout = io::stdout();
    while let Some(update) = session.next_update().await {
        write_update(&mut stdout, &update)?;
        match update {
            SessionUpdate::Failed(err) => return Err(Box::new(err)),
            SessionUpdate::Completed => {
                if let Some(reply) = session.log().last() {
                    write_sources(&mut stdout, reply.context_snippets())?;
                    if let Err(err) = transcript.log_turn(reply) {
                        warn!(error = %err, "could not write transcript");
                    }
                }
            }
            SessionUpdate::Fragment(_) | SessionUpdate::Context(_) => {}
        }
    }
    stdout.flush()?;
    Ok(())
}
