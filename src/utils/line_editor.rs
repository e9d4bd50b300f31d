//! Single-line masked terminal prompt for secrets.

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

const MASK_CHAR: char = '*';

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineEditorState {
    pub text: String,
}

impl LineEditorState {
    /// What the terminal shows: one mask character per typed character.
    pub fn masked(&self) -> String {
        std::iter::repeat(MASK_CHAR)
            .take(self.text.chars().count())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEditAction {
    Insert(char),
    Backspace,
    DeleteWord,
    ClearAll,
    Paste(String),
    Submit,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEditOutcome {
    Continue { redraw: bool },
    Submit(String),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct LineEditorError {
    message: String,
}

impl LineEditorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for LineEditorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LineEditorError {}

fn editor_error(err: io::Error) -> LineEditorError {
    LineEditorError::new(err.to_string())
}

/// Reads one line in raw mode, echoing only mask characters.
pub fn prompt_masked_line(prompt: &str) -> Result<String, LineEditorError> {
    enable_raw_mode().map_err(editor_error)?;
    let mut stdout = io::stdout();
    execute!(stdout, event::EnableBracketedPaste).map_err(editor_error)?;

    let result = (|| -> Result<String, LineEditorError> {
        let mut state = LineEditorState::default();
        let mut needs_redraw = true;

        loop {
            if needs_redraw {
                redraw_line(prompt, &state).map_err(editor_error)?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100)).map_err(editor_error)? {
                continue;
            }
            let action = match event::read().map_err(editor_error)? {
                Event::Key(key) if key.kind == KeyEventKind::Press => map_key_event_to_action(&key),
                Event::Paste(text) => Some(LineEditAction::Paste(text)),
                _ => None,
            };
            let Some(action) = action else {
                continue;
            };
            match apply_line_edit_action(&mut state, action) {
                LineEditOutcome::Continue { redraw } => needs_redraw = redraw,
                LineEditOutcome::Submit(value) => break Ok(value),
                LineEditOutcome::Cancelled => break Err(LineEditorError::new("Cancelled.")),
            }
        }
    })();

    let disable_raw_result = disable_raw_mode().map_err(editor_error);
    let disable_paste_result = execute!(stdout, event::DisableBracketedPaste).map_err(editor_error);
    println!();

    let value = result?;
    disable_raw_result?;
    disable_paste_result?;
    Ok(value)
}

fn redraw_line(prompt: &str, state: &LineEditorState) -> io::Result<()> {
    let mut stdout = io::stdout();
    write!(stdout, "\r\x1b[K{prompt}{}", state.masked())?;
    stdout.flush()
}

pub fn map_key_event_to_action(key: &KeyEvent) -> Option<LineEditAction> {
    let control = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Enter => Some(LineEditAction::Submit),
        KeyCode::Esc => Some(LineEditAction::Cancel),
        KeyCode::Backspace => Some(LineEditAction::Backspace),
        KeyCode::Char('c') | KeyCode::Char('d') if control => Some(LineEditAction::Cancel),
        KeyCode::Char('w') if control => Some(LineEditAction::DeleteWord),
        KeyCode::Char('u') if control => Some(LineEditAction::ClearAll),
        KeyCode::Char('\n') | KeyCode::Char('\r') => Some(LineEditAction::Submit),
        KeyCode::Char(c) if !control => Some(LineEditAction::Insert(c)),
        _ => None,
    }
}

pub fn apply_line_edit_action(state: &mut LineEditorState, action: LineEditAction) -> LineEditOutcome {
    match action {
        LineEditAction::Insert(c) => {
            state.text.push(c);
            LineEditOutcome::Continue { redraw: true }
        }
        LineEditAction::Backspace => LineEditOutcome::Continue {
            redraw: state.text.pop().is_some(),
        },
        LineEditAction::DeleteWord => {
            let kept = state.text.trim_end().len();
            let start = state.text[..kept]
                .rfind(char::is_whitespace)
                .map(|index| index + 1)
                .unwrap_or(0);
            state.text.truncate(start);
            LineEditOutcome::Continue { redraw: true }
        }
        LineEditAction::ClearAll => {
            state.text.clear();
            LineEditOutcome::Continue { redraw: true }
        }
        // A pasted newline submits; control characters are dropped.
        LineEditAction::Paste(text) => {
            let (line, submits) = match text.split_once(['\r', '\n']) {
                Some((line, _)) => (line, true),
                None => (text.as_str(), false),
            };
            state.text.extend(line.chars().filter(|c| !c.is_control()));
            if submits {
                LineEditOutcome::Submit(std::mem::take(&mut state.text))
            } else {
                LineEditOutcome::Continue { redraw: true }
            }
        }
        LineEditAction::Submit => LineEditOutcome::Submit(std::mem::take(&mut state.text)),
        LineEditAction::Cancel => LineEditOutcome::Cancelled,
    }
}
