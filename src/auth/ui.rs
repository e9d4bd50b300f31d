use std::fmt;
use std::io::{self, BufRead, IsTerminal, Write};

use crate::utils::line_editor::prompt_masked_line;

const PASSWORD_PROMPT: &str = "Password: ";

#[derive(Debug, Clone)]
pub struct UiError {
    message: String,
}

impl UiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for UiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for UiError {}

fn validate_password(password: String) -> Result<String, UiError> {
    if password.is_empty() {
        return Err(UiError::new("Password cannot be empty"));
    }
    Ok(password)
}

/// Reads one line as a password from a non-interactive source such as a pipe.
pub fn read_password<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<String, UiError> {
    write!(output, "{PASSWORD_PROMPT}").map_err(|err| UiError::new(err.to_string()))?;
    output
        .flush()
        .map_err(|err| UiError::new(err.to_string()))?;

    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .map_err(|err| UiError::new(err.to_string()))?;
    if read == 0 {
        return Err(UiError::new("Cancelled."));
    }
    validate_password(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Prompts for a password. On a terminal the input is masked.
pub fn prompt_password() -> Result<String, UiError> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return read_password(&mut stdin.lock(), &mut io::stdout());
    }
    let password =
        prompt_masked_line(PASSWORD_PROMPT).map_err(|err| UiError::new(err.to_string()))?;
    validate_password(password)
}
