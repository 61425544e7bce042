use std::io::{self, IsTerminal, Write};

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    style::Print,
    terminal::{self, ClearType},
    ExecutableCommand, QueueableCommand,
};

use crate::core::config::DEFAULT_NAME;
use crate::core::config_flow::UserInput;

/// RAII guard that restores terminal state on drop (even on panic).
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = io::stdout().execute(cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

/// Edit state for one text field.
#[derive(Debug, Default)]
struct LineBuffer {
    text: String,
}

enum KeyOutcome {
    Continue,
    Submit,
    Cancel,
}

impl LineBuffer {
    fn with_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }

    fn apply(&mut self, code: KeyCode, modifiers: KeyModifiers) -> KeyOutcome {
        match (code, modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) | (KeyCode::Esc, _) => KeyOutcome::Cancel,
            (KeyCode::Char('u'), KeyModifiers::CONTROL) => {
                self.text.clear();
                KeyOutcome::Continue
            }
            (KeyCode::Enter, _) => KeyOutcome::Submit,
            (KeyCode::Backspace, _) => {
                self.text.pop();
                KeyOutcome::Continue
            }
            (KeyCode::Char(c), m) if !m.contains(KeyModifiers::CONTROL) => {
                self.text.push(c);
                KeyOutcome::Continue
            }
            _ => KeyOutcome::Continue,
        }
    }

    /// What the terminal shows for this field.
    fn display(&self, hidden: bool) -> String {
        if hidden {
            "*".repeat(self.text.chars().count())
        } else {
            self.text.clone()
        }
    }
}

/// Ask for the SRP credentials. `defaults` pre-fills every visible field.
///
/// Returns `Ok(Some(input))` on confirm, `Ok(None)` if not a TTY, `Err` on cancel/Ctrl-C.
pub fn credential_form(defaults: &UserInput, errors: &[String]) -> anyhow::Result<Option<UserInput>> {
    if !io::stdin().is_terminal() {
        return Ok(None);
    }

    let mut stdout = io::stdout();
    stdout.execute(Print("SRP Energy account\r\n"))?;
    for error in errors {
        stdout.execute(Print(format!("  ! {}\r\n", error)))?;
    }

    let _guard = RawModeGuard::enable()?;

    let account_id = read_field("Account ID", &defaults.account_id, false)?;
    let username = read_field("Username", &defaults.username, false)?;
    let password = read_field("Password", "", true)?;
    let name = read_field(
        "Name",
        defaults.name.as_deref().unwrap_or(DEFAULT_NAME),
        false,
    )?;
    let tou_default = if defaults.is_tou.unwrap_or(false) { "y" } else { "n" };
    let is_tou = read_field("Time-of-use plan (y/n)", tou_default, false)?;

    Ok(Some(UserInput {
        account_id: account_id.trim().to_string(),
        username: username.trim().to_string(),
        password,
        name: Some(name.trim().to_string()),
        is_tou: Some(parse_yes(&is_tou)),
    }))
}

fn read_field(label: &str, initial: &str, hidden: bool) -> anyhow::Result<String> {
    let mut buffer = LineBuffer::with_text(initial);
    draw(label, &buffer, hidden)?;

    loop {
        if let Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) = event::read()?
        {
            match buffer.apply(code, modifiers) {
                KeyOutcome::Continue => draw(label, &buffer, hidden)?,
                KeyOutcome::Submit => {
                    io::stdout().execute(Print("\r\n"))?;
                    return Ok(buffer.text);
                }
                KeyOutcome::Cancel => {
                    io::stdout().execute(Print("\r\n"))?;
                    anyhow::bail!("cancelled");
                }
            }
        }
    }
}

fn draw(label: &str, buffer: &LineBuffer, hidden: bool) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout
        .queue(cursor::MoveToColumn(0))?
        .queue(terminal::Clear(ClearType::CurrentLine))?
        .queue(Print(format!("  {:<24} {}", format!("{}:", label), buffer.display(hidden))))?;
    stdout.flush()
}

fn parse_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes" | "true" | "1")
}
