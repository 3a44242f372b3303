use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{self, ClearType},
};
use std::io::{self, Write};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Space or Enter.
    Capture,
    /// Esc.
    Cancel,
    /// `q`.
    Quit,
}

/// Puts the terminal in raw mode until dropped.
pub struct RawMode;

impl RawMode {
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            tracing::warn!("Failed to restore terminal: {}", e);
        }
    }
}

/// Waits up to `timeout` for a key we care about.
pub fn poll_key(timeout: Duration) -> io::Result<Option<Key>> {
    if !event::poll(timeout)? {
        return Ok(None);
    }

    if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
        if kind == KeyEventKind::Release {
            return Ok(None);
        }
        return Ok(map_key(code));
    }
    Ok(None)
}

fn map_key(code: KeyCode) -> Option<Key> {
    match code {
        KeyCode::Char(' ') | KeyCode::Enter => Some(Key::Capture),
        KeyCode::Esc => Some(Key::Cancel),
        KeyCode::Char('q') | KeyCode::Char('Q') => Some(Key::Quit),
        _ => None,
    }
}

/// Esc or `q`, without blocking.
pub fn check_for_stop() -> io::Result<bool> {
    Ok(matches!(poll_key(Duration::ZERO)?, Some(Key::Cancel | Key::Quit)))
}

pub fn clear_screen() -> io::Result<()> {
    crossterm::execute!(
        io::stdout(),
        terminal::Clear(ClearType::All),
        cursor::MoveTo(0, 0)
    )?;
    io::stdout().flush()
}

/// `println!` emits a bare `\n`, which raw mode does not return on.
pub fn print_line(text: &str) {
    print!("{}\r\n", text);
    if let Err(e) = io::stdout().flush() {
        tracing::debug!("Failed to flush stdout: {}", e);
    }
}
