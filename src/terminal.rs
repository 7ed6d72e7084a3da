//! Ownership of the real terminal for the lifetime of one dialog.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossterm::cursor;
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::backend::CrosstermBackend;
use tracing::{debug, warn};

use crate::config::AlertMode;
use crate::error::DialogError;

const DEFAULT_TTY: &str = "/dev/tty";
const FLASH_DURATION: Duration = Duration::from_millis(100);

/// Set while a session holds the terminal.
static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Raw mode plus alternate screen on the dialog's tty, undone on drop.
#[derive(Debug)]
pub struct TerminalSession {
    tty: File,
    restored: bool,
}

impl TerminalSession {
    pub fn open(tty_name: Option<&Path>) -> Result<Self, DialogError> {
        if SESSION_ACTIVE.swap(true, Ordering::SeqCst) {
            return Err(DialogError::Io(io::Error::new(
                io::ErrorKind::ResourceBusy,
                "another dialog already owns the terminal",
            )));
        }
        let path = tty_name.unwrap_or(Path::new(DEFAULT_TTY));
        let tty = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(tty) => tty,
            Err(err) => {
                SESSION_ACTIVE.store(false, Ordering::SeqCst);
                return Err(err.into());
            }
        };
        let mut session = Self {
            tty,
            restored: false,
        };
        enable_raw_mode()?;
        execute!(session.tty, EnterAlternateScreen, cursor::Hide)?;
        debug!(tty = %path.display(), "terminal session opened");
        Ok(session)
    }

    /// Output backend writing to the session's tty. Writes are buffered
    /// until the renderer flushes.
    pub fn backend(&self) -> io::Result<CrosstermBackend<BufWriter<File>>> {
        Ok(CrosstermBackend::new(BufWriter::new(self.tty.try_clone()?)))
    }

    pub fn alert(&mut self, mode: AlertMode) -> io::Result<()> {
        match mode {
            AlertMode::Beep => self.tty.write_all(b"\x07")?,
            AlertMode::Flash => {
                self.tty.write_all(b"\x1b[?5h")?;
                self.tty.flush()?;
                thread::sleep(FLASH_DURATION);
                self.tty.write_all(b"\x1b[?5l")?;
            }
        }
        self.tty.flush()
    }

    /// Leave raw mode and the alternate screen. Runs once; later calls
    /// are no-ops.
    pub fn restore(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;
        if let Err(err) = disable_raw_mode() {
            warn!(error = %err, "cannot leave raw mode");
        }
        if let Err(err) = execute!(self.tty, LeaveAlternateScreen, cursor::Show) {
            warn!(error = %err, "cannot leave alternate screen");
        }
        SESSION_ACTIVE.store(false, Ordering::SeqCst);
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        self.restore();
    }
}
