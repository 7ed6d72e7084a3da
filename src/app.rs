use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{debug, error};

use crate::config::{self, AlertMode, DialogRequest, PinColor};
use crate::dialog::{Dialog, Outcome, Reply};
use crate::error::DialogError;
use crate::governor::Governor;
use crate::input::CrosstermKeys;
use crate::locale;
use crate::quality::HeuristicMeter;
use crate::render::{Palette, Renderer};
use crate::secmem::{SecureAllocator, ZeroizingAllocator};
use crate::terminal::TerminalSession;
use crate::touch::touch_file;

pub const EXIT_NOT_OK: u8 = 1;
pub const EXIT_CANCELED: u8 = 2;
pub const EXIT_ERROR: u8 = 3;

/// Filter directives for the log file.
pub const LOG_ENV: &str = "PINENTRY_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorRole {
    Fg,
    Alert,
    Ok,
    QualityBar,
}

/// Terminal PIN and passphrase dialog.
///
/// Prints the secret followed by a newline on stdout. Exit status is 0 on
/// OK, 1 for the "not OK" button, 2 when canceled or timed out and 3 on
/// errors.
#[derive(Parser, Debug, Default)]
#[command(name = "pinentry-term")]
#[command(version)]
pub struct Args {
    /// JSON request file [default: <config dir>/pinentry-term/config.json if present]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Append logs to this file; PINENTRY_LOG holds filter directives
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Print the reply as JSON on stderr
    #[arg(long)]
    pub json: bool,

    /// Ask a yes/no question instead of collecting a secret
    #[arg(long)]
    pub confirm: bool,

    #[arg(long)]
    pub max_len: Option<usize>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub prompt: Option<String>,

    #[arg(long)]
    pub error: Option<String>,

    /// OK button label; `_` marks the mnemonic
    #[arg(long)]
    pub ok: Option<String>,

    #[arg(long)]
    pub default_ok: Option<String>,

    #[arg(long)]
    pub cancel: Option<String>,

    #[arg(long)]
    pub default_cancel: Option<String>,

    /// Adds a third "not OK" button
    #[arg(long)]
    pub notok: Option<String>,

    #[arg(long)]
    pub one_button: bool,

    /// Prompt of the confirmation field; enables re-entry
    #[arg(long)]
    pub repeat: Option<String>,

    #[arg(long)]
    pub repeat_error: Option<String>,

    #[arg(long)]
    pub repeat_ok: Option<String>,

    /// Locale of the terminal [default: LC_ALL, LC_CTYPE or LANG]
    #[arg(long)]
    pub lc_ctype: Option<String>,

    #[arg(long, value_enum)]
    pub color_fg: Option<PinColor>,

    #[arg(long, value_enum)]
    pub color_bg: Option<PinColor>,

    #[arg(long, value_enum)]
    pub color_alert: Option<PinColor>,

    #[arg(long, value_enum)]
    pub color_ok: Option<PinColor>,

    #[arg(long, value_enum)]
    pub color_quality_bar: Option<PinColor>,

    /// Draw a color role bold; may be repeated
    #[arg(long, value_enum)]
    pub bright: Vec<ColorRole>,

    /// Never use colors
    #[arg(long)]
    pub no_color: bool,

    #[arg(long)]
    pub ttyname: Option<PathBuf>,

    #[arg(long)]
    pub ttytype: Option<String>,

    /// Give up after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// File whose mtime is bumped after the dialog closes
    #[arg(long)]
    pub touch_file: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub alert: Option<AlertMode>,
}

impl Args {
    /// Layer the command line over a request loaded from file.
    pub fn apply(&self, mut request: DialogRequest) -> DialogRequest {
        fn set<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }

        if self.confirm {
            request.collect_secret = false;
        }
        if let Some(max_len) = self.max_len {
            request.max_len = max_len;
        }
        set(&mut request.description, &self.description);
        set(&mut request.prompt, &self.prompt);
        set(&mut request.error, &self.error);
        set(&mut request.ok, &self.ok);
        set(&mut request.default_ok, &self.default_ok);
        set(&mut request.cancel, &self.cancel);
        set(&mut request.default_cancel, &self.default_cancel);
        set(&mut request.notok, &self.notok);
        request.one_button |= self.one_button;
        set(&mut request.repeat_prompt, &self.repeat);
        set(&mut request.repeat_error, &self.repeat_error);
        set(&mut request.repeat_ok, &self.repeat_ok);
        set(&mut request.locale, &self.lc_ctype);
        set(&mut request.tty_name, &self.ttyname);
        set(&mut request.tty_type, &self.ttytype);
        set(&mut request.timeout_secs, &self.timeout);
        set(&mut request.touch_file, &self.touch_file);
        set(&mut request.alert, &self.alert);

        let colors = &mut request.colors;
        for (slot, value) in [
            (&mut colors.fg, self.color_fg),
            (&mut colors.bg, self.color_bg),
            (&mut colors.alert, self.color_alert),
            (&mut colors.ok, self.color_ok),
            (&mut colors.quality_bar, self.color_quality_bar),
        ] {
            if let Some(value) = value {
                *slot = value;
            }
        }
        for role in &self.bright {
            match role {
                ColorRole::Fg => colors.fg_bright = true,
                ColorRole::Alert => colors.alert_bright = true,
                ColorRole::Ok => colors.ok_bright = true,
                ColorRole::QualityBar => colors.quality_bar_bright = true,
            }
        }
        request
    }
}

/// Install a file logger. Without a log file nothing is installed: the
/// dialog owns the terminal, so logs never go to stderr.
pub fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let Some(path) = log_file else {
        return Ok(());
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;
    Ok(())
}

pub fn run() -> Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.log_file.as_deref())?;

    let from_file = config::load_config(args.config.as_deref()).context("Failed to load request")?;
    let mut request = args.apply(from_file.unwrap_or_default());
    if request.locale.is_none() {
        request.locale = locale::locale_from_env();
    }
    debug!(
        confirm = request.confirm_mode(),
        max_len = request.max_len,
        "request assembled"
    );

    let use_colors = !args.no_color && crossterm::style::available_color_count() >= 8;
    let mut alloc = ZeroizingAllocator;
    let result = show_dialog(&request, use_colors, &mut alloc);
    if let Some(path) = &request.touch_file {
        touch_file(path);
    }

    let reply = Reply::from_result(request.confirm_mode(), &result);
    if args.json {
        eprintln!("{}", serde_json::to_string(&reply)?);
    }

    let code = match result {
        Ok(Outcome::Secret(secret)) => {
            let written = write_secret(secret.expose());
            secret.release(&mut alloc);
            written?;
            ExitCode::SUCCESS
        }
        Ok(Outcome::Confirmed) => ExitCode::SUCCESS,
        Ok(Outcome::NotOk) => ExitCode::from(EXIT_NOT_OK),
        Ok(Outcome::Canceled) => ExitCode::from(EXIT_CANCELED),
        Err(err) if err.is_cancellation() => ExitCode::from(EXIT_CANCELED),
        Err(err) => {
            eprintln!("pinentry-term: {err}");
            ExitCode::from(EXIT_ERROR)
        }
    };
    Ok(code)
}

fn write_secret(secret: &[u8]) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(secret)?;
    stdout.write_all(b"\n")?;
    stdout.flush()
}

fn show_dialog(
    request: &DialogRequest,
    use_colors: bool,
    alloc: &mut dyn SecureAllocator,
) -> Result<Outcome, DialogError> {
    let mut session = TerminalSession::open(request.tty_name.as_deref())?;
    if let Some(tty_type) = &request.tty_type {
        debug!(tty_type, "terminal type is detected by crossterm, hint not used");
    }
    if let Some(mode) = request.alert {
        if let Err(err) = session.alert(mode) {
            debug!(error = %err, "alert not delivered");
        }
    }

    let mut renderer = Renderer::new(session.backend()?, Palette::new(&request.colors, use_colors))?;
    let governor = Governor::arm(request.timeout());
    let mut meter = HeuristicMeter;
    let result =
        Dialog::new(request, alloc, &mut meter).run(&mut renderer, &mut CrosstermKeys, &governor);
    session.restore();

    if let Err(DialogError::FatalAllocation(err)) = &result {
        error!(error = %err, "aborting after secure allocation failure");
        std::process::abort();
    }
    result
}
