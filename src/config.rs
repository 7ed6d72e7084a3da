//! The dialog request and its on-disk form.
//!
//! A request can be read from a JSON file (by default
//! `<config dir>/pinentry-term/config.json`) and is then overridden field
//! by field from the command line.

use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use ratatui::style::{Color, Modifier, Style};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_DIR: &str = "pinentry-term";
pub const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_MAX_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid request file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PinColor {
    /// Role disabled; the alert role falls back to reverse video.
    None,
    #[default]
    Default,
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

impl PinColor {
    pub fn to_color(self) -> Color {
        match self {
            PinColor::None | PinColor::Default => Color::Reset,
            PinColor::Black => Color::Black,
            PinColor::Red => Color::Red,
            PinColor::Green => Color::Green,
            PinColor::Yellow => Color::Yellow,
            PinColor::Blue => Color::Blue,
            PinColor::Magenta => Color::Magenta,
            PinColor::Cyan => Color::Cyan,
            PinColor::White => Color::Gray,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AlertMode {
    Beep,
    Flash,
}

/// Colors per role. `bright` maps to bold, as on a classic terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorScheme {
    pub fg: PinColor,
    pub fg_bright: bool,
    pub bg: PinColor,
    pub alert: PinColor,
    pub alert_bright: bool,
    pub ok: PinColor,
    pub ok_bright: bool,
    pub quality_bar: PinColor,
    pub quality_bar_bright: bool,
}

impl ColorScheme {
    /// Replace `default` roles with their stock colors.
    pub fn resolved(mut self) -> Self {
        if self.alert == PinColor::Default {
            self.alert = PinColor::Red;
            self.alert_bright = true;
        }
        if self.ok == PinColor::Default {
            self.ok = PinColor::Green;
            self.ok_bright = true;
        }
        if self.quality_bar == PinColor::Default {
            self.quality_bar = PinColor::Cyan;
            self.quality_bar_bright = false;
        }
        self
    }

    pub fn style(&self, fg: PinColor, bright: bool) -> Style {
        let style = Style::default().fg(fg.to_color()).bg(self.bg.to_color());
        if bright {
            style.add_modifier(Modifier::BOLD)
        } else {
            style
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogRequest {
    /// Upper bound on the secret, in bytes of the local encoding.
    pub max_len: usize,
    /// False for a pure yes/no confirmation.
    pub collect_secret: bool,
    pub description: Option<String>,
    pub prompt: Option<String>,
    pub error: Option<String>,
    pub ok: Option<String>,
    pub default_ok: Option<String>,
    pub cancel: Option<String>,
    pub default_cancel: Option<String>,
    pub notok: Option<String>,
    pub one_button: bool,
    pub repeat_prompt: Option<String>,
    pub repeat_error: Option<String>,
    pub repeat_ok: Option<String>,
    pub locale: Option<String>,
    pub colors: ColorScheme,
    pub tty_name: Option<PathBuf>,
    pub tty_type: Option<String>,
    /// Seconds; zero or absent waits forever.
    pub timeout_secs: Option<u64>,
    pub touch_file: Option<PathBuf>,
    pub alert: Option<AlertMode>,
}

impl Default for DialogRequest {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_LEN,
            collect_secret: true,
            description: None,
            prompt: None,
            error: None,
            ok: None,
            default_ok: None,
            cancel: None,
            default_cancel: None,
            notok: None,
            one_button: false,
            repeat_prompt: None,
            repeat_error: None,
            repeat_ok: None,
            locale: None,
            colors: ColorScheme::default(),
            tty_name: None,
            tty_type: None,
            timeout_secs: None,
            touch_file: None,
            alert: None,
        }
    }
}

impl DialogRequest {
    pub fn confirm_mode(&self) -> bool {
        !self.collect_secret
    }

    pub fn timeout(&self) -> Option<std::time::Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0)
            .map(std::time::Duration::from_secs)
    }

    /// Reject requests no dialog could serve.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collect_secret && self.max_len == 0 {
            return Err(ConfigError::Invalid("maximum secret length must be positive"));
        }
        if !self.collect_secret && self.repeat_prompt.is_some() {
            return Err(ConfigError::Invalid(
                "a repeat prompt needs a secret to repeat",
            ));
        }
        Ok(())
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

pub fn load_request(path: &Path) -> Result<DialogRequest, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the request file at `explicit`, or the default location if it
/// exists. A missing default file is not an error.
pub fn load_config(explicit: Option<&Path>) -> Result<Option<DialogRequest>, ConfigError> {
    if let Some(path) = explicit {
        return load_request(path).map(Some);
    }
    match config_path() {
        Some(path) if path.exists() => load_request(&path).map(Some),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"prompt": "PIN:", "timeout_secs": 30, "colors": {{"alert": "magenta"}}}}"#
        )
        .unwrap();
        let req = load_request(file.path()).unwrap();
        assert_eq!(req.prompt.as_deref(), Some("PIN:"));
        assert_eq!(req.max_len, DEFAULT_MAX_LEN);
        assert!(req.collect_secret);
        assert_eq!(req.colors.alert, PinColor::Magenta);
        assert_eq!(req.colors.ok, PinColor::Default);
        assert_eq!(req.timeout(), Some(std::time::Duration::from_secs(30)));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = load_request(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("absent.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn stock_colors_fill_defaults() {
        let scheme = ColorScheme::default().resolved();
        assert_eq!(scheme.alert, PinColor::Red);
        assert!(scheme.alert_bright);
        assert_eq!(scheme.ok, PinColor::Green);
        assert_eq!(scheme.quality_bar, PinColor::Cyan);
        assert!(!scheme.quality_bar_bright);

        let custom = ColorScheme {
            alert: PinColor::None,
            ..Default::default()
        }
        .resolved();
        assert_eq!(custom.alert, PinColor::None);
    }

    #[test]
    fn validation_rejects_impossible_requests() {
        let req = DialogRequest {
            max_len: 0,
            ..Default::default()
        };
        assert!(req.validate().is_err());
        let req = DialogRequest {
            collect_secret: false,
            repeat_prompt: Some("Again:".into()),
            ..Default::default()
        };
        assert!(req.validate().is_err());
        assert!(DialogRequest::default().validate().is_ok());
    }

    #[test]
    fn zero_timeout_waits_forever() {
        let req = DialogRequest {
            timeout_secs: Some(0),
            ..Default::default()
        };
        assert_eq!(req.timeout(), None);
    }
}
