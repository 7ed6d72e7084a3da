//! Dialog layout against the terminal size.
//!
//! All positions are absolute terminal cells. The dialog is centered; if it
//! needs more rows or columns than the terminal offers, creation fails
//! before any secret storage exists.

use ratatui::layout::Rect;

use crate::error::DialogError;
use crate::wrap::{str_width, wrap};

/// Minimum width of a secret entry field.
pub const MIN_FIELD_WIDTH: u16 = 40;

pub const STRING_OK: &str = "<OK>";
pub const STRING_NOTOK: &str = "<No>";
pub const STRING_CANCEL: &str = "<Cancel>";

/// Strip `_` mnemonic markers and bracket the label, falling back to
/// `fallback` when no label was configured.
pub fn format_button_label(raw: Option<&str>, fallback: &str) -> String {
    let Some(raw) = raw else {
        return fallback.to_string();
    };
    let mut label = String::with_capacity(raw.len() + 2);
    label.push('<');
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '_' {
            match chars.next() {
                Some(next) => label.push(next),
                None => break,
            }
        } else {
            label.push(ch);
        }
    }
    label.push('>');
    label
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl TermSize {
    /// `None` when the size is unknown (the terminal reported nothing
    /// usable).
    pub fn from_rect(area: Rect) -> Option<Self> {
        if area.width == 0 || area.height == 0 {
            None
        } else {
            Some(Self {
                cols: area.width,
                rows: area.height,
            })
        }
    }
}

/// Display strings after locale conversion. Empty strings are treated as
/// absent.
#[derive(Debug, Clone, Default)]
pub struct DialogText {
    pub description: Option<String>,
    pub prompt: Option<String>,
    pub error: Option<String>,
    pub repeat_prompt: Option<String>,
    pub repeat_error: Option<String>,
    pub repeat_ok: Option<String>,
    pub ok: String,
    pub not_ok: Option<String>,
    pub cancel: Option<String>,
    /// False for a pure confirmation dialog.
    pub collects_secret: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldArea {
    /// Prompt text, truncated to the columns it is given.
    pub label: String,
    pub label_x: u16,
    /// First cell of the masked input.
    pub x: u16,
    pub y: u16,
    pub width: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonSlot {
    pub label: String,
    pub x: u16,
    pub y: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    /// Outer frame of the dialog.
    pub area: Rect,
    pub description: Vec<String>,
    /// Banner rows; `width` covers the painted span.
    pub banner: Option<Rect>,
    /// Wrapped lines of the three banner texts, in the order error,
    /// repeat-error, repeat-ok.
    pub banner_lines: [Vec<String>; 3],
    pub primary: Option<FieldArea>,
    pub confirm: Option<FieldArea>,
    /// Outer box of the quality meter; the bar is its middle row.
    pub quality_box: Option<Rect>,
    pub ok: ButtonSlot,
    pub not_ok: Option<ButtonSlot>,
    pub cancel: Option<ButtonSlot>,
}

impl Geometry {
    pub fn quality_bar(&self) -> Option<Rect> {
        self.quality_box.map(|b| Rect::new(b.x + 1, b.y + 1, b.width.saturating_sub(2), 1))
    }

    pub fn compute(text: &DialogText, size: Option<TermSize>) -> Result<Self, DialogError> {
        let size = size.ok_or(DialogError::MissingEnvVar)?;
        let wrap_width = usize::from(size.cols.saturating_sub(4));

        let mut height: usize = 1;
        let mut description = Vec::new();
        let mut description_x = 0;
        if let Some(desc) = &text.description {
            for line in wrap(desc, wrap_width) {
                description_x = description_x.max(line.width);
                description.push(line.text);
            }
            height += description.len() + 1;
        }

        let mut banner_lines: [Vec<String>; 3] = Default::default();
        let mut banner_x = 0;
        let mut banner_height = 0;
        if text.collects_secret {
            let sources = [&text.error, &text.repeat_error, &text.repeat_ok];
            for (idx, (slot, source)) in banner_lines.iter_mut().zip(sources).enumerate() {
                // repeat texts only matter with a confirmation field
                if idx > 0 && text.repeat_prompt.is_none() {
                    continue;
                }
                if let Some(s) = source {
                    for line in wrap(s, wrap_width) {
                        banner_x = banner_x.max(line.width);
                        slot.push(line.text);
                    }
                    banner_height = banner_height.max(slot.len());
                }
            }
            if banner_height > 0 {
                height += banner_height + 1;
            }
            height += 2;
            if text.repeat_prompt.is_some() {
                height += 2;
                height += 2;
            }
        }
        height += 2;

        if height > usize::from(size.rows) {
            return Err(DialogError::WindowTooSmall);
        }

        let cap = wrap_width;
        let mut width = description_x.min(cap);
        let prompt_w = text.prompt.as_deref().map(str_width);
        let repeat_w = text.repeat_prompt.as_deref().map(str_width);
        if text.collects_secret {
            if banner_height > 0 {
                width = width.max(banner_x.min(cap));
            }
            let mut field = usize::from(MIN_FIELD_WIDTH);
            match (prompt_w, repeat_w) {
                (Some(p), r) => field += p + r.unwrap_or(0) + 1,
                (None, Some(r)) => field += r + 1,
                (None, None) => {}
            }
            width = width.max(field.min(cap));
        }
        for label in [Some(&text.ok), text.not_ok.as_ref(), text.cancel.as_ref()]
            .into_iter()
            .flatten()
        {
            width = width.max(3 * str_width(label));
        }
        width += 4;

        if width > usize::from(size.cols) {
            return Err(DialogError::WindowTooSmall);
        }

        let w = width as u16;
        let h = height as u16;
        let x0 = (size.cols - w) / 2;
        let y0 = (size.rows - h) / 2;
        let area = Rect::new(x0, y0, w, h);

        let mut y = y0 + 1;
        if !description.is_empty() {
            y += description.len() as u16 + 1;
        }

        let mut banner = None;
        let mut primary = None;
        let mut confirm = None;
        let mut quality_box = None;
        if text.collects_secret {
            if banner_height > 0 {
                banner = Some(Rect::new(x0 + 1, y, w - 3, banner_height as u16));
                y += banner_height as u16 + 1;
            }
            primary = Some(field_area(text.prompt.as_deref(), x0, y, w));
            y += 2;
            if let Some(repeat) = text.repeat_prompt.as_deref() {
                confirm = Some(field_area(Some(repeat), x0, y, w));
                y += 1;
                quality_box = Some(Rect::new(x0 + 2, y, w - 4, 3));
                y += 3;
            }
        }

        let (ok, not_ok, cancel) = place_buttons(text, x0, y, w);

        Ok(Self {
            area,
            description,
            banner,
            banner_lines,
            primary,
            confirm,
            quality_box,
            ok,
            not_ok,
            cancel,
        })
    }
}

fn field_area(prompt: Option<&str>, x0: u16, y: u16, w: u16) -> FieldArea {
    let interior = w - 4;
    let mut x = x0 + 2;
    let mut width = interior;
    let mut label = String::new();
    if let Some(prompt) = prompt {
        let room = usize::from(interior.saturating_sub(MIN_FIELD_WIDTH));
        let shown = str_width(prompt).min(room);
        let mut used = 0;
        for ch in prompt.chars() {
            let cw = crate::wrap::char_width(ch);
            if used + cw > shown {
                break;
            }
            used += cw;
            label.push(ch);
        }
        x += shown as u16 + 1;
        width -= shown as u16 + 1;
    }
    FieldArea {
        label,
        label_x: x0 + 2,
        x,
        y,
        width,
    }
}

/// Left button rounds its left edge down, the right one rounds up, the
/// middle one is centered; a lone button is centered.
fn place_buttons(
    text: &DialogText,
    x0: u16,
    y: u16,
    w: u16,
) -> (ButtonSlot, Option<ButtonSlot>, Option<ButtonSlot>) {
    let ok_w = str_width(&text.ok) as u16;
    if text.cancel.is_none() && text.not_ok.is_none() {
        let ok = ButtonSlot {
            label: text.ok.clone(),
            x: x0 + w / 2 - ok_w / 2,
            y,
        };
        return (ok, None, None);
    }

    let third = (w - 4) / 3;
    let ok = ButtonSlot {
        label: text.ok.clone(),
        x: x0 + 2 + (third - ok_w) / 2,
        y,
    };
    let not_ok = text.not_ok.as_ref().map(|label| ButtonSlot {
        label: label.clone(),
        x: x0 + w / 2 - str_width(label) as u16 / 2,
        y,
    });
    let cancel = text.cancel.as_ref().map(|label| ButtonSlot {
        label: label.clone(),
        x: x0 + w - 2 - (third + str_width(label) as u16) / 2,
        y,
    });
    (ok, not_ok, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin_text() -> DialogText {
        DialogText {
            description: Some("Please enter the passphrase for the key".into()),
            prompt: Some("PIN:".into()),
            ok: STRING_OK.into(),
            cancel: Some(STRING_CANCEL.into()),
            collects_secret: true,
            ..Default::default()
        }
    }

    fn size(cols: u16, rows: u16) -> Option<TermSize> {
        Some(TermSize { cols, rows })
    }

    #[test]
    fn button_labels_strip_mnemonics() {
        assert_eq!(format_button_label(Some("_OK"), STRING_OK), "<OK>");
        assert_eq!(format_button_label(Some("Can_cel"), STRING_CANCEL), "<Cancel>");
        assert_eq!(format_button_label(Some("a__b"), STRING_OK), "<a_b>");
        assert_eq!(format_button_label(Some("Yes_"), STRING_OK), "<Yes>");
        assert_eq!(format_button_label(None, STRING_NOTOK), "<No>");
    }

    #[test]
    fn pin_dialog_is_centered() {
        let geo = Geometry::compute(&pin_text(), size(80, 24)).unwrap();
        // frame + 1 description row + separator + pin row + separator + buttons + frame
        assert_eq!(geo.area.height, 7);
        assert_eq!(geo.area.width, 4 + 40 + 4 + 1);
        assert_eq!(geo.area.x, (80 - geo.area.width) / 2);
        assert_eq!(geo.area.y, (24 - 7) / 2);
        let field = geo.primary.as_ref().unwrap();
        assert_eq!(field.label, "PIN:");
        assert_eq!(field.x, geo.area.x + 2 + 5);
        assert_eq!(field.width, geo.area.width - 4 - 5);
        assert_eq!(geo.ok.y, geo.area.y + geo.area.height - 2);
    }

    #[test]
    fn too_few_rows_is_rejected() {
        let err = Geometry::compute(&pin_text(), size(80, 5)).unwrap_err();
        assert!(matches!(err, DialogError::WindowTooSmall));
    }

    #[test]
    fn too_few_columns_is_rejected() {
        let err = Geometry::compute(&pin_text(), size(20, 24)).unwrap_err();
        assert!(matches!(err, DialogError::WindowTooSmall));
    }

    #[test]
    fn unknown_size_is_missing_env() {
        let err = Geometry::compute(&pin_text(), None).unwrap_err();
        assert!(matches!(err, DialogError::MissingEnvVar));
    }

    #[test]
    fn repeat_mode_adds_field_and_meter() {
        let mut text = pin_text();
        text.repeat_prompt = Some("Repeat:".into());
        text.repeat_error = Some("does not match".into());
        text.repeat_ok = Some("matches".into());
        let geo = Geometry::compute(&text, size(100, 30)).unwrap();
        // base 7 + banner (1 + sep) + repeat row/meter 4
        assert_eq!(geo.area.height, 13);
        let confirm = geo.confirm.as_ref().unwrap();
        assert_eq!(confirm.y, geo.primary.as_ref().unwrap().y + 2);
        let meter = geo.quality_box.unwrap();
        assert_eq!(meter.y, confirm.y + 1);
        assert_eq!(geo.quality_bar().unwrap().width, geo.area.width - 6);
        assert_eq!(geo.banner.unwrap().height, 1);
    }

    #[test]
    fn buttons_split_the_width_in_thirds() {
        let mut text = pin_text();
        text.not_ok = Some(STRING_NOTOK.into());
        let geo = Geometry::compute(&text, size(80, 24)).unwrap();
        let x0 = geo.area.x;
        let w = geo.area.width;
        let third = (w - 4) / 3;
        assert_eq!(geo.ok.x, x0 + 2 + (third - 4) / 2);
        assert_eq!(geo.not_ok.as_ref().unwrap().x, x0 + w / 2 - 2);
        assert_eq!(geo.cancel.as_ref().unwrap().x, x0 + w - 2 - (third + 8) / 2);
        assert!(geo.ok.x + 4 < geo.not_ok.as_ref().unwrap().x);
        assert!(geo.not_ok.as_ref().unwrap().x + 4 < geo.cancel.as_ref().unwrap().x);
    }

    #[test]
    fn lone_button_is_centered() {
        let text = DialogText {
            description: Some("Done".into()),
            ok: STRING_OK.into(),
            ..Default::default()
        };
        let geo = Geometry::compute(&text, size(80, 24)).unwrap();
        assert_eq!(geo.ok.x, geo.area.x + geo.area.width / 2 - 2);
        assert!(geo.primary.is_none());
        assert!(geo.banner.is_none());
    }

    #[test]
    fn long_description_wraps_within_terminal() {
        let mut text = pin_text();
        text.description = Some("word ".repeat(40));
        let geo = Geometry::compute(&text, size(60, 24)).unwrap();
        assert!(geo.description.len() > 1);
        assert!(geo.area.width <= 60);
        assert!(geo.description.iter().all(|l| str_width(l) < 56));
    }
}
