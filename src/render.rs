//! Cell-level drawing of the dialog.
//!
//! The renderer writes straight to a ratatui [`Backend`] instead of going
//! through `Terminal::draw`, so a keystroke only touches the cells it
//! changed. Cursor moves and visibility changes are recorded and only
//! sent in [`Renderer::flush`], since crossterm flushes on each of them.

use std::io;

use ratatui::backend::Backend;
use ratatui::buffer::Cell;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::symbols;

use crate::config::{ColorScheme, PinColor};
use crate::geometry::{ButtonSlot, FieldArea, Geometry};
use crate::nav::Position;
use crate::validator::MatchState;
use crate::wrap::char_width;

pub const MASK_FILLED: char = '*';
pub const MASK_EMPTY: char = '_';
pub const NO_ECHO_MARKER: &str = "[no echo]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub base: Style,
    pub alert: Style,
    pub success: Style,
    pub quality: Style,
}

impl Palette {
    /// Without color support, or with the alert role set to `none`, both
    /// banner roles fall back to reverse video.
    pub fn new(scheme: &ColorScheme, use_colors: bool) -> Self {
        let scheme = scheme.resolved();
        if !use_colors {
            let reverse = Style::default().add_modifier(Modifier::REVERSED);
            return Self {
                base: Style::default(),
                alert: reverse,
                success: reverse,
                quality: Style::default(),
            };
        }
        let base = scheme.style(scheme.fg, scheme.fg_bright);
        let (alert, success) = if scheme.alert == PinColor::None {
            let reverse = base.add_modifier(Modifier::REVERSED);
            (reverse, reverse)
        } else {
            (
                scheme.style(scheme.alert, scheme.alert_bright),
                scheme.style(scheme.ok, scheme.ok_bright),
            )
        };
        Self {
            base,
            alert,
            success,
            quality: scheme.style(scheme.quality_bar, scheme.quality_bar_bright),
        }
    }

    pub fn monochrome() -> Self {
        Self::new(&ColorScheme::default(), false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paint {
    Neutral,
    Alert,
    Success,
}

/// The banner text currently selected and how to paint it. An empty
/// `lines` clears the banner rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub lines: Vec<String>,
    pub paint: Paint,
}

impl Banner {
    /// Pick the banner text for a match state. `None` when the dialog has
    /// no banner rows.
    pub fn select(geo: &Geometry, state: MatchState) -> Option<Self> {
        geo.banner?;
        let [error, repeat_error, repeat_ok] = &geo.banner_lines;
        let (lines, paint) = match state {
            MatchState::Initial | MatchState::Match if !repeat_ok.is_empty() => {
                (repeat_ok, Paint::Success)
            }
            MatchState::Mismatch if !repeat_error.is_empty() => (repeat_error, Paint::Alert),
            _ if !error.is_empty() => (error, Paint::Alert),
            _ => {
                return Some(Self {
                    lines: Vec::new(),
                    paint: Paint::Neutral,
                });
            }
        };
        Some(Self {
            lines: lines.clone(),
            paint,
        })
    }
}

/// Everything a full redraw needs besides the geometry.
#[derive(Debug, Clone)]
pub struct Scene<'a> {
    pub banner: Option<&'a Banner>,
    pub primary_cursor: u16,
    pub confirm_cursor: u16,
    pub no_echo: bool,
    pub quality: Option<u8>,
    pub focus: Position,
}

/// Where the terminal cursor should be and whether it is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CursorState {
    x: u16,
    y: u16,
    visible: bool,
}

pub struct Renderer<B: Backend> {
    backend: B,
    palette: Palette,
    bounds: Rect,
    cursor: CursorState,
    /// What the terminal was last told; `None` forces a resend.
    shown: Option<CursorState>,
}

impl<B: Backend> Renderer<B> {
    pub fn new(backend: B, palette: Palette) -> io::Result<Self> {
        let bounds = backend.size()?;
        Ok(Self {
            backend,
            palette,
            bounds,
            cursor: CursorState {
                x: 0,
                y: 0,
                visible: false,
            },
            shown: None,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn size(&mut self) -> io::Result<Rect> {
        self.bounds = self.backend.size()?;
        Ok(self.bounds)
    }

    /// Send the pending cursor state, then flush the backend. The only
    /// place output is pushed to the terminal.
    pub fn flush(&mut self) -> io::Result<()> {
        let want = self.cursor;
        let shown = self.shown;
        let visibility_changed = shown.is_none_or(|s| s.visible != want.visible);
        if visibility_changed && !want.visible {
            self.backend.hide_cursor()?;
        }
        if shown.is_none_or(|s| (s.x, s.y) != (want.x, want.y)) {
            self.backend.set_cursor(want.x, want.y)?;
        }
        if visibility_changed && want.visible {
            self.backend.show_cursor()?;
        }
        self.shown = Some(want);
        self.backend.flush()
    }

    fn push_str(&self, cells: &mut Vec<(u16, u16, Cell)>, x: u16, y: u16, text: &str, style: Style) -> u16 {
        let mut col = x;
        for ch in text.chars() {
            let w = char_width(ch) as u16;
            if w == 0 {
                continue;
            }
            if col + w <= self.bounds.right() && y < self.bounds.bottom() {
                let mut cell = Cell::default();
                cell.set_symbol(ch.encode_utf8(&mut [0; 4])).set_style(style);
                cells.push((col, y, cell));
            }
            col += w;
        }
        col - x
    }

    fn push_run(&self, cells: &mut Vec<(u16, u16, Cell)>, x: u16, y: u16, len: u16, symbol: &str, style: Style) {
        for col in x..x.saturating_add(len) {
            if col < self.bounds.right() && y < self.bounds.bottom() {
                let mut cell = Cell::default();
                cell.set_symbol(symbol).set_style(style);
                cells.push((col, y, cell));
            }
        }
    }

    fn commit(&mut self, cells: Vec<(u16, u16, Cell)>) -> io::Result<()> {
        self.backend.draw(cells.iter().map(|(x, y, cell)| (*x, *y, cell)))
    }

    fn park(&mut self, x: u16, y: u16, visible: bool) {
        self.cursor = CursorState { x, y, visible };
    }

    /// Reconstruct the whole screen.
    pub fn draw_all(&mut self, geo: &Geometry, scene: &Scene<'_>) -> io::Result<()> {
        let base = self.palette.base;
        let area = geo.area;
        let mut cells = Vec::new();

        // blank cells instead of Backend::clear, which flushes on its own
        let screen = self.bounds;
        for y in screen.top()..screen.bottom() {
            self.push_run(&mut cells, screen.x, y, screen.width, " ", Style::default());
        }
        for y in area.top()..area.bottom() {
            self.push_run(&mut cells, area.x, y, area.width, " ", base);
        }
        let (left, right) = (area.left(), area.right() - 1);
        let (top, bottom) = (area.top(), area.bottom() - 1);
        self.push_run(&mut cells, left + 1, top, area.width - 2, symbols::line::HORIZONTAL, base);
        self.push_run(&mut cells, left + 1, bottom, area.width - 2, symbols::line::HORIZONTAL, base);
        for y in top + 1..bottom {
            self.push_run(&mut cells, left, y, 1, symbols::line::VERTICAL, base);
            self.push_run(&mut cells, right, y, 1, symbols::line::VERTICAL, base);
        }
        self.push_run(&mut cells, left, top, 1, symbols::line::TOP_LEFT, base);
        self.push_run(&mut cells, right, top, 1, symbols::line::TOP_RIGHT, base);
        self.push_run(&mut cells, left, bottom, 1, symbols::line::BOTTOM_LEFT, base);
        self.push_run(&mut cells, right, bottom, 1, symbols::line::BOTTOM_RIGHT, base);

        for (row, line) in geo.description.iter().enumerate() {
            self.push_str(&mut cells, area.x + 2, area.y + 1 + row as u16, line, base);
        }

        for (field, cursor) in [(&geo.primary, scene.primary_cursor), (&geo.confirm, scene.confirm_cursor)] {
            let Some(field) = field else { continue };
            self.push_str(&mut cells, field.label_x, field.y, &field.label, base);
            self.push_field(&mut cells, field, cursor);
            if scene.no_echo {
                self.push_no_echo(&mut cells, field);
            }
        }

        if let Some(meter) = geo.quality_box {
            let (l, r) = (meter.left(), meter.right() - 1);
            let (t, b) = (meter.top(), meter.bottom() - 1);
            let inner = meter.width.saturating_sub(2);
            self.push_run(&mut cells, l, t, 1, symbols::line::TOP_LEFT, base);
            self.push_run(&mut cells, l + 1, t, inner, symbols::line::HORIZONTAL, base);
            self.push_run(&mut cells, r, t, 1, symbols::line::TOP_RIGHT, base);
            self.push_run(&mut cells, l, t + 1, 1, symbols::line::VERTICAL, base);
            self.push_run(&mut cells, r, t + 1, 1, symbols::line::VERTICAL, base);
            self.push_run(&mut cells, l, b, 1, symbols::line::BOTTOM_LEFT, base);
            self.push_run(&mut cells, l + 1, b, inner, symbols::line::HORIZONTAL, base);
            self.push_run(&mut cells, r, b, 1, symbols::line::BOTTOM_RIGHT, base);
        }

        for slot in buttons(geo) {
            self.push_str(&mut cells, slot.x, slot.y, &slot.label, base);
        }
        self.commit(cells)?;

        self.draw_banner(geo, scene.banner)?;
        if scene.quality.is_some() {
            self.draw_quality(geo, scene.quality)?;
        }
        self.shown = None;
        self.enter(geo, scene.focus, scene.primary_cursor, scene.confirm_cursor, scene.no_echo)
    }

    /// Clear the banner rows and paint the selected text.
    pub fn draw_banner(&mut self, geo: &Geometry, banner: Option<&Banner>) -> io::Result<()> {
        let (Some(rows), Some(banner)) = (geo.banner, banner) else {
            return Ok(());
        };
        let base = self.palette.base;
        let style = match banner.paint {
            Paint::Neutral => base,
            Paint::Alert => self.palette.alert,
            Paint::Success => self.palette.success,
        };
        let mut cells = Vec::new();
        for row in 0..rows.height {
            self.push_run(&mut cells, rows.x, rows.y + row, rows.width, " ", base);
        }
        let text_x = rows.x + 1;
        let text_w = rows.width.saturating_sub(1);
        for (row, line) in banner.lines.iter().take(usize::from(rows.height)).enumerate() {
            let y = rows.y + row as u16;
            let used = self.push_str(&mut cells, text_x, y, clip(line, text_w), style);
            self.push_run(&mut cells, text_x + used, y, text_w.saturating_sub(used), " ", style);
        }
        self.commit(cells)
    }

    fn push_field(&self, cells: &mut Vec<(u16, u16, Cell)>, field: &FieldArea, cursor: u16) {
        let base = self.palette.base;
        let filled = cursor.min(field.width);
        self.push_run(cells, field.x, field.y, filled, "*", base);
        self.push_run(cells, field.x + filled, field.y, field.width - filled, "_", base);
    }

    fn push_no_echo(&self, cells: &mut Vec<(u16, u16, Cell)>, field: &FieldArea) {
        self.push_str(cells, field.x, field.y, clip(NO_ECHO_MARKER, field.width), self.palette.base);
    }

    /// Repaint only the cells between the old and new cursor column, then
    /// park the cursor.
    pub fn draw_field_delta(&mut self, field: &FieldArea, old: u16, new: u16) -> io::Result<()> {
        let base = self.palette.base;
        let mut cells = Vec::new();
        if old < new {
            self.push_run(&mut cells, field.x + old, field.y, new - old, "*", base);
        } else if old > new {
            self.push_run(&mut cells, field.x + new, field.y, old - new, "_", base);
        }
        self.commit(cells)?;
        self.park(field.x + new, field.y, self.cursor.visible);
        Ok(())
    }

    pub fn draw_no_echo(&mut self, field: &FieldArea) -> io::Result<()> {
        let mut cells = Vec::new();
        self.push_no_echo(&mut cells, field);
        self.commit(cells)
    }

    /// Blank the meter, then draw `percent` of it as blocks with the
    /// percentage centered on top. `None` leaves the meter untouched.
    pub fn draw_quality(&mut self, geo: &Geometry, percent: Option<u8>) -> io::Result<()> {
        let (Some(bar), Some(percent)) = (geo.quality_bar(), percent) else {
            return Ok(());
        };
        let percent = percent.min(100);
        let base = self.palette.base;
        let mut cells = Vec::new();
        self.push_run(&mut cells, bar.x, bar.y, bar.width, " ", base);
        let filled = (u32::from(percent) * u32::from(bar.width) / 100) as u16;
        self.push_run(&mut cells, bar.x, bar.y, filled, symbols::block::FULL, self.palette.quality);
        let label = format!("{percent}%");
        let label_x = bar.x + (bar.width / 2).saturating_sub(label.len() as u16 / 2);
        self.push_str(&mut cells, label_x, bar.y, &label, base);
        self.commit(cells)
    }

    pub fn draw_button(&mut self, slot: &ButtonSlot, highlighted: bool) -> io::Result<()> {
        let style = if highlighted {
            self.palette.base.add_modifier(Modifier::REVERSED)
        } else {
            self.palette.base
        };
        let mut cells = Vec::new();
        self.push_str(&mut cells, slot.x, slot.y, &slot.label, style);
        self.commit(cells)
    }

    /// Undo the highlight of the position being left.
    pub fn leave(&mut self, geo: &Geometry, from: Position) -> io::Result<()> {
        match button_at(geo, from) {
            Some(slot) => self.draw_button(slot, false),
            None => Ok(()),
        }
    }

    /// Show the focus at `to`: a visible cursor in a secret field, a
    /// highlighted label on a button.
    pub fn enter(
        &mut self,
        geo: &Geometry,
        to: Position,
        primary_cursor: u16,
        confirm_cursor: u16,
        no_echo: bool,
    ) -> io::Result<()> {
        match to {
            Position::PrimarySecret => {
                if let Some(field) = &geo.primary {
                    self.park(field.x + primary_cursor, field.y, true);
                }
            }
            Position::ConfirmSecret => {
                if let Some(field) = &geo.confirm {
                    if no_echo {
                        self.draw_no_echo(field)?;
                    }
                    self.park(field.x + confirm_cursor, field.y, true);
                }
            }
            Position::Ok | Position::NotOk | Position::Cancel => {
                if let Some(slot) = button_at(geo, to) {
                    self.draw_button(slot, true)?;
                    self.park(slot.x, slot.y, false);
                }
            }
            Position::None => self.cursor.visible = false,
        }
        Ok(())
    }

    /// Leave the terminal with a visible cursor once flushed.
    pub fn restore_cursor(&mut self) {
        self.shown = None;
        self.cursor.visible = true;
    }
}

fn buttons(geo: &Geometry) -> impl Iterator<Item = &ButtonSlot> {
    std::iter::once(&geo.ok)
        .chain(geo.not_ok.as_ref())
        .chain(geo.cancel.as_ref())
}

fn button_at(geo: &Geometry, pos: Position) -> Option<&ButtonSlot> {
    match pos {
        Position::Ok => Some(&geo.ok),
        Position::NotOk => geo.not_ok.as_ref(),
        Position::Cancel => geo.cancel.as_ref(),
        _ => None,
    }
}

/// Longest prefix of `text` that fits in `width` columns.
fn clip(text: &str, width: u16) -> &str {
    let mut used = 0;
    for (idx, ch) in text.char_indices() {
        used += char_width(ch);
        if used > usize::from(width) {
            return &text[..idx];
        }
    }
    text
}
