//! One run of the PIN dialog: layout, the input loop, and tear-down.
//!
//! Every exit path (accept, cancel, timeout, interrupt, locale failure,
//! I/O error) funnels through [`Session::finish`], which wipes and
//! releases the secret buffers before anything is returned.

use std::fmt;

use ratatui::backend::Backend;
use serde::Serialize;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::DialogRequest;
use crate::editor::{Edit, EditReport, Editor, FieldId};
use crate::error::{DialogError, ErrorCode, Result};
use crate::geometry::{
    DialogText, Geometry, STRING_CANCEL, STRING_NOTOK, STRING_OK, TermSize, format_button_label,
};
use crate::governor::Governor;
use crate::input::{Input, KeyInput, KeySource};
use crate::locale::{self, Codeset, LocaleError};
use crate::nav::{Activation, Direction, NavLayout, Position};
use crate::quality::QualityMeter;
use crate::render::{Banner, Renderer, Scene};
use crate::secmem::{SecretBuffer, SecureAllocator};
use crate::validator::MatchState;

/// The collected secret, UTF-8 encoded, in memory from the dialog's
/// [`SecureAllocator`]. Wiped on drop; [`Secret::release`] also hands the
/// storage back.
pub struct Secret(SecretBuffer);

impl Secret {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn release(self, alloc: &mut dyn SecureAllocator) {
        self.0.release(alloc);
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({} bytes)", self.0.len())
    }
}

#[derive(Debug)]
pub enum Outcome {
    Secret(Secret),
    /// OK in a confirmation dialog.
    Confirmed,
    NotOk,
    Canceled,
}

/// What the daemon gets back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reply {
    /// Secret length, or 1/0 for a confirmation; -1 when nothing was
    /// collected.
    pub status: i64,
    pub canceled: bool,
    pub error: Option<ErrorCode>,
}

impl Reply {
    pub fn from_result(confirm_mode: bool, result: &Result<Outcome>) -> Self {
        let failed = if confirm_mode { 0 } else { -1 };
        match result {
            Ok(Outcome::Secret(secret)) => Self {
                status: secret.len() as i64,
                canceled: false,
                error: None,
            },
            Ok(Outcome::Confirmed) => Self {
                status: 1,
                canceled: false,
                error: None,
            },
            Ok(Outcome::NotOk) => Self {
                status: failed,
                canceled: false,
                error: None,
            },
            Ok(Outcome::Canceled) => Self {
                status: failed,
                canceled: true,
                error: None,
            },
            Err(err) => Self {
                status: failed,
                canceled: err.is_cancellation(),
                error: Some(err.code()),
            },
        }
    }
}

pub struct Dialog<'a> {
    request: &'a DialogRequest,
    alloc: &'a mut dyn SecureAllocator,
    quality: &'a mut dyn QualityMeter,
}

impl<'a> Dialog<'a> {
    pub fn new(
        request: &'a DialogRequest,
        alloc: &'a mut dyn SecureAllocator,
        quality: &'a mut dyn QualityMeter,
    ) -> Self {
        Self {
            request,
            alloc,
            quality,
        }
    }

    /// Show the dialog on `renderer` and run it to completion.
    pub fn run<B: Backend, K: KeySource>(
        self,
        renderer: &mut Renderer<B>,
        keys: &mut K,
        governor: &Governor,
    ) -> Result<Outcome> {
        let request = self.request;
        request
            .validate()
            .map_err(|err| DialogError::Config(err.to_string()))?;
        let text = dialog_text(request)?;
        let codeset = request
            .locale
            .as_deref()
            .map(Codeset::resolve)
            .transpose()
            .map_err(|err| DialogError::locale("input_codeset", err))?
            .unwrap_or(Codeset::Utf8);

        let size = TermSize::from_rect(renderer.size()?);
        let geo = Geometry::compute(&text, size)?;
        info!(
            confirm = request.confirm_mode(),
            repeat = text.repeat_prompt.is_some(),
            width = geo.area.width,
            height = geo.area.height,
            "dialog opened"
        );

        let editor = geo.primary.as_ref().map(|primary| {
            Editor::new(
                request.max_len,
                primary.width,
                geo.confirm.as_ref().map(|c| c.width),
            )
        });
        let nav = NavLayout {
            secret: editor.is_some(),
            confirm: geo.confirm.is_some(),
            not_ok: geo.not_ok.is_some(),
            cancel: geo.cancel.is_some(),
        };
        let mut session = Session {
            request,
            alloc: self.alloc,
            quality: self.quality,
            renderer,
            codeset,
            text,
            pos: nav.initial(),
            nav,
            geo,
            editor,
            banner_state: MatchState::Initial,
        };
        let done = session.open().and_then(|()| session.event_loop(keys, governor));
        session.finish(done)
    }
}

/// Locale-convert every label the dialog shows.
fn dialog_text(request: &DialogRequest) -> Result<DialogText> {
    let locale = request.locale.as_deref();
    let convert = |text: Option<&str>| -> Result<Option<String>> {
        text.map(|t| locale::display_text(t, locale))
            .transpose()
            .map_err(|err| DialogError::locale("dialog_create_copy", err))
    };
    let button = |raw: Option<&str>, fallback: &str| -> Result<String> {
        locale::display_text(&format_button_label(raw, fallback), locale)
            .map_err(|err| DialogError::locale("dialog_create_utf8conv", err))
    };

    let secret = request.collect_secret;
    let repeat_prompt = if secret {
        convert(request.repeat_prompt.as_deref())?
    } else {
        None
    };
    let repeating = repeat_prompt.is_some();
    Ok(DialogText {
        description: convert(request.description.as_deref())?,
        prompt: convert(request.prompt.as_deref())?,
        error: convert(non_empty(&request.error))?,
        repeat_error: if repeating {
            convert(non_empty(&request.repeat_error))?
        } else {
            None
        },
        repeat_ok: if repeating {
            convert(non_empty(&request.repeat_ok))?
        } else {
            None
        },
        repeat_prompt,
        ok: button(request.ok.as_deref().or(request.default_ok.as_deref()), STRING_OK)?,
        not_ok: match (&request.notok, request.one_button) {
            (Some(raw), false) => Some(button(Some(raw.as_str()), STRING_NOTOK)?),
            _ => None,
        },
        cancel: if request.one_button {
            None
        } else {
            Some(button(
                request.cancel.as_deref().or(request.default_cancel.as_deref()),
                STRING_CANCEL,
            )?)
        },
        collects_secret: secret,
    })
}

fn non_empty(text: &Option<String>) -> Option<&str> {
    text.as_deref().filter(|t| !t.is_empty())
}

/// How the input loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Done {
    Accept,
    NotOk,
    Cancel,
}

struct Session<'a, 'r, B: Backend> {
    request: &'a DialogRequest,
    alloc: &'a mut dyn SecureAllocator,
    quality: &'a mut dyn QualityMeter,
    renderer: &'r mut Renderer<B>,
    codeset: Codeset,
    text: DialogText,
    geo: Geometry,
    editor: Option<Editor>,
    nav: NavLayout,
    pos: Position,
    banner_state: MatchState,
}

impl<B: Backend> Session<'_, '_, B> {
    fn open(&mut self) -> Result<()> {
        self.redraw()?;
        self.renderer.flush()?;
        Ok(())
    }

    fn event_loop<K: KeySource>(&mut self, keys: &mut K, governor: &Governor) -> Result<Done> {
        loop {
            let input = keys.poll_input(governor.next_wait())?;
            governor.check()?;
            let Some(input) = input else {
                continue;
            };
            let done = match input {
                Input::Key(key) => self.handle_key(key, governor)?,
                Input::Resize => {
                    self.resize()?;
                    None
                }
            };
            self.renderer.flush()?;
            if let Some(done) = done {
                return Ok(done);
            }
        }
    }

    fn handle_key(&mut self, key: KeyInput, governor: &Governor) -> Result<Option<Done>> {
        match key {
            KeyInput::Esc | KeyInput::Ctrl('e') => return Ok(Some(Done::Cancel)),
            KeyInput::Ctrl('c') => {
                debug!("interrupt key");
                governor.interrupt();
            }
            KeyInput::Ctrl('l') => {
                if let Some(editor) = self.editor.as_mut() {
                    editor.mark_input();
                }
                self.redraw()?;
            }
            KeyInput::Tab | KeyInput::Right | KeyInput::Down => self.navigate(Direction::Forward)?,
            KeyInput::BackTab | KeyInput::Left | KeyInput::Up => {
                self.navigate(Direction::Backward)?
            }
            KeyInput::Enter => return self.activate(),
            KeyInput::Backspace | KeyInput::Ctrl('h') => self.edit(Edit::DeleteBackward)?,
            KeyInput::Ctrl('u') => self.edit(Edit::EraseLine)?,
            KeyInput::Ctrl('w') | KeyInput::AltBackspace => self.edit(Edit::EraseWord)?,
            KeyInput::Char(ch) => self.type_char(ch)?,
            KeyInput::Ctrl(_) => {}
        }
        Ok(None)
    }

    fn focused_field(&self) -> Option<FieldId> {
        match self.pos {
            Position::PrimarySecret => Some(FieldId::Primary),
            Position::ConfirmSecret => Some(FieldId::Confirm),
            _ => None,
        }
    }

    fn matches(&self) -> bool {
        self.editor.as_ref().is_none_or(Editor::matches)
    }

    /// Compare the entries and repaint the banner for the result.
    fn validate(&mut self) -> Result<bool> {
        let matches = self.matches();
        self.banner_state = MatchState::from(matches);
        let banner = Banner::select(&self.geo, self.banner_state);
        self.renderer.draw_banner(&self.geo, banner.as_ref())?;
        Ok(matches)
    }

    fn cursors(&self) -> (u16, u16, bool) {
        let Some(editor) = self.editor.as_ref() else {
            return (0, 0, false);
        };
        let confirm = editor.field(FieldId::Confirm).map_or(0, |f| f.cursor());
        (editor.primary().cursor(), confirm, editor.no_echo())
    }

    fn park_cursor(&mut self) -> Result<()> {
        let (primary, confirm, no_echo) = self.cursors();
        self.renderer
            .enter(&self.geo, self.pos, primary, confirm, no_echo)?;
        Ok(())
    }

    fn navigate(&mut self, dir: Direction) -> Result<()> {
        let gated = matches!(
            (self.pos, dir),
            (Position::ConfirmSecret, Direction::Forward) | (Position::Cancel, Direction::Backward)
        );
        let matches = if gated { self.validate()? } else { self.matches() };
        let next = self.nav.step(self.pos, dir, matches);
        if next == self.pos {
            return Ok(());
        }
        self.renderer.leave(&self.geo, self.pos)?;
        self.pos = next;
        self.park_cursor()
    }

    fn activate(&mut self) -> Result<Option<Done>> {
        let matches = match self.pos {
            Position::PrimarySecret | Position::ConfirmSecret | Position::Ok => {
                let matches = self.validate()?;
                self.park_cursor()?;
                matches
            }
            _ => true,
        };
        Ok(match self.nav.accept(self.pos, matches) {
            Activation::Accept => Some(Done::Accept),
            Activation::NotOk => Some(Done::NotOk),
            Activation::Cancel => Some(Done::Cancel),
            Activation::NoOp => None,
        })
    }

    fn type_char(&mut self, ch: char) -> Result<()> {
        let Some(field) = self.focused_field() else {
            return Ok(());
        };
        let mut encoded = Zeroizing::new(Vec::with_capacity(4));
        if !self.codeset.encode_char(ch, &mut encoded) {
            debug!(codeset = %self.codeset, "dropped key not representable in codeset");
            return Ok(());
        }
        let Some(editor) = self.editor.as_mut() else {
            return Ok(());
        };
        let report = editor.insert_char(field, &encoded, &mut *self.alloc)?;
        match report {
            Some(report) => self.after_edit(report),
            None => Ok(()),
        }
    }

    fn edit(&mut self, edit: Edit) -> Result<()> {
        let Some(field) = self.focused_field() else {
            return Ok(());
        };
        let Some(editor) = self.editor.as_mut() else {
            return Ok(());
        };
        let report = editor.apply(field, edit, &mut *self.alloc)?;
        self.after_edit(report)
    }

    fn after_edit(&mut self, report: EditReport) -> Result<()> {
        let Some(editor) = self.editor.as_ref() else {
            return Ok(());
        };
        let area = match report.field {
            FieldId::Primary => self.geo.primary.clone(),
            FieldId::Confirm => self.geo.confirm.clone(),
        };
        if let Some(area) = area {
            if report.entered_no_echo {
                self.renderer.draw_no_echo(&area)?;
            } else if !editor.no_echo() {
                self.renderer
                    .draw_field_delta(&area, report.old_cursor, report.new_cursor)?;
            }
        }
        if editor.has_confirm() {
            self.validate()?;
            if report.field == FieldId::Primary {
                let reading = self.quality_reading();
                self.renderer.draw_quality(&self.geo, reading)?;
            }
        }
        self.park_cursor()
    }

    fn quality_reading(&mut self) -> Option<u8> {
        self.geo.quality_box?;
        let editor = self.editor.as_ref()?;
        let secret = editor.primary().bytes().unwrap_or_default();
        self.quality.quality(secret).map(|q| q.min(100))
    }

    fn redraw(&mut self) -> Result<()> {
        let banner = Banner::select(&self.geo, self.banner_state);
        let (primary_cursor, confirm_cursor, no_echo) = self.cursors();
        let touched = self.editor.as_ref().is_some_and(Editor::is_allocated);
        let quality = if touched { self.quality_reading() } else { None };
        let scene = Scene {
            banner: banner.as_ref(),
            primary_cursor,
            confirm_cursor,
            no_echo,
            quality,
            focus: self.pos,
        };
        self.renderer.draw_all(&self.geo, &scene)?;
        Ok(())
    }

    /// Re-layout for a new terminal size. When the dialog no longer fits
    /// the previous layout stays in place.
    fn resize(&mut self) -> Result<()> {
        let size = TermSize::from_rect(self.renderer.size()?);
        match Geometry::compute(&self.text, size) {
            Ok(geo) => {
                debug!(width = geo.area.width, height = geo.area.height, "dialog re-laid out");
                if let (Some(editor), Some(primary)) = (self.editor.as_mut(), geo.primary.as_ref())
                {
                    editor.resize(primary.width, geo.confirm.as_ref().map(|c| c.width));
                }
                self.geo = geo;
            }
            Err(err) => warn!(error = %err, "terminal resized below dialog size, keeping layout"),
        }
        self.redraw()
    }

    fn take_secret(&mut self) -> Result<Secret> {
        let buffer = self
            .editor
            .as_mut()
            .and_then(|editor| editor.take_primary(&mut *self.alloc));
        let local = buffer.as_ref().map_or(&[][..], SecretBuffer::as_bytes);
        let converted =
            locale::to_interchange(local, self.request.locale.as_deref(), &mut *self.alloc);
        if let Some(buffer) = buffer {
            buffer.release(&mut *self.alloc);
        }
        converted.map(Secret).map_err(|err| match err {
            LocaleError::Alloc(err) => DialogError::FatalAllocation(err),
            err => DialogError::locale("pin_to_interchange", err),
        })
    }

    fn finish(&mut self, done: Result<Done>) -> Result<Outcome> {
        let outcome = match done {
            Ok(Done::Accept) if self.editor.is_some() => self.take_secret().map(Outcome::Secret),
            Ok(Done::Accept) => Ok(Outcome::Confirmed),
            Ok(Done::NotOk) => Ok(Outcome::NotOk),
            Ok(Done::Cancel) => Ok(Outcome::Canceled),
            Err(err) => Err(err),
        };
        if let Some(editor) = self.editor.as_mut() {
            editor.release(&mut *self.alloc);
        }
        self.renderer.restore_cursor();
        if let Err(err) = self.renderer.flush() {
            debug!(error = %err, "cursor restore failed");
        }
        match &outcome {
            Ok(outcome) => debug!(outcome = outcome_name(outcome), "dialog closed"),
            Err(err) => info!(error = %err, "dialog failed"),
        }
        outcome
    }
}

fn outcome_name(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Secret(_) => "secret",
        Outcome::Confirmed => "confirmed",
        Outcome::NotOk => "not_ok",
        Outcome::Canceled => "canceled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::NoQuality;
    use crate::secmem::ZeroizingAllocator;

    fn secret(bytes: &[u8]) -> Secret {
        let mut alloc = ZeroizingAllocator;
        let mut buf =
            SecretBuffer::allocate(&mut alloc, bytes.len(), crate::secmem::Growth::Presized).unwrap();
        for b in bytes {
            buf.push(&mut alloc, *b).unwrap();
        }
        Secret(buf)
    }

    #[test]
    fn reply_carries_secret_length() {
        let reply = Reply::from_result(false, &Ok(Outcome::Secret(secret(b"hunter2"))));
        assert_eq!(reply.status, 7);
        assert!(!reply.canceled);
    }

    #[test]
    fn confirm_mode_cancel_is_zero_not_error() {
        let reply = Reply::from_result(true, &Ok(Outcome::Canceled));
        assert_eq!(reply.status, 0);
        assert!(reply.canceled);
        assert_eq!(reply.error, None);
        assert_eq!(Reply::from_result(true, &Ok(Outcome::Confirmed)).status, 1);
    }

    #[test]
    fn timeout_is_a_canceled_error() {
        let reply = Reply::from_result(false, &Err(DialogError::Timeout));
        assert_eq!(reply.status, -1);
        assert!(reply.canceled);
        assert_eq!(reply.error, Some(ErrorCode::Timeout));
        let reply = Reply::from_result(false, &Err(DialogError::WindowTooSmall));
        assert!(!reply.canceled);
    }

    #[test]
    fn secret_debug_is_redacted() {
        assert_eq!(format!("{:?}", secret(b"hunter2")), "Secret(7 bytes)");
    }

    #[test]
    fn labels_follow_request() {
        let request = DialogRequest {
            ok: Some("_Unlock".into()),
            default_cancel: Some("_Abort".into()),
            notok: Some("_Skip".into()),
            error: Some(String::new()),
            repeat_error: Some("mismatch".into()),
            ..Default::default()
        };
        let text = dialog_text(&request).unwrap();
        assert_eq!(text.ok, "<Unlock>");
        assert_eq!(text.cancel.as_deref(), Some("<Abort>"));
        assert_eq!(text.not_ok.as_deref(), Some("<Skip>"));
        assert_eq!(text.error, None);
        // no repeat prompt, so repeat texts are dropped
        assert_eq!(text.repeat_error, None);
    }

    #[test]
    fn one_button_drops_cancel_and_notok() {
        let request = DialogRequest {
            one_button: true,
            notok: Some("No".into()),
            collect_secret: false,
            ..Default::default()
        };
        let text = dialog_text(&request).unwrap();
        assert!(text.cancel.is_none());
        assert!(text.not_ok.is_none());
    }

    #[test]
    fn unconvertible_label_is_a_locale_problem() {
        let request = DialogRequest {
            description: Some("日本".into()),
            locale: Some("C".into()),
            ..Default::default()
        };
        let err = dialog_text(&request).unwrap_err();
        assert_eq!(err.code(), ErrorCode::LocaleProblem);
    }

    #[test]
    fn invalid_request_fails_before_drawing() {
        let request = DialogRequest {
            max_len: 0,
            ..Default::default()
        };
        let backend = ratatui::backend::TestBackend::new(80, 24);
        let mut renderer = Renderer::new(backend, crate::render::Palette::monochrome()).unwrap();
        let mut keys = crate::input::ScriptedKeys::default();
        let governor = Governor::unarmed(None);
        let mut alloc = ZeroizingAllocator;
        let mut quality = NoQuality;
        let result = Dialog::new(&request, &mut alloc, &mut quality).run(
            &mut renderer,
            &mut keys,
            &governor,
        );
        assert!(matches!(result, Err(DialogError::Config(_))));
    }
}
