//! In-place editing of the secret entry fields.
//!
//! The editor owns both secret buffers. Buffers come into existence on the
//! first inserted byte, never earlier, and [`Editor::release`] wipes and
//! frees them exactly once whichever way the dialog ends.
//!
//! A field is displayed as `cursor` mask glyphs followed by blanks, so a
//! redraw only needs the old and new cursor column. Once the cursor hits
//! the right edge it jumps back towards the left so typing stays visible;
//! the length shown is therefore not the secret's length.

use crate::secmem::{AllocError, Growth, SecretBuffer, SecureAllocator};
use crate::validator;

/// Columns kept free on either side when the cursor wraps.
const WRAP_MARGIN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldId {
    Primary,
    Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    /// Append one byte of locally encoded input.
    Insert(u8),
    DeleteBackward,
    EraseLine,
    EraseWord,
}

/// What an edit did to the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditReport {
    pub field: FieldId,
    pub old_cursor: u16,
    pub new_cursor: u16,
    /// Set when this edit switched the dialog into no-echo mode.
    pub entered_no_echo: bool,
}

#[derive(Debug)]
pub struct SecretField {
    buffer: Option<SecretBuffer>,
    growth: Growth,
    max_len: usize,
    cursor: u16,
    width: u16,
}

impl SecretField {
    fn new(growth: Growth, max_len: usize, width: u16) -> Self {
        Self {
            buffer: None,
            growth,
            max_len,
            cursor: 0,
            width,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.as_ref().map_or(0, SecretBuffer::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cursor(&self) -> u16 {
        self.cursor
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    /// `None` until the first byte was typed.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.buffer.as_ref().map(SecretBuffer::as_bytes)
    }

    fn is_allocated(&self) -> bool {
        self.buffer.is_some()
    }

    fn last_col(&self) -> usize {
        usize::from(self.width.saturating_sub(1))
    }

    fn set_cursor(&mut self, col: usize) {
        self.cursor = col.min(self.last_col()) as u16;
    }

    fn insert(&mut self, alloc: &mut dyn SecureAllocator, byte: u8) -> Result<(), AllocError> {
        if byte == 0 || self.len() >= self.max_len {
            return Ok(());
        }
        if self.buffer.is_none() {
            self.buffer = Some(SecretBuffer::allocate(alloc, self.max_len, self.growth)?);
        }
        let Some(buffer) = self.buffer.as_mut() else {
            return Ok(());
        };
        if !buffer.push(alloc, byte)? {
            return Ok(());
        }
        let len = buffer.len();
        let col = usize::from(self.cursor) + 1;
        if col >= usize::from(self.width) {
            self.set_cursor(insert_wrap(self.width, self.max_len, len));
        } else {
            self.cursor = col as u16;
        }
        Ok(())
    }

    fn delete_backward(&mut self) -> bool {
        let Some(buffer) = self.buffer.as_mut().filter(|b| !b.is_empty()) else {
            return false;
        };
        buffer.truncate(buffer.len() - 1);
        let len = buffer.len();
        let col = self.cursor.saturating_sub(1);
        if col == 0 && len > 0 {
            self.set_cursor(delete_wrap(self.width, len));
        } else {
            self.cursor = col;
        }
        true
    }

    fn erase_line(&mut self) {
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.clear();
        }
        self.cursor = 0;
    }

    fn erase_word(&mut self) {
        let Some(buffer) = self.buffer.as_mut() else {
            return;
        };
        let bytes = buffer.as_bytes();
        let mut keep = bytes.len();
        while keep > 0 && bytes[keep - 1] == b' ' {
            keep -= 1;
        }
        while keep > 0 && bytes[keep - 1] != b' ' {
            keep -= 1;
        }

        let width = usize::from(self.width);
        let mut col = usize::from(self.cursor);
        // one byte at a time, clamping against the length left so far
        for len in (keep..buffer.len()).rev() {
            col = match col.checked_sub(1) {
                Some(c) => c,
                None => width.saturating_sub(1).min(len),
            };
        }
        buffer.truncate(keep);
        self.set_cursor(col);
    }

    fn release(&mut self, alloc: &mut dyn SecureAllocator) {
        if let Some(buffer) = self.buffer.take() {
            buffer.release(alloc);
        }
        self.cursor = 0;
    }
}

/// Cursor column after an insert pushed it onto the right edge.
pub fn insert_wrap(width: u16, max_len: usize, len: usize) -> usize {
    let remaining = max_len.saturating_add(1).saturating_sub(len);
    usize::from(width).saturating_sub(remaining).max(WRAP_MARGIN)
}

/// Cursor column after a delete pulled it onto the left edge.
pub fn delete_wrap(width: u16, len: usize) -> usize {
    usize::from(width).saturating_sub(WRAP_MARGIN).min(len)
}

/// Both secret fields plus the dialog-wide input flags.
#[derive(Debug)]
pub struct Editor {
    primary: SecretField,
    confirm: Option<SecretField>,
    got_input: bool,
    no_echo: bool,
}

impl Editor {
    /// The primary buffer is sized for `max_len` at once; the confirmation
    /// buffer grows as the user types.
    pub fn new(max_len: usize, primary_width: u16, confirm_width: Option<u16>) -> Self {
        Self {
            primary: SecretField::new(Growth::Presized, max_len, primary_width),
            confirm: confirm_width.map(|w| SecretField::new(Growth::OnDemand, max_len, w)),
            got_input: false,
            no_echo: false,
        }
    }

    pub fn field(&self, id: FieldId) -> Option<&SecretField> {
        match id {
            FieldId::Primary => Some(&self.primary),
            FieldId::Confirm => self.confirm.as_ref(),
        }
    }

    fn field_mut(&mut self, id: FieldId) -> Option<&mut SecretField> {
        match id {
            FieldId::Primary => Some(&mut self.primary),
            FieldId::Confirm => self.confirm.as_mut(),
        }
    }

    pub fn primary(&self) -> &SecretField {
        &self.primary
    }

    pub fn has_confirm(&self) -> bool {
        self.confirm.is_some()
    }

    pub fn no_echo(&self) -> bool {
        self.no_echo
    }

    pub fn got_input(&self) -> bool {
        self.got_input
    }

    /// Record a keystroke that did not edit anything (a refresh).
    pub fn mark_input(&mut self) {
        self.got_input = true;
    }

    pub fn is_allocated(&self) -> bool {
        self.primary.is_allocated() || self.confirm.as_ref().is_some_and(SecretField::is_allocated)
    }

    /// Whether the two entries agree (always true without a confirmation
    /// field).
    pub fn matches(&self) -> bool {
        validator::matches(
            self.confirm.is_some(),
            self.primary.bytes(),
            self.confirm.as_ref().and_then(SecretField::bytes),
        )
    }

    /// Apply one edit. On allocation failure both buffers are wiped and
    /// released before the error is returned.
    pub fn apply(
        &mut self,
        id: FieldId,
        edit: Edit,
        alloc: &mut dyn SecureAllocator,
    ) -> Result<EditReport, AllocError> {
        let first_input = !self.got_input;
        let Some(field) = self.field_mut(id) else {
            return Ok(EditReport {
                field: id,
                old_cursor: 0,
                new_cursor: 0,
                entered_no_echo: false,
            });
        };
        let old_cursor = field.cursor;
        let mut entered_no_echo = false;
        match edit {
            Edit::Insert(byte) => {
                if let Err(err) = field.insert(alloc, byte) {
                    self.release(alloc);
                    return Err(err);
                }
            }
            Edit::DeleteBackward => {
                if !field.delete_backward() && first_input {
                    entered_no_echo = true;
                }
            }
            Edit::EraseLine => field.erase_line(),
            Edit::EraseWord => field.erase_word(),
        }
        let new_cursor = field.cursor;
        self.got_input = true;
        if entered_no_echo {
            self.no_echo = true;
        }
        Ok(EditReport {
            field: id,
            old_cursor,
            new_cursor,
            entered_no_echo,
        })
    }

    /// Insert a whole encoded character, or nothing when it does not fit.
    pub fn insert_char(
        &mut self,
        id: FieldId,
        encoded: &[u8],
        alloc: &mut dyn SecureAllocator,
    ) -> Result<Option<EditReport>, AllocError> {
        let Some(field) = self.field(id) else {
            return Ok(None);
        };
        if encoded.is_empty() || field.len() + encoded.len() > field.max_len {
            self.got_input = true;
            return Ok(None);
        }
        let old_cursor = field.cursor;
        let mut report = None;
        for byte in encoded {
            report = Some(self.apply(id, Edit::Insert(*byte), alloc)?);
        }
        Ok(report.map(|r| EditReport { old_cursor, ..r }))
    }

    /// Adopt new field widths after a terminal resize.
    pub fn resize(&mut self, primary_width: u16, confirm_width: Option<u16>) {
        self.primary.width = primary_width;
        let col = usize::from(self.primary.cursor);
        self.primary.set_cursor(col);
        if let (Some(field), Some(width)) = (self.confirm.as_mut(), confirm_width) {
            field.width = width;
            let col = usize::from(field.cursor);
            field.set_cursor(col);
        }
    }

    /// Move the primary secret out of the editor. The confirmation buffer
    /// is wiped and released.
    pub fn take_primary(&mut self, alloc: &mut dyn SecureAllocator) -> Option<SecretBuffer> {
        if let Some(confirm) = self.confirm.as_mut() {
            confirm.release(alloc);
        }
        self.primary.cursor = 0;
        self.primary.buffer.take()
    }

    /// Wipe and free every buffer. Safe to call more than once.
    pub fn release(&mut self, alloc: &mut dyn SecureAllocator) {
        self.primary.release(alloc);
        if let Some(confirm) = self.confirm.as_mut() {
            confirm.release(alloc);
        }
    }
}
