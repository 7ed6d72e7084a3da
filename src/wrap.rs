//! Greedy word wrap for dialog text.
//!
//! [`LineWrapper`] walks a private copy of the text and yields one
//! [`WrappedLine`] at a time. Lines never reach `max_width` display
//! columns; a line that would overflow is broken at its last space, which
//! becomes a forced (soft) break.

use unicode_width::UnicodeWidthChar;

/// Why a wrapped line ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnd {
    /// An explicit `\n` in the text.
    Newline,
    /// A space replaced by a line break to fit the width.
    Forced,
    /// The width ran out inside a word with no earlier space.
    Cut,
    /// End of text.
    End,
}

impl LineEnd {
    /// The text this line end stands for in the original string.
    pub fn terminator(self) -> &'static str {
        match self {
            LineEnd::Newline => "\n",
            LineEnd::Forced => " ",
            LineEnd::Cut | LineEnd::End => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedLine {
    pub text: String,
    /// Display columns used by `text`.
    pub width: usize,
    /// Spaces skipped before `text`.
    pub leading: usize,
    pub end: LineEnd,
}

pub fn char_width(ch: char) -> usize {
    ch.width().unwrap_or(0)
}

pub fn str_width(text: &str) -> usize {
    text.chars().map(char_width).sum()
}

/// Measure the next line of `text` starting at char offset `offset`.
///
/// Returns `(line_width, consumed)` where `consumed` counts every char
/// the line used up, including skipped spaces and its terminator.
pub fn wrap_next(text: &[char], offset: usize, max_width: usize) -> (usize, usize) {
    let step = scan(text, offset, max_width);
    (step.width, step.consumed())
}

struct Step {
    leading: usize,
    len: usize,
    width: usize,
    end: LineEnd,
}

impl Step {
    fn consumed(&self) -> usize {
        let terminator = match self.end {
            LineEnd::Newline | LineEnd::Forced => 1,
            LineEnd::Cut | LineEnd::End => 0,
        };
        self.leading + self.len + terminator
    }
}

fn scan(text: &[char], offset: usize, max_width: usize) -> Step {
    let rest = text.get(offset..).unwrap_or_default();
    let leading = rest.iter().take_while(|c| **c == ' ').count();
    let line = &rest[leading..];
    let limit = max_width.saturating_sub(1);

    let mut width = 0;
    let mut len = 0;
    let mut last_space = None;
    while let Some(&ch) = line.get(len) {
        if ch == '\n' {
            break;
        }
        let w = char_width(ch);
        if width + w > limit && len > 0 {
            break;
        }
        if ch == ' ' {
            last_space = Some(len);
        }
        width += w;
        len += 1;
        if width >= limit {
            break;
        }
    }

    let end = match line.get(len) {
        None => LineEnd::End,
        Some('\n') => LineEnd::Newline,
        Some(_) => match last_space {
            Some(space) if space > 0 => {
                len = space;
                width = line[..len].iter().copied().map(char_width).sum();
                LineEnd::Forced
            }
            _ => LineEnd::Cut,
        },
    };

    Step {
        leading,
        len,
        width,
        end,
    }
}

/// Lazy line sequence over an owned copy of the text. Restartable only
/// by building a new wrapper.
#[derive(Debug, Clone)]
pub struct LineWrapper {
    chars: Vec<char>,
    offset: usize,
    max_width: usize,
    done: bool,
}

impl LineWrapper {
    pub fn new(text: &str, max_width: usize) -> Self {
        Self {
            chars: text.chars().collect(),
            offset: 0,
            max_width,
            done: false,
        }
    }
}

impl Iterator for LineWrapper {
    type Item = WrappedLine;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let step = scan(&self.chars, self.offset, self.max_width);
        let start = self.offset + step.leading;
        let text: String = self.chars[start..start + step.len].iter().collect();
        self.offset += step.consumed();
        if step.end == LineEnd::End {
            self.done = true;
        }
        Some(WrappedLine {
            text,
            width: step.width,
            leading: step.leading,
            end: step.end,
        })
    }
}

/// Wrap `text` into lines narrower than `max_width` columns.
pub fn wrap(text: &str, max_width: usize) -> Vec<WrappedLine> {
    LineWrapper::new(text, max_width).collect()
}
