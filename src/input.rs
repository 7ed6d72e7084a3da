use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// Keys the dialog reacts to, independent of the terminal library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Char(char),
    /// A control chord, lowercase letter (`Ctrl('u')`).
    Ctrl(char),
    Enter,
    Backspace,
    AltBackspace,
    Tab,
    BackTab,
    Left,
    Right,
    Up,
    Down,
    Esc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Key(KeyInput),
    Resize,
}

pub trait KeySource {
    /// Wait at most `timeout` for the next input. `Ok(None)` when nothing
    /// arrived in time.
    fn poll_input(&mut self, timeout: Duration) -> io::Result<Option<Input>>;
}

/// Translate a crossterm key event. Releases and repeats are dropped.
pub fn translate_key(key: KeyEvent) -> Option<KeyInput> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);
    let input = match key.code {
        KeyCode::Char(c) if ctrl => KeyInput::Ctrl(c.to_ascii_lowercase()),
        KeyCode::Char(c) => KeyInput::Char(c),
        KeyCode::Enter => KeyInput::Enter,
        KeyCode::Backspace if alt => KeyInput::AltBackspace,
        KeyCode::Backspace => KeyInput::Backspace,
        KeyCode::Tab => KeyInput::Tab,
        KeyCode::BackTab => KeyInput::BackTab,
        KeyCode::Left => KeyInput::Left,
        KeyCode::Right => KeyInput::Right,
        KeyCode::Up => KeyInput::Up,
        KeyCode::Down => KeyInput::Down,
        KeyCode::Esc => KeyInput::Esc,
        _ => return None,
    };
    Some(input)
}

/// Live keyboard through crossterm's event queue.
#[derive(Debug, Default)]
pub struct CrosstermKeys;

impl KeySource for CrosstermKeys {
    fn poll_input(&mut self, timeout: Duration) -> io::Result<Option<Input>> {
        if !event::poll(timeout)? {
            return Ok(None);
        }
        Ok(match event::read()? {
            Event::Key(key) => translate_key(key).map(Input::Key),
            Event::Resize(..) => Some(Input::Resize),
            _ => None,
        })
    }
}

/// Replays a fixed sequence of inputs, then behaves like an idle
/// keyboard.
#[derive(Debug, Default, Clone)]
pub struct ScriptedKeys {
    queue: VecDeque<Input>,
}

impl ScriptedKeys {
    pub fn new(inputs: impl IntoIterator<Item = Input>) -> Self {
        Self {
            queue: inputs.into_iter().collect(),
        }
    }

    pub fn typed(text: &str) -> Self {
        Self::new(text.chars().map(|c| Input::Key(KeyInput::Char(c))))
    }

    pub fn then(mut self, key: KeyInput) -> Self {
        self.queue.push_back(Input::Key(key));
        self
    }

    pub fn then_typed(mut self, text: &str) -> Self {
        self.queue
            .extend(text.chars().map(|c| Input::Key(KeyInput::Char(c))));
        self
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl KeySource for ScriptedKeys {
    fn poll_input(&mut self, timeout: Duration) -> io::Result<Option<Input>> {
        match self.queue.pop_front() {
            Some(input) => Ok(Some(input)),
            None => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}
