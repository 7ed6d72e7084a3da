use std::time::Duration;

use pinentry_term::config::DialogRequest;
use pinentry_term::dialog::{Dialog, Outcome, Reply};
use pinentry_term::error::{DialogError, Result};
use pinentry_term::governor::Governor;
use pinentry_term::input::{KeyInput, ScriptedKeys};
use pinentry_term::quality::HeuristicMeter;
use pinentry_term::render::{Palette, Renderer};
use pinentry_term::secmem::{AllocError, SecureAllocator, ZeroizingAllocator};
use ratatui::backend::TestBackend;

/// Counts allocations and keeps every buffer handed back so tests can
/// check it was wiped.
#[derive(Default)]
struct RecordingAllocator {
    allocs: usize,
    sizes: Vec<usize>,
    freed: Vec<Vec<u8>>,
}

impl RecordingAllocator {
    fn assert_all_wiped(&self) {
        assert_eq!(self.allocs, self.freed.len(), "every buffer must be freed");
        for buf in &self.freed {
            assert!(buf.iter().all(|b| *b == 0), "freed buffer not wiped");
        }
    }
}

impl SecureAllocator for RecordingAllocator {
    fn alloc(&mut self, len: usize) -> std::result::Result<Vec<u8>, AllocError> {
        self.allocs += 1;
        self.sizes.push(len);
        Ok(vec![0; len])
    }

    fn realloc(&mut self, buf: &mut Vec<u8>, len: usize) -> std::result::Result<(), AllocError> {
        ZeroizingAllocator.realloc(buf, len)
    }

    fn free(&mut self, buf: Vec<u8>) {
        self.freed.push(buf);
    }
}

/// Hands out buffers but refuses to grow any of them.
#[derive(Default)]
struct NoGrowthAllocator {
    inner: RecordingAllocator,
}

impl SecureAllocator for NoGrowthAllocator {
    fn alloc(&mut self, len: usize) -> std::result::Result<Vec<u8>, AllocError> {
        self.inner.alloc(len)
    }

    fn realloc(&mut self, _buf: &mut Vec<u8>, len: usize) -> std::result::Result<(), AllocError> {
        Err(AllocError(len))
    }

    fn free(&mut self, buf: Vec<u8>) {
        self.inner.free(buf);
    }
}

struct Harness {
    renderer: Renderer<TestBackend>,
    alloc: RecordingAllocator,
}

impl Harness {
    fn new(cols: u16, rows: u16) -> Self {
        Self {
            renderer: Renderer::new(TestBackend::new(cols, rows), Palette::monochrome()).unwrap(),
            alloc: RecordingAllocator::default(),
        }
    }

    fn run(&mut self, request: &DialogRequest, mut keys: ScriptedKeys, governor: &Governor) -> Result<Outcome> {
        let mut quality = HeuristicMeter;
        Dialog::new(request, &mut self.alloc, &mut quality).run(&mut self.renderer, &mut keys, governor)
    }

    fn screen(&self) -> Vec<String> {
        let buf = self.renderer.backend().buffer();
        (0..buf.area.height)
            .map(|y| (0..buf.area.width).map(|x| buf.get(x, y).symbol()).collect())
            .collect()
    }

    fn shows(&self, text: &str) -> bool {
        self.screen().iter().any(|row| row.contains(text))
    }
}

fn pin_request() -> DialogRequest {
    DialogRequest {
        description: Some("Please enter the PIN for card 0001".into()),
        prompt: Some("PIN:".into()),
        ..Default::default()
    }
}

fn repeat_request() -> DialogRequest {
    DialogRequest {
        repeat_prompt: Some("Repeat:".into()),
        repeat_error: Some("PINs do not match".into()),
        repeat_ok: Some("PINs match".into()),
        ..pin_request()
    }
}

/// Copy the secret out and hand its buffer back to the allocator.
fn expect_secret(alloc: &mut RecordingAllocator, result: Result<Outcome>) -> Vec<u8> {
    match result {
        Ok(Outcome::Secret(secret)) => {
            let bytes = secret.expose().to_vec();
            secret.release(alloc);
            bytes
        }
        other => panic!("expected a secret, got {other:?}"),
    }
}

#[test]
fn full_field_drops_extra_keys() {
    let mut harness = Harness::new(80, 24);
    let request = DialogRequest {
        max_len: 8,
        ..pin_request()
    };
    let keys = ScriptedKeys::typed("abcdefghij")
        .then(KeyInput::Backspace)
        .then_typed("X")
        .then(KeyInput::Enter);
    let result = harness.run(&request, keys, &Governor::unarmed(None));
    let secret = expect_secret(&mut harness.alloc, result);
    assert_eq!(secret, b"abcdefgX");
    assert!(harness.shows("********_"));
    harness.alloc.assert_all_wiped();
}

#[test]
fn editing_keys_shape_the_secret() {
    let mut harness = Harness::new(80, 24);
    let keys = ScriptedKeys::typed("old words")
        .then(KeyInput::Ctrl('u'))
        .then_typed("correct horse")
        .then(KeyInput::Ctrl('w'))
        .then(KeyInput::Enter);
    let result = harness.run(&pin_request(), keys, &Governor::unarmed(None));
    let secret = expect_secret(&mut harness.alloc, result);
    assert_eq!(secret, b"correct ");
    harness.alloc.assert_all_wiped();
}

#[test]
fn matching_entries_are_accepted() {
    let mut harness = Harness::new(80, 24);
    let keys = ScriptedKeys::typed("hunter2")
        .then(KeyInput::Tab)
        .then_typed("hunter2")
        .then(KeyInput::Enter);
    let result = harness.run(&repeat_request(), keys, &Governor::unarmed(None));
    let secret = expect_secret(&mut harness.alloc, result);
    assert_eq!(secret, b"hunter2");
    assert!(harness.shows("PINs match"));
    harness.alloc.assert_all_wiped();
}

#[test]
fn mismatched_entries_block_accept() {
    let mut harness = Harness::new(80, 24);
    let keys = ScriptedKeys::typed("hunter2")
        .then(KeyInput::Tab)
        .then_typed("hunter3")
        .then(KeyInput::Enter)
        .then(KeyInput::Esc);
    let result = harness.run(&repeat_request(), keys, &Governor::unarmed(None));
    assert!(matches!(result, Ok(Outcome::Canceled)));
    assert!(harness.shows("PINs do not match"));
    harness.alloc.assert_all_wiped();
}

#[test]
fn cancel_button_cancels() {
    let mut harness = Harness::new(80, 24);
    let keys = ScriptedKeys::typed("1234")
        .then(KeyInput::Tab)
        .then(KeyInput::Tab)
        .then(KeyInput::Enter);
    let result = harness.run(&pin_request(), keys, &Governor::unarmed(None));
    assert!(matches!(result, Ok(Outcome::Canceled)));
    harness.alloc.assert_all_wiped();
}

#[test]
fn confirmation_dialog_has_no_field() {
    let mut harness = Harness::new(80, 24);
    let request = DialogRequest {
        collect_secret: false,
        description: Some("Trust this key?".into()),
        notok: Some("_No".into()),
        ..Default::default()
    };
    let result = harness.run(&request, ScriptedKeys::default().then(KeyInput::Enter), &Governor::unarmed(None));
    assert!(matches!(result, Ok(Outcome::Confirmed)));

    let keys = ScriptedKeys::default().then(KeyInput::Tab).then(KeyInput::Enter);
    let result = harness.run(&request, keys, &Governor::unarmed(None));
    assert!(matches!(result, Ok(Outcome::NotOk)));
    assert_eq!(harness.alloc.allocs, 0);
}

#[test]
fn tiny_terminal_is_rejected_before_allocating() {
    let mut harness = Harness::new(80, 5);
    let keys = ScriptedKeys::typed("1234").then(KeyInput::Enter);
    let result = harness.run(&pin_request(), keys, &Governor::unarmed(None));
    assert!(matches!(result, Err(DialogError::WindowTooSmall)));
    assert_eq!(harness.alloc.allocs, 0);
}

#[test]
fn timeout_wipes_partial_entry() {
    let mut harness = Harness::new(80, 24);
    let governor = Governor::unarmed(Some(Duration::from_millis(150)));
    let keys = ScriptedKeys::typed("half a pass");
    let result = harness.run(&pin_request(), keys, &governor);
    assert!(matches!(result, Err(DialogError::Timeout)));
    assert_eq!(harness.alloc.allocs, 1);
    harness.alloc.assert_all_wiped();
}

#[test]
fn interrupt_key_cancels_fully() {
    let mut harness = Harness::new(80, 24);
    let keys = ScriptedKeys::typed("1234").then(KeyInput::Ctrl('c'));
    let result = harness.run(&pin_request(), keys, &Governor::unarmed(None));
    let err = result.unwrap_err();
    assert!(matches!(err, DialogError::FullyCanceled));
    assert!(err.is_cancellation());
    harness.alloc.assert_all_wiped();
}

#[test]
fn backspace_on_empty_field_turns_echo_off() {
    let mut harness = Harness::new(80, 24);
    let keys = ScriptedKeys::default()
        .then(KeyInput::Backspace)
        .then_typed("quiet")
        .then(KeyInput::Enter);
    let result = harness.run(&pin_request(), keys, &Governor::unarmed(None));
    let secret = expect_secret(&mut harness.alloc, result);
    assert_eq!(secret, b"quiet");
    assert!(harness.shows("[no echo]"));
    assert!(!harness.shows("*****"));
    harness.alloc.assert_all_wiped();
}

#[test]
fn idle_dialog_times_out_without_allocating() {
    let mut harness = Harness::new(80, 24);
    let governor = Governor::unarmed(Some(Duration::from_millis(100)));
    let result = harness.run(&pin_request(), ScriptedKeys::default(), &governor);
    let reply = Reply::from_result(false, &result);
    assert!(matches!(result, Err(DialogError::Timeout)));
    assert_eq!(reply.status, -1);
    assert!(reply.canceled);
    assert_eq!(harness.alloc.allocs, 0);
}

#[test]
fn mismatch_tabs_past_not_ok_to_cancel() {
    let mut harness = Harness::new(80, 24);
    let request = DialogRequest {
        notok: Some("_Skip".into()),
        ..repeat_request()
    };
    let keys = ScriptedKeys::typed("hunter2")
        .then(KeyInput::Tab)
        .then_typed("hunter")
        .then(KeyInput::Tab)
        .then(KeyInput::Enter);
    let result = harness.run(&request, keys, &Governor::unarmed(None));
    assert!(matches!(result, Ok(Outcome::Canceled)), "got {result:?}");
    assert!(harness.shows("PINs do not match"));
    harness.alloc.assert_all_wiped();
}

#[test]
fn returned_secret_lives_in_secure_memory() {
    let mut harness = Harness::new(80, 24);
    let request = DialogRequest {
        max_len: 16,
        ..pin_request()
    };
    let keys = ScriptedKeys::typed("1234").then(KeyInput::Enter);
    let result = harness.run(&request, keys, &Governor::unarmed(None));

    // field buffer, then the converted copy sized for the entry
    assert_eq!(harness.alloc.sizes, vec![17, 5]);
    assert_eq!(harness.alloc.freed.len(), 1);
    let secret = expect_secret(&mut harness.alloc, result);
    assert_eq!(secret, b"1234");
    harness.alloc.assert_all_wiped();
}

#[test]
fn failed_confirmation_growth_is_fatal_and_wiped() {
    let mut renderer = Renderer::new(TestBackend::new(80, 24), Palette::monochrome()).unwrap();
    let mut alloc = NoGrowthAllocator::default();
    let mut quality = HeuristicMeter;
    let mut keys = ScriptedKeys::typed("abc")
        .then(KeyInput::Tab)
        .then_typed("abc");
    let result = Dialog::new(&repeat_request(), &mut alloc, &mut quality).run(
        &mut renderer,
        &mut keys,
        &Governor::unarmed(None),
    );
    assert!(matches!(result, Err(DialogError::FatalAllocation(_))), "got {result:?}");
    assert_eq!(alloc.inner.allocs, 2);
    assert_eq!(alloc.inner.freed.len(), 2);
    alloc.inner.assert_all_wiped();
}

#[test]
fn refresh_key_first_still_counts_as_input() {
    let mut harness = Harness::new(80, 24);
    let keys = ScriptedKeys::default()
        .then(KeyInput::Ctrl('l'))
        .then(KeyInput::Backspace)
        .then_typed("ab")
        .then(KeyInput::Enter);
    let result = harness.run(&pin_request(), keys, &Governor::unarmed(None));
    let secret = expect_secret(&mut harness.alloc, result);
    assert_eq!(secret, b"ab");
    assert!(!harness.shows("[no echo]"));
    assert!(harness.shows("**_"));
    harness.alloc.assert_all_wiped();
}
