/// Result of comparing the primary and confirmation entries, as seen by
/// the banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    /// Nothing evaluated yet (initial draw).
    Initial,
    Match,
    Mismatch,
}

impl From<bool> for MatchState {
    fn from(matches: bool) -> Self {
        if matches {
            MatchState::Match
        } else {
            MatchState::Mismatch
        }
    }
}

/// Compare the two secret entries. An absent buffer counts as empty, so
/// `(None, Some(""))` matches while `(Some("abc"), None)` does not.
/// Always true when no confirmation is requested.
pub fn matches(confirmation: bool, primary: Option<&[u8]>, confirm: Option<&[u8]>) -> bool {
    if !confirmation {
        return true;
    }
    let primary = primary.unwrap_or_default();
    let confirm = confirm.unwrap_or_default();
    primary.len() == confirm.len()
        && primary
            .iter()
            .zip(confirm)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn m(a: Option<&str>, b: Option<&str>) -> bool {
        matches(true, a.map(str::as_bytes), b.map(str::as_bytes))
    }

    #[test]
    fn empty_and_absent_entries_match() {
        assert!(m(None, None));
        assert!(m(None, Some("")));
        assert!(m(Some(""), None));
        assert!(m(Some(""), Some("")));
    }

    #[test]
    fn identical_entries_match() {
        assert!(m(Some("abc"), Some("abc")));
        assert!(!m(Some("abc"), Some("abd")));
        assert!(!m(Some("abc"), Some("")));
        assert!(!m(Some("abc"), None));
        assert!(!m(Some("hunter2"), Some("hunter")));
    }

    #[test]
    fn no_confirmation_always_matches() {
        assert!(matches(false, Some(b"abc"), Some(b"xyz")));
    }

    proptest! {
        #[test]
        fn symmetric(a in proptest::option::of("[a-c]{0,4}"), b in proptest::option::of("[a-c]{0,4}")) {
            prop_assert_eq!(m(a.as_deref(), b.as_deref()), m(b.as_deref(), a.as_deref()));
        }
    }
}
