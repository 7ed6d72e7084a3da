//! Conversion between UTF-8 (the interchange encoding used by the daemon)
//! and the codeset of the user's locale.
//!
//! The codeset is taken from the locale name itself (`lang_TERR.CODESET`);
//! no locale database is consulted. When no locale is known at all, bytes
//! pass through untouched and a warning is logged once per process.

use std::sync::Once;

use thiserror::Error;
use tracing::warn;

use crate::secmem::{AllocError, Growth, SecretBuffer, SecureAllocator};

static UNKNOWN_LOCALE: Once = Once::new();

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocaleError {
    #[error("cannot resolve codeset {0:?}")]
    UnknownCodeset(String),

    #[error("character {ch:?} is not representable in {codeset}")]
    Unrepresentable { codeset: Codeset, ch: char },

    #[error("invalid or incomplete {codeset} sequence at byte {offset}")]
    InvalidSequence { codeset: Codeset, offset: usize },

    #[error(transparent)]
    Alloc(#[from] AllocError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codeset {
    Utf8,
    Ascii,
    Latin1,
}

impl std::fmt::Display for Codeset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Codeset::Utf8 => "UTF-8",
            Codeset::Ascii => "US-ASCII",
            Codeset::Latin1 => "ISO-8859-1",
        })
    }
}

impl Codeset {
    /// Resolve the codeset named by a locale identifier such as
    /// `de_DE.ISO-8859-1@euro`.
    pub fn resolve(locale: &str) -> Result<Self, LocaleError> {
        let without_modifier = locale.split('@').next().unwrap_or_default();
        if matches!(without_modifier, "C" | "POSIX") {
            return Ok(Codeset::Ascii);
        }
        let Some((_, codeset)) = without_modifier.split_once('.') else {
            return Ok(Codeset::Utf8);
        };
        let normalized: String = codeset
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "utf8" => Ok(Codeset::Utf8),
            "ascii" | "usascii" | "ansix3.41968" | "646" => Ok(Codeset::Ascii),
            "iso88591" | "latin1" | "l1" => Ok(Codeset::Latin1),
            _ => Err(LocaleError::UnknownCodeset(codeset.to_string())),
        }
    }

    /// Append the encoding of `ch`. Returns false when the codeset cannot
    /// hold it.
    pub fn encode_char(self, ch: char, out: &mut Vec<u8>) -> bool {
        match self {
            Codeset::Utf8 => {
                let mut tmp = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut tmp).as_bytes());
                tmp.fill(0);
                true
            }
            Codeset::Ascii if ch.is_ascii() => {
                out.push(ch as u8);
                true
            }
            Codeset::Latin1 if (ch as u32) < 0x100 => {
                out.push(ch as u32 as u8);
                true
            }
            _ => false,
        }
    }

    /// UTF-8 bytes one local byte can turn into.
    fn max_expansion(self) -> usize {
        match self {
            Codeset::Utf8 | Codeset::Ascii => 1,
            Codeset::Latin1 => 2,
        }
    }

    /// Decode `bytes`, handing the UTF-8 text to `sink` piece by piece
    /// without an intermediate copy.
    fn decode_with(
        self,
        bytes: &[u8],
        mut sink: impl FnMut(&str) -> Result<(), LocaleError>,
    ) -> Result<(), LocaleError> {
        match self {
            Codeset::Utf8 => {
                let text = std::str::from_utf8(bytes).map_err(|e| LocaleError::InvalidSequence {
                    codeset: self,
                    offset: e.valid_up_to(),
                })?;
                sink(text)
            }
            Codeset::Ascii => {
                if let Some(offset) = bytes.iter().position(|b| !b.is_ascii()) {
                    return Err(LocaleError::InvalidSequence {
                        codeset: self,
                        offset,
                    });
                }
                let text = std::str::from_utf8(bytes).map_err(|e| LocaleError::InvalidSequence {
                    codeset: self,
                    offset: e.valid_up_to(),
                })?;
                sink(text)
            }
            Codeset::Latin1 => {
                let mut tmp = [0u8; 4];
                for b in bytes {
                    let piece = char::from(*b).encode_utf8(&mut tmp);
                    sink(piece)?;
                }
                tmp.fill(0);
                Ok(())
            }
        }
    }

    fn decode_into(self, bytes: &[u8], out: &mut String) -> Result<(), LocaleError> {
        self.decode_with(bytes, |text| {
            out.push_str(text);
            Ok(())
        })
    }
}

fn warn_unknown_locale() {
    UNKNOWN_LOCALE.call_once(|| warn!("no LC_CTYPE known - assuming UTF-8"));
}

/// Resolve a locale, treating `None` as "pass through" (and warning once).
fn codeset_for(locale: Option<&str>) -> Result<Option<Codeset>, LocaleError> {
    match locale {
        Some(id) => Codeset::resolve(id).map(Some),
        None => {
            warn_unknown_locale();
            Ok(None)
        }
    }
}

/// Convert UTF-8 `text` into the locale's encoding.
pub fn to_local(text: &str, locale: Option<&str>) -> Result<Vec<u8>, LocaleError> {
    let Some(codeset) = codeset_for(locale)? else {
        return Ok(text.as_bytes().to_vec());
    };
    let mut out = Vec::with_capacity(text.len());
    for ch in text.chars() {
        if !codeset.encode_char(ch, &mut out) {
            return Err(LocaleError::Unrepresentable { codeset, ch });
        }
    }
    Ok(out)
}

/// Convert a locale-encoded secret into UTF-8.
///
/// The output buffer comes from `alloc` and is reserved at its worst-case
/// size up front, so it never reallocates and no partial copy of the
/// secret is left behind. On failure it is wiped and handed back.
pub fn to_interchange(
    local: &[u8],
    locale: Option<&str>,
    alloc: &mut dyn SecureAllocator,
) -> Result<SecretBuffer, LocaleError> {
    let codeset = codeset_for(locale)?;
    let worst = local
        .len()
        .saturating_mul(codeset.map_or(1, Codeset::max_expansion));
    let mut out = SecretBuffer::allocate(alloc, worst, Growth::Presized)?;
    let filled = match codeset {
        None => push_all(&mut out, alloc, local),
        Some(codeset) => codeset.decode_with(local, |text| push_all(&mut out, alloc, text.as_bytes())),
    };
    match filled {
        Ok(()) => Ok(out),
        Err(err) => {
            out.release(alloc);
            Err(err)
        }
    }
}

fn push_all(
    out: &mut SecretBuffer,
    alloc: &mut dyn SecureAllocator,
    bytes: &[u8],
) -> Result<(), LocaleError> {
    for b in bytes {
        out.push(alloc, *b)?;
    }
    Ok(())
}

/// Round-trip a label through the local encoding to get the text the
/// terminal will actually show.
pub fn display_text(text: &str, locale: Option<&str>) -> Result<String, LocaleError> {
    let local = to_local(text, locale)?;
    let Some(codeset) = locale.map(Codeset::resolve).transpose()? else {
        return String::from_utf8(local).map_err(|e| LocaleError::InvalidSequence {
            codeset: Codeset::Utf8,
            offset: e.utf8_error().valid_up_to(),
        });
    };
    let mut out = String::with_capacity(local.len());
    codeset.decode_into(&local, &mut out)?;
    Ok(out)
}

/// Locale from the environment, using the usual `LC_ALL` > `LC_CTYPE` >
/// `LANG` precedence.
pub fn locale_from_env() -> Option<String> {
    ["LC_ALL", "LC_CTYPE", "LANG"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secmem::ZeroizingAllocator;

    /// Keeps everything it hands out or takes back, for inspection.
    #[derive(Default)]
    struct Ledger {
        allocs: Vec<usize>,
        freed: Vec<Vec<u8>>,
    }

    impl SecureAllocator for Ledger {
        fn alloc(&mut self, len: usize) -> Result<Vec<u8>, AllocError> {
            self.allocs.push(len);
            Ok(vec![0; len])
        }

        fn realloc(&mut self, buf: &mut Vec<u8>, len: usize) -> Result<(), AllocError> {
            ZeroizingAllocator.realloc(buf, len)
        }

        fn free(&mut self, buf: Vec<u8>) {
            self.freed.push(buf);
        }
    }

    #[test]
    fn resolves_common_locale_names() {
        assert_eq!(Codeset::resolve("en_US.UTF-8").unwrap(), Codeset::Utf8);
        assert_eq!(Codeset::resolve("en_US.utf8").unwrap(), Codeset::Utf8);
        assert_eq!(Codeset::resolve("de_DE").unwrap(), Codeset::Utf8);
        assert_eq!(Codeset::resolve("C").unwrap(), Codeset::Ascii);
        assert_eq!(Codeset::resolve("POSIX").unwrap(), Codeset::Ascii);
        assert_eq!(Codeset::resolve("C.UTF-8").unwrap(), Codeset::Utf8);
        assert_eq!(
            Codeset::resolve("de_DE.ISO-8859-1@euro").unwrap(),
            Codeset::Latin1
        );
    }

    #[test]
    fn unresolvable_codeset_fails() {
        let err = Codeset::resolve("ru_RU.KOI8-R").unwrap_err();
        assert_eq!(err, LocaleError::UnknownCodeset("KOI8-R".into()));
        assert!(to_local("hi", Some("ru_RU.KOI8-R")).is_err());
    }

    #[test]
    fn unknown_locale_passes_through() {
        assert_eq!(to_local("grüße", None).unwrap(), "grüße".as_bytes());
        let back = to_interchange("grüße".as_bytes(), None, &mut ZeroizingAllocator).unwrap();
        assert_eq!(back.as_bytes(), "grüße".as_bytes());
    }

    #[test]
    fn latin1_round_trip() {
        let local = to_local("grüße", Some("de_DE.ISO-8859-1")).unwrap();
        assert_eq!(local, vec![b'g', b'r', 0xfc, 0xdf, b'e']);
        let mut ledger = Ledger::default();
        let utf8 = to_interchange(&local, Some("de_DE.ISO-8859-1"), &mut ledger).unwrap();
        assert_eq!(utf8.as_bytes(), "grüße".as_bytes());
        // worst case for five Latin-1 bytes plus the terminator
        assert_eq!(ledger.allocs, [11]);
        utf8.release(&mut ledger);
        assert_eq!(ledger.freed.len(), 1);
        assert!(ledger.freed[0].iter().all(|b| *b == 0));
    }

    #[test]
    fn ascii_rejects_wide_text() {
        let err = to_local("日本", Some("C")).unwrap_err();
        assert!(matches!(err, LocaleError::Unrepresentable { ch: '日', .. }));
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let mut ledger = Ledger::default();
        let err = to_interchange(&[b'a', 0xc3], Some("en_US.UTF-8"), &mut ledger).unwrap_err();
        assert_eq!(
            err,
            LocaleError::InvalidSequence {
                codeset: Codeset::Utf8,
                offset: 1
            }
        );
        assert_eq!(ledger.allocs.len(), 1);
        assert_eq!(ledger.freed.len(), 1);
    }

    #[test]
    fn display_text_matches_input_when_representable() {
        assert_eq!(display_text("Passphrase:", Some("C")).unwrap(), "Passphrase:");
        assert_eq!(display_text("Schlüssel", Some("de_DE.ISO-8859-1")).unwrap(), "Schlüssel");
    }
}
