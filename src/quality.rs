/// Source of the 0-100 strength reading shown under the confirmation
/// field. `None` means no reading is available and the bar is left alone.
pub trait QualityMeter {
    fn quality(&mut self, secret: &[u8]) -> Option<u8>;
}

impl<F> QualityMeter for F
where
    F: FnMut(&[u8]) -> Option<u8>,
{
    fn quality(&mut self, secret: &[u8]) -> Option<u8> {
        self(secret)
    }
}

/// Never reports a reading.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoQuality;

impl QualityMeter for NoQuality {
    fn quality(&mut self, _secret: &[u8]) -> Option<u8> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strength {
    Weak,
    Average,
    Strong,
    Excellent,
}

/// Character-class and length heuristic. Bytes outside ASCII count as
/// symbols since the secret is still in the local encoding here.
pub fn classify_strength(secret: &[u8]) -> (Strength, u8) {
    let len = secret.len();
    let has_lower = secret.iter().any(u8::is_ascii_lowercase);
    let has_upper = secret.iter().any(u8::is_ascii_uppercase);
    let has_digit = secret.iter().any(u8::is_ascii_digit);
    let has_special = secret
        .iter()
        .any(|b| !b.is_ascii_alphanumeric() && !b.is_ascii_whitespace());

    let score = [
        has_lower,
        has_upper,
        has_digit,
        has_special,
        len >= 8,
        len >= 12,
        len >= 16,
        len >= 20,
    ]
    .iter()
    .filter(|hit| **hit)
    .count() as u8;

    // short secrets never rate above weak
    let score = if len < 8 { score.min(3) } else { score };
    let strength = match score {
        0..=3 => Strength::Weak,
        4..=5 => Strength::Average,
        6..=7 => Strength::Strong,
        _ => Strength::Excellent,
    };
    (strength, score)
}

/// Default meter built on [`classify_strength`].
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicMeter;

impl QualityMeter for HeuristicMeter {
    fn quality(&mut self, secret: &[u8]) -> Option<u8> {
        let (_, score) = classify_strength(secret);
        Some(score * 100 / 8)
    }
}
