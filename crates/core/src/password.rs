//! Playback-credential generation

use rand::distr::Alphanumeric;
use rand::Rng;

/// Length every generated playback credential has
pub const PASSWORD_LEN: usize = 8;

fn satisfies_charset_rule(candidate: &str) -> bool {
    candidate.chars().any(|c| c.is_ascii_uppercase())
        && candidate.chars().any(|c| c.is_ascii_lowercase())
        && candidate.chars().any(|c| c.is_ascii_digit())
}

/// Generate a fresh 8-character alphanumeric credential containing at least
/// one uppercase letter, one lowercase letter, and one digit.
pub fn generate_password() -> String {
    let mut rng = rand::rng();
    loop {
        let candidate: String = (&mut rng)
            .sample_iter(Alphanumeric)
            .take(PASSWORD_LEN)
            .map(char::from)
            .collect();
        if satisfies_charset_rule(&candidate) {
            return candidate;
        }
    }
}
