//! Workspace handle generation and validation.
//!
//! Handles are short adjective-noun pairs like `quiet-lake`. They double as
//! directory names under the store root, so the accepted charset is the
//! filesystem-safe `[a-z0-9-]` with no leading or trailing hyphen.

use rand::seq::IndexedRandom;

use crate::error::{Result, WorkshedError};

pub const MAX_HANDLE_LEN: usize = 64;

/// Attempts at a fresh word pair before falling back to numeric suffixes.
const MAX_ATTEMPTS: usize = 16;

const ADJECTIVES: &[&str] = &[
    "amber", "bold", "brisk", "calm", "clever", "crisp", "dusty", "eager", "fuzzy", "gentle",
    "golden", "hidden", "humble", "keen", "lively", "lucky", "mellow", "misty", "quiet", "rapid",
    "rustic", "silent", "solid", "spry", "steady", "sunny", "swift", "tidy", "vivid", "wild",
];

const NOUNS: &[&str] = &[
    "anchor", "basin", "beacon", "branch", "brook", "canyon", "cedar", "comet", "coral", "crane",
    "delta", "ember", "fjord", "garnet", "glade", "harbor", "heron", "lagoon", "lake", "maple",
    "meadow", "mesa", "orchard", "osprey", "pine", "prairie", "quarry", "ridge", "summit", "tundra",
];

/// Check a handle against the charset and length rules. Used both for
/// user-supplied handles and as a safety net on generated ones.
pub fn validate(handle: &str) -> Result<()> {
    if handle.is_empty() {
        return Err(WorkshedError::validation("handle must not be empty"));
    }
    if handle.len() > MAX_HANDLE_LEN {
        return Err(WorkshedError::validation(format!(
            "handle must be at most {MAX_HANDLE_LEN} characters, got {}",
            handle.len()
        )));
    }
    if let Some(bad) = handle
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(WorkshedError::validation(format!(
            "handle may only contain lowercase letters, digits, and hyphens, got '{bad}'"
        )));
    }
    if handle.starts_with('-') || handle.ends_with('-') {
        return Err(WorkshedError::validation(
            "handle must not start or end with a hyphen",
        ));
    }
    Ok(())
}

/// Generate a handle that `taken` does not claim. Random word pairs first;
/// if the store is crowded enough to exhaust the retry budget, fall back to
/// suffixing the last pair with an increasing counter, which always
/// terminates.
pub fn generate(taken: impl Fn(&str) -> bool) -> String {
    let mut rng = rand::rng();
    let mut last = String::new();
    for _ in 0..MAX_ATTEMPTS {
        let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("quiet");
        let noun = NOUNS.choose(&mut rng).copied().unwrap_or("lake");
        let candidate = format!("{adjective}-{noun}");
        if !taken(&candidate) {
            return candidate;
        }
        last = candidate;
    }
    let mut counter = 2_u32;
    loop {
        let candidate = format!("{last}-{counter}");
        if !taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
