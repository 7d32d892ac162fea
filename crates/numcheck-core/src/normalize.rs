//! Input normalization for identifier and relay lists.
//!
//! Both parsers take a newline-delimited block of text and keep input order and
//! duplicates. Blank lines, `#` comments and non-conforming lines are dropped
//! without error; the acceptance rules below are the whole contract.

use crate::domain::{Identifier, Relay};

/// Characters removed from a raw phone number before validation.
const STRIPPED: [char; 5] = [' ', '+', '-', '(', ')'];

/// Acceptance policy for identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentifierPolicy {
    /// Also strip `.` separators.
    pub strip_dots: bool,
    /// Inclusive digit-count bounds.
    pub length_bounds: Option<(usize, usize)>,
}

impl IdentifierPolicy {
    /// Digits only, any length.
    pub const fn lenient() -> Self {
        Self {
            strip_dots: false,
            length_bounds: None,
        }
    }

    /// 8 to 15 digits (E.164 sized), dots allowed as separators.
    pub const fn strict() -> Self {
        Self {
            strip_dots: true,
            length_bounds: Some((8, 15)),
        }
    }

    fn accepts(&self, digits: &str) -> bool {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        match self.length_bounds {
            Some((min, max)) => (min..=max).contains(&digits.len()),
            None => true,
        }
    }
}

impl Default for IdentifierPolicy {
    fn default() -> Self {
        Self::lenient()
    }
}

/// Normalize a single raw line; `None` when the line is not an acceptable identifier.
pub fn normalize_identifier(raw: &str, policy: &IdentifierPolicy) -> Option<Identifier> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let cleaned: String = line
        .chars()
        .filter(|c| !c.is_whitespace() && !STRIPPED.contains(c))
        .filter(|c| !(policy.strip_dots && *c == '.'))
        .collect();

    policy.accepts(&cleaned).then(|| Identifier(cleaned))
}

pub fn normalize_identifiers(text: &str, policy: &IdentifierPolicy) -> Vec<Identifier> {
    text.lines()
        .filter_map(|line| normalize_identifier(line, policy))
        .collect()
}

/// Validate a single relay line; `None` when it is neither an `http…` URL nor `host:port`.
pub fn normalize_relay(raw: &str) -> Option<Relay> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    if line.starts_with("http") {
        return Some(Relay(line.to_string()));
    }

    let (_, port) = line.rsplit_once(':')?;
    match port.trim().parse::<u32>() {
        Ok(p) if (1..=65_535).contains(&p) => Some(Relay(line.to_string())),
        _ => None,
    }
}

pub fn normalize_relays(text: &str) -> Vec<Relay> {
    text.lines().filter_map(normalize_relay).collect()
}

/// Truncate `items` to `cap` entries (if any), returning how many were dropped.
pub fn apply_cap<T>(items: &mut Vec<T>, cap: Option<usize>) -> usize {
    match cap {
        Some(cap) if items.len() > cap => {
            let dropped = items.len() - cap;
            items.truncate(cap);
            dropped
        }
        _ => 0,
    }
}
