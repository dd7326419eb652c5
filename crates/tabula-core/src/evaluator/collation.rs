//! # Text Collation
//!
//! String comparison used by the comparator and by case-insensitive matching.
//!
//! - Primary strength: compare the lowercased character sequences
//! - Tertiary strength (case-sensitive only): on a primary tie, the first
//!   differing character decides, lowercase before uppercase
//!
//! This reproduces the ordering a locale collator gives for the Latin range
//! (`a < B < b < C`) instead of raw code-point order (`B < C < a < b`).

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Collator {
    case_sensitive: bool,
}

impl Collator {
    #[must_use]
    pub const fn new(case_sensitive: bool) -> Self {
        Self { case_sensitive }
    }

    #[must_use]
    pub const fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Compare two strings under this collator.
    #[must_use]
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        let primary = fold(a).cmp(fold(b));
        if primary != Ordering::Equal || !self.case_sensitive {
            return primary;
        }
        tertiary(a, b)
    }

    /// Equality under this collator.
    #[must_use]
    pub fn equals(&self, a: &str, b: &str) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

fn fold(s: &str) -> impl Iterator<Item = char> + '_ {
    s.chars().flat_map(char::to_lowercase)
}

fn tertiary(a: &str, b: &str) -> Ordering {
    for (x, y) in a.chars().zip(b.chars()) {
        if x == y {
            continue;
        }
        return match (x.is_lowercase(), y.is_lowercase()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => x.cmp(&y),
        };
    }
    a.chars().count().cmp(&b.chars().count())
}

/// Lowercase a string for case-insensitive pattern matching.
#[must_use]
pub fn lowercase(s: &str) -> String {
    fold(s).collect()
}
