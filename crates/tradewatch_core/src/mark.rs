use std::fmt;

use crate::TransactionId;

/// Largest transaction id already observed by a poller.
///
/// `-1` is the "uninitialized" sentinel: the first poll from it only establishes
/// a baseline and emits nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HighWaterMark(TransactionId);

impl HighWaterMark {
    pub const UNINITIALIZED: Self = Self(-1);

    pub const fn new(id: TransactionId) -> Self {
        Self(id)
    }

    pub const fn get(self) -> TransactionId {
        self.0
    }

    pub const fn is_initialized(self) -> bool {
        self.0 != Self::UNINITIALIZED.0
    }

    /// True when `id` is at or below the mark, i.e. already delivered.
    pub const fn covers(self, id: TransactionId) -> bool {
        id <= self.0
    }

    /// Never moves backwards.
    pub fn advanced_to(self, other: Self) -> Self {
        self.max(other)
    }
}

impl Default for HighWaterMark {
    fn default() -> Self {
        Self::UNINITIALIZED
    }
}

impl From<TransactionId> for HighWaterMark {
    fn from(id: TransactionId) -> Self {
        Self(id)
    }
}

impl fmt::Display for HighWaterMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_initialized() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "uninitialized")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::HighWaterMark;

    #[test]
    fn advance_keeps_the_larger_mark() {
        let mark = HighWaterMark::new(40);
        assert_eq!(mark.advanced_to(HighWaterMark::new(50)).get(), 50);
        assert_eq!(mark.advanced_to(HighWaterMark::new(10)).get(), 40);
        assert_eq!(
            HighWaterMark::UNINITIALIZED.advanced_to(HighWaterMark::UNINITIALIZED),
            HighWaterMark::UNINITIALIZED
        );
    }

    #[test]
    fn sentinel_is_not_initialized() {
        assert!(!HighWaterMark::default().is_initialized());
        assert!(HighWaterMark::new(0).is_initialized());
        assert_eq!(HighWaterMark::default().to_string(), "uninitialized");
    }
}
