//! Cooperative cancellation.
//!
//! Optimizers poll a [`Deadline`] between generations, recursion levels
//! or scenario batches. On expiry they stop and return the best solution
//! found so far.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// A time limit and/or external cancellation flag.
///
/// The default deadline never expires.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    expires_at: Option<Instant>,
    cancelled: Option<Arc<AtomicBool>>,
}

impl Deadline {
    /// A deadline that never expires.
    pub fn none() -> Self {
        Self::default()
    }

    /// Expires `limit` from now.
    pub fn after(limit: Duration) -> Self {
        Self {
            expires_at: Some(Instant::now() + limit),
            cancelled: None,
        }
    }

    /// Expires `limit` from now if given, otherwise never.
    pub fn from_limit(limit: Option<Duration>) -> Self {
        limit.map(Self::after).unwrap_or_default()
    }

    /// Also expires once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = Some(flag);
        self
    }

    /// Whether work should stop.
    #[inline]
    pub fn is_expired(&self) -> bool {
        if let Some(flag) = &self.cancelled {
            if flag.load(Ordering::Relaxed) {
                return true;
            }
        }
        self.expires_at.is_some_and(|t| Instant::now() >= t)
    }

    /// Time left, if a limit is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|t| t.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_expires() {
        let d = Deadline::none();
        assert!(!d.is_expired());
        assert!(d.remaining().is_none());
    }

    #[test]
    fn test_zero_limit_expires() {
        let d = Deadline::after(Duration::ZERO);
        assert!(d.is_expired());
        assert_eq!(d.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_cancel_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let d = Deadline::from_limit(None).with_cancel_flag(flag.clone());
        assert!(!d.is_expired());
        flag.store(true, Ordering::Relaxed);
        assert!(d.is_expired());
    }
}
