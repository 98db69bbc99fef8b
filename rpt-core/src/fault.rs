use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide critical-error signal.
///
/// Raised by allocator or storage failures; every series and point loop in
/// the local apply path checks it before advancing so an in-flight write
/// unwinds without touching the series index again. Carried by handle, not
/// as a global: the database owns one and clones it into each job context.
#[derive(Debug, Clone, Default)]
pub struct FaultSignal {
    raised: Arc<AtomicBool>,
}

impl FaultSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    #[inline]
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Clear the signal. Test hook; production recovery restarts the process.
    #[inline]
    pub fn clear(&self) {
        self.raised.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_signal_shared_between_clones() {
        let signal = FaultSignal::new();
        let observer = signal.clone();
        assert!(!observer.is_raised());

        signal.raise();
        assert!(observer.is_raised());

        observer.clear();
        assert!(!signal.is_raised());
    }
}
