//! Cooperative progress reporting and cancellation for batch writes.
//!
//! # Invariants
//! - Cancellation is checked before each item, never mid-statement.
//! - `current` never exceeds `total` for a single batch.

/// Caller-supplied observer of batch progress.
pub trait ProgressReporter {
    /// Called after each item with the batch total and the number processed so far.
    fn on_item_processed(&mut self, total: usize, current: usize);

    /// Consulted before each item; `false` stops the batch and commits the prefix.
    fn should_continue(&self) -> bool {
        true
    }
}

/// Adapts a `FnMut(total, current) -> keep_going` closure into a reporter.
pub struct ProgressFn<F> {
    callback: F,
    keep_going: bool,
}

impl<F> ProgressFn<F>
where
    F: FnMut(usize, usize) -> bool,
{
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            keep_going: true,
        }
    }
}

impl<F> ProgressReporter for ProgressFn<F>
where
    F: FnMut(usize, usize) -> bool,
{
    fn on_item_processed(&mut self, total: usize, current: usize) {
        self.keep_going = (self.callback)(total, current);
    }

    fn should_continue(&self) -> bool {
        self.keep_going
    }
}

/// Running counters for one batch, shared by its sub-phases.
pub struct Progress<'r> {
    reporter: Option<&'r mut dyn ProgressReporter>,
    total: usize,
    current: usize,
}

impl<'r> Progress<'r> {
    pub fn new(reporter: Option<&'r mut dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            total: 0,
            current: 0,
        }
    }

    /// Counters without an observer: unbounded and uncancellable.
    pub fn silent() -> Self {
        Self::new(None)
    }

    pub fn add_to_total(&mut self, count: usize) {
        self.total += count;
    }

    pub fn should_continue(&self) -> bool {
        self.reporter
            .as_deref()
            .map_or(true, |reporter| reporter.should_continue())
    }

    pub(crate) fn advance(&mut self) {
        self.current += 1;
        if let Some(reporter) = self.reporter.as_deref_mut() {
            reporter.on_item_processed(self.total, self.current);
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn current(&self) -> usize {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::{Progress, ProgressFn, ProgressReporter};

    #[test]
    fn silent_progress_never_cancels() {
        let mut progress = Progress::silent();
        progress.add_to_total(2);
        progress.advance();
        assert!(progress.should_continue());
        assert_eq!((progress.total(), progress.current()), (2, 1));
    }

    #[test]
    fn closure_reporter_sees_totals_and_can_stop() {
        let mut seen = Vec::new();
        let mut reporter = ProgressFn::new(|total, current| {
            seen.push((total, current));
            current < 2
        });
        {
            let mut progress = Progress::new(Some(&mut reporter));
            progress.add_to_total(3);
            assert!(progress.should_continue());
            progress.advance();
            assert!(progress.should_continue());
            progress.advance();
            assert!(!progress.should_continue());
        }
        assert!(!reporter.should_continue());
        drop(reporter);
        assert_eq!(seen, vec![(3, 1), (3, 2)]);
    }
}
