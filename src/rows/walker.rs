//! Sequence walking with exactly-once baggage
//!
//! One walker materialization = one iterator from the sequence plus one
//! pending baggage obligation. The obligation is discharged the first
//! time the walk ends, whichever way it ends.

use super::RowSequence;

pub(crate) struct RowWalker<R> {
    sequence: RowSequence<R>,
    iter: Option<Box<dyn Iterator<Item = R>>>,
    baggage_pending: bool,
}

impl<R> RowWalker<R> {
    pub fn new(sequence: RowSequence<R>) -> Self {
        let mut walker = Self {
            sequence,
            iter: None,
            baggage_pending: false,
        };
        walker.start();
        walker
    }

    fn start(&mut self) {
        self.iter = Some(self.sequence.iter());
        self.baggage_pending = self.sequence.baggage().is_some();
    }

    /// Next record, or `None` at exhaustion (which fires the baggage).
    pub fn next_row(&mut self) -> Option<R> {
        match self.iter.as_mut().and_then(|it| it.next()) {
            Some(row) => Some(row),
            None => {
                self.finish();
                None
            }
        }
    }

    /// Start the walk over. Abandoning a half-finished walk still ends
    /// that materialization, so its baggage fires first.
    pub fn reset(&mut self) {
        self.finish();
        self.start();
    }

    /// End the current materialization without starting another.
    pub fn close(&mut self) {
        self.finish();
        self.iter = None;
    }

    fn finish(&mut self) {
        if self.baggage_pending {
            self.baggage_pending = false;
            if let Some(baggage) = self.sequence.baggage() {
                baggage();
            }
        }
    }
}
