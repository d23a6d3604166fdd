//! Row-at-a-time cursor over a columnar segment

use std::rc::Rc;

use super::offset::Offset;
use super::selector::{ColumnSelectorFactory, QueryableSelectorFactory};
use super::{CancellationToken, Cursor};
use crate::{ExecutionError, Result};

/// Cursor driving an offset chain built by the holder. The selector
/// factory is bound to the offset's position, so selectors read whatever
/// row the offset last settled on.
pub struct SegmentCursor<'a> {
    offset: Offset,
    factory: Rc<QueryableSelectorFactory<'a>>,
    token: CancellationToken,
    interrupted: bool,
}

impl<'a> SegmentCursor<'a> {
    pub(crate) fn new(
        offset: Offset,
        factory: Rc<QueryableSelectorFactory<'a>>,
        token: CancellationToken,
    ) -> Self {
        Self {
            offset,
            factory,
            token,
            interrupted: false,
        }
    }
}

impl Cursor for SegmentCursor<'_> {
    fn selector_factory(&self) -> &dyn ColumnSelectorFactory {
        self.factory.as_ref()
    }

    fn advance(&mut self) -> Result<()> {
        if self.is_done() {
            return Ok(());
        }
        self.offset.advance();
        // checked after the advance: a filtered seek is the long part,
        // and it parks the offset in a safe state on its own
        if self.token.is_cancelled() {
            self.interrupted = true;
            return Err(ExecutionError::Interrupted.into());
        }
        Ok(())
    }

    fn advance_uninterruptibly(&mut self) {
        if self.is_done() {
            return;
        }
        self.offset.advance_uninterruptibly();
    }

    fn is_done(&self) -> bool {
        self.interrupted || !self.offset.within_bounds()
    }

    fn reset(&mut self) {
        self.interrupted = false;
        self.offset.reset();
    }
}
