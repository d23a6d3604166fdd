//! Holder-scoped resource management
//!
//! The column cache gives single-open semantics over a segment's columns
//! for the lifetime of one cursor holder; the closer releases everything
//! the holder acquired, in reverse order, exactly once.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::data::TIME_COLUMN;
use crate::segment::{BaseColumn, NumericColumn, Segment};
use crate::{DataError, ExecutionError, Result};

type CloseAction = Box<dyn FnOnce() -> std::result::Result<(), String>>;

/// Collects release actions and runs them in reverse acquisition order.
/// Failures are coalesced into a single error; repeated close is a no-op.
#[derive(Default)]
pub struct Closer {
    actions: Vec<CloseAction>,
    closed: bool,
}

impl Closer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: CloseAction) {
        debug_assert!(!self.closed, "registering on a closed closer");
        self.actions.push(action);
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut failures = Vec::new();
        while let Some(action) = self.actions.pop() {
            if let Err(msg) = action() {
                failures.push(msg);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ExecutionError::CloseFailed(failures.join("; ")).into())
        }
    }
}

/// Open-once cache of a segment's columns, keyed by name. Every open is
/// registered with the holder's closer; nothing is reopened and nothing
/// is evicted during the holder's life.
pub struct ColumnCache<'a> {
    segment: &'a Segment,
    closer: Rc<RefCell<Closer>>,
    columns: RefCell<AHashMap<String, BaseColumn>>,
}

impl<'a> ColumnCache<'a> {
    pub fn new(segment: &'a Segment, closer: Rc<RefCell<Closer>>) -> Self {
        Self {
            segment,
            closer,
            columns: RefCell::new(AHashMap::new()),
        }
    }

    pub fn segment(&self) -> &'a Segment {
        self.segment
    }

    /// The column, opened on first access and memoized after.
    pub fn get(&self, name: &str) -> Option<BaseColumn> {
        debug_assert!(
            !self.closer.borrow().is_closed(),
            "column access after holder close"
        );
        if let Some(column) = self.columns.borrow().get(name) {
            return Some(column.clone());
        }

        let holder = self.segment.column(name)?;
        let column = holder.open();
        let tracker = holder.open_tracker();
        self.closer.borrow_mut().register(Box::new(move || {
            let opens = tracker.get();
            if opens == 0 {
                return Err("column released more times than opened".to_string());
            }
            tracker.set(opens - 1);
            Ok(())
        }));
        self.columns
            .borrow_mut()
            .insert(name.to_string(), column.clone());
        Some(column)
    }

    /// The `__time` column as a numeric handle.
    pub fn time_column(&self) -> Result<Rc<NumericColumn<i64>>> {
        let column = self.get(TIME_COLUMN).ok_or_else(|| DataError::TypeMismatch {
            column: TIME_COLUMN.to_string(),
            expected: "long",
            found: "absent",
        })?;
        column.as_long_column().ok_or_else(|| {
            DataError::TypeMismatch {
                column: TIME_COLUMN.to_string(),
                expected: "long",
                found: "non-numeric",
            }
            .into()
        })
    }
}
