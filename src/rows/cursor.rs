//! Cursors over row sequences
//!
//! Ascending cursors walk the live sequence and re-materialize on reset;
//! descending cursors buffer the whole sequence once, in reverse, so
//! their observable baggage count differs from ascending by design.
//! Interval filtering drops records outside the clipped interval; the
//! filter runs through selectors reading the current record.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::walker::RowWalker;
use super::{ColumnFn, RowAdapter, RowSequence};
use crate::data::{ColumnCapabilities, RowSignature, Value, ValueType, TIME_COLUMN};
use crate::scan::filter::{Filter, ValueMatcher};
use crate::scan::selector::{
    ColumnInspector, ColumnSelectorFactory, ColumnValueSelector, NullSelector,
};
use crate::scan::spec::{
    resolve_time_ordering, CursorBuildSpec, NullPolicy, OrderBy, QueryMetrics,
};
use crate::scan::vcols::VirtualColumns;
use crate::scan::{CancellationToken, Cursor, CursorHolder};
use crate::scan::vector::VectorCursor;
use crate::time::Interval;
use crate::{ExecutionError, Result};

const CANCEL_CHECK_EVERY: u32 = 1024;

/// Cursor holder over a row sequence with a declared signature.
pub struct RowBasedCursorHolder<R> {
    sequence: RowSequence<R>,
    adapter: Rc<dyn RowAdapter<R>>,
    signature: RowSignature,
    interval: Interval,
    filter: Option<Rc<dyn Filter>>,
    virtual_columns: Rc<VirtualColumns>,
    metrics: Option<Rc<dyn QueryMetrics>>,
    null_policy: NullPolicy,
    token: CancellationToken,
    descending: bool,
    ordering: Vec<OrderBy>,
    walkers: RefCell<Vec<Rc<RefCell<RowWalker<R>>>>>,
    closed: Cell<bool>,
}

impl<R: Clone + 'static> RowBasedCursorHolder<R> {
    pub(crate) fn new(
        sequence: RowSequence<R>,
        adapter: Rc<dyn RowAdapter<R>>,
        signature: RowSignature,
        spec: CursorBuildSpec,
    ) -> Result<Self> {
        let (descending, ordering) = resolve_time_ordering(&spec.preferred_ordering)?;
        spec.virtual_columns
            .check_no_shadowing(|name| name == TIME_COLUMN || signature.contains(name))?;

        Ok(Self {
            sequence,
            adapter,
            signature,
            interval: spec.interval,
            filter: spec.filter,
            virtual_columns: Rc::new(spec.virtual_columns),
            metrics: spec.query_metrics,
            null_policy: spec.null_policy,
            token: spec.cancellation,
            descending,
            ordering,
            walkers: RefCell::new(Vec::new()),
            closed: Cell::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.get() {
            Err(ExecutionError::HolderClosed.into())
        } else {
            Ok(())
        }
    }
}

impl<R: Clone + 'static> CursorHolder for RowBasedCursorHolder<R> {
    /// Row sequences have no vector shape to expose.
    fn can_vectorize(&self) -> bool {
        false
    }

    fn as_cursor(&self) -> Result<Box<dyn Cursor + '_>> {
        self.ensure_open()?;
        if let Some(metrics) = &self.metrics {
            metrics.vectorized(false);
        }

        let walk_sequence = if self.descending {
            // one extra materialization buys reverse order; the buffered
            // copy carries no baggage of its own
            let mut rows = Vec::new();
            let mut walker = RowWalker::new(self.sequence.clone());
            while let Some(row) = walker.next_row() {
                rows.push(row);
            }
            rows.reverse();
            RowSequence::from_vec(rows)
        } else {
            self.sequence.clone()
        };

        let walker = Rc::new(RefCell::new(RowWalker::new(walk_sequence)));
        self.walkers.borrow_mut().push(Rc::clone(&walker));

        let register: Rc<RefCell<Option<R>>> = Rc::new(RefCell::new(None));
        let factory = Rc::new(RowSelectorFactory {
            register: Rc::clone(&register),
            adapter: Rc::clone(&self.adapter),
            signature: self.signature.clone(),
            virtual_columns: Rc::clone(&self.virtual_columns),
            policy: self.null_policy,
        });
        let matcher = self
            .filter
            .as_ref()
            .map(|f| f.make_matcher(factory.as_ref()));

        let mut cursor = RowBasedCursor {
            walker,
            register,
            factory,
            matcher,
            interval: self.interval,
            adapter: Rc::clone(&self.adapter),
            token: self.token.clone(),
            interrupted: false,
        };
        cursor.seek(false);
        Ok(Box::new(cursor))
    }

    fn as_vector_cursor(&self) -> Result<VectorCursor<'_>> {
        Err(ExecutionError::NotVectorizable.into())
    }

    fn ordering(&self) -> &[OrderBy] {
        &self.ordering
    }

    fn close(&self) -> Result<()> {
        if self.closed.get() {
            return Ok(());
        }
        self.closed.set(true);
        for walker in self.walkers.borrow_mut().drain(..) {
            walker.borrow_mut().close();
        }
        Ok(())
    }
}

struct RowBasedCursor<R> {
    walker: Rc<RefCell<RowWalker<R>>>,
    register: Rc<RefCell<Option<R>>>,
    factory: Rc<RowSelectorFactory<R>>,
    matcher: Option<ValueMatcher>,
    interval: Interval,
    adapter: Rc<dyn RowAdapter<R>>,
    token: CancellationToken,
    interrupted: bool,
}

impl<R: Clone + 'static> RowBasedCursor<R> {
    /// Pull records until one passes the interval and the matcher, or the
    /// walk ends. The passing record lands in the register, where the
    /// selectors read it.
    fn seek(&mut self, interruptible: bool) {
        let mut examined: u32 = 0;
        loop {
            let next = self.walker.borrow_mut().next_row();
            let Some(row) = next else {
                *self.register.borrow_mut() = None;
                return;
            };
            examined += 1;
            if interruptible
                && examined % CANCEL_CHECK_EVERY == 0
                && self.token.is_cancelled()
            {
                self.interrupted = true;
                *self.register.borrow_mut() = None;
                return;
            }
            if !self.interval.contains(self.adapter.timestamp(&row)) {
                continue;
            }
            *self.register.borrow_mut() = Some(row);
            match &self.matcher {
                None => return,
                Some(matcher) => {
                    if matcher() {
                        return;
                    }
                }
            }
        }
    }
}

impl<R: Clone + 'static> Cursor for RowBasedCursor<R> {
    fn selector_factory(&self) -> &dyn ColumnSelectorFactory {
        self.factory.as_ref()
    }

    fn advance(&mut self) -> Result<()> {
        if self.is_done() {
            return Ok(());
        }
        self.seek(true);
        if self.interrupted || self.token.is_cancelled() {
            self.interrupted = true;
            *self.register.borrow_mut() = None;
            return Err(ExecutionError::Interrupted.into());
        }
        Ok(())
    }

    fn advance_uninterruptibly(&mut self) {
        if self.is_done() {
            return;
        }
        self.seek(false);
    }

    fn is_done(&self) -> bool {
        self.interrupted || self.register.borrow().is_none()
    }

    fn reset(&mut self) {
        self.interrupted = false;
        self.walker.borrow_mut().reset();
        self.seek(false);
    }
}

/// Selector factory reading the cursor's current record. Resolution is
/// virtual columns, then the time column, then declared/adaptable
/// columns, then the null selector.
struct RowSelectorFactory<R> {
    register: Rc<RefCell<Option<R>>>,
    adapter: Rc<dyn RowAdapter<R>>,
    signature: RowSignature,
    virtual_columns: Rc<VirtualColumns>,
    policy: NullPolicy,
}

impl<R: Clone + 'static> ColumnInspector for RowSelectorFactory<R> {
    fn column_capabilities(&self, name: &str) -> Option<ColumnCapabilities> {
        if let Some(vc) = self.virtual_columns.get(name) {
            return vc.capabilities(self);
        }
        if name == TIME_COLUMN {
            return Some(ColumnCapabilities::numeric(ValueType::Long));
        }
        self.signature
            .column_type(name)
            .flatten()
            .map(ColumnCapabilities::from_declared)
    }
}

impl<R: Clone + 'static> ColumnSelectorFactory for RowSelectorFactory<R> {
    fn make_selector(&self, name: &str) -> Box<dyn ColumnValueSelector> {
        if let Some(vc) = self.virtual_columns.get(name) {
            return vc.make_selector(self);
        }
        if name == TIME_COLUMN {
            return Box::new(RowTimeSelector {
                register: Rc::clone(&self.register),
                adapter: Rc::clone(&self.adapter),
            });
        }
        match self.adapter.column_fn(name) {
            Some(getter) => Box::new(RowColumnSelector {
                register: Rc::clone(&self.register),
                getter,
                declared: self.signature.column_type(name).flatten(),
                policy: self.policy,
            }),
            None => Box::new(NullSelector::new(self.policy)),
        }
    }

    fn null_policy(&self) -> NullPolicy {
        self.policy
    }
}

/// Reads one column of the current record, converted to its declared
/// type. A declared-but-untyped column passes values through unchanged.
struct RowColumnSelector<R> {
    register: Rc<RefCell<Option<R>>>,
    getter: ColumnFn<R>,
    declared: Option<ValueType>,
    policy: NullPolicy,
}

impl<R> RowColumnSelector<R> {
    fn value(&self) -> Value {
        self.register
            .borrow()
            .as_ref()
            .map(|row| (self.getter)(row))
            .unwrap_or(Value::Null)
            .coerce(self.declared)
    }
}

impl<R> ColumnValueSelector for RowColumnSelector<R> {
    fn get_long(&self) -> i64 {
        self.value().as_long().unwrap_or(0)
    }

    fn get_double(&self) -> f64 {
        self.value().as_double().unwrap_or(0.0)
    }

    fn get_float(&self) -> f32 {
        self.value().as_float().unwrap_or(0.0)
    }

    fn get_object(&self) -> Value {
        self.value()
    }

    fn is_null(&self) -> bool {
        if self.policy == NullPolicy::ReplaceWithDefault
            && self.declared.map(|t| t.is_numeric()).unwrap_or(false)
        {
            return false;
        }
        self.value().is_null()
    }
}

struct RowTimeSelector<R> {
    register: Rc<RefCell<Option<R>>>,
    adapter: Rc<dyn RowAdapter<R>>,
}

impl<R> RowTimeSelector<R> {
    fn timestamp(&self) -> Option<i64> {
        self.register
            .borrow()
            .as_ref()
            .map(|row| self.adapter.timestamp(row))
    }
}

impl<R> ColumnValueSelector for RowTimeSelector<R> {
    fn get_long(&self) -> i64 {
        self.timestamp().unwrap_or(0)
    }

    fn get_double(&self) -> f64 {
        self.get_long() as f64
    }

    fn get_float(&self) -> f32 {
        self.get_long() as f32
    }

    fn get_object(&self) -> Value {
        self.timestamp().map(Value::Long).unwrap_or(Value::Null)
    }

    fn is_null(&self) -> bool {
        false
    }
}
