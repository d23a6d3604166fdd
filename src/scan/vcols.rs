//! Virtual (computed) columns
//!
//! A virtual column derives its value from other columns at the same row,
//! lazily, with no materialization. Virtual columns may reference other
//! virtual columns; the registry rejects cycles at construction.

use std::collections::HashSet;
use std::rc::Rc;

use ahash::AHashMap;

use crate::data::{ColumnCapabilities, Value, ValueType};
use crate::scan::selector::{
    ColumnInspector, ColumnSelectorFactory, ColumnValueSelector,
};
use crate::scan::vector::{ObjectVectorSelector, VectorSelectorFactory};
use crate::{ConfigError, Result};

/// A named, computed column.
pub trait VirtualColumn {
    fn name(&self) -> &str;

    fn capabilities(&self, inspector: &dyn ColumnInspector) -> Option<ColumnCapabilities>;

    /// Columns (physical or virtual) this column reads.
    fn required_columns(&self) -> Vec<String>;

    fn make_selector(&self, factory: &dyn ColumnSelectorFactory) -> Box<dyn ColumnValueSelector>;

    fn make_vector_selector(&self, factory: &dyn VectorSelectorFactory) -> ObjectVectorSelector;

    fn can_vectorize(&self, inspector: &dyn ColumnInspector) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
}

/// Small arithmetic expression over column references and literals.
/// Arithmetic on two longs stays long; anything else promotes to double;
/// null operands make the result null.
#[derive(Debug, Clone)]
pub enum Expr {
    Column(String),
    Literal(Value),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Expr {
        Expr::Column(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Expr {
        Expr::Literal(value.into())
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn eval(&self, resolve: &mut dyn FnMut(&str) -> Value) -> Value {
        match self {
            Expr::Column(name) => resolve(name),
            Expr::Literal(v) => v.clone(),
            Expr::Binary { op, lhs, rhs } => {
                let l = lhs.eval(resolve);
                let r = rhs.eval(resolve);
                apply(*op, &l, &r)
            }
        }
    }

    pub fn referenced_columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<String>) {
        match self {
            Expr::Column(name) => {
                if !out.iter().any(|n| n == name) {
                    out.push(name.clone());
                }
            }
            Expr::Literal(_) => {}
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_columns(out);
                rhs.collect_columns(out);
            }
        }
    }
}

fn apply(op: BinaryOp, l: &Value, r: &Value) -> Value {
    if let (Value::Long(a), Value::Long(b)) = (l, r) {
        return match op {
            BinaryOp::Add => Value::Long(a.wrapping_add(*b)),
            BinaryOp::Sub => Value::Long(a.wrapping_sub(*b)),
            BinaryOp::Mul => Value::Long(a.wrapping_mul(*b)),
        };
    }
    match (l.as_double(), r.as_double()) {
        (Some(a), Some(b)) => match op {
            BinaryOp::Add => Value::Double(a + b),
            BinaryOp::Sub => Value::Double(a - b),
            BinaryOp::Mul => Value::Double(a * b),
        },
        _ => Value::Null,
    }
}

/// Virtual column computing an expression, with a declared output type.
pub struct ExpressionVirtualColumn {
    name: String,
    expression: Rc<Expr>,
    output_type: ValueType,
}

impl ExpressionVirtualColumn {
    pub fn new(name: impl Into<String>, expression: Expr, output_type: ValueType) -> Self {
        Self {
            name: name.into(),
            expression: Rc::new(expression),
            output_type,
        }
    }
}

impl VirtualColumn for ExpressionVirtualColumn {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self, _inspector: &dyn ColumnInspector) -> Option<ColumnCapabilities> {
        Some(ColumnCapabilities::from_declared(self.output_type))
    }

    fn required_columns(&self) -> Vec<String> {
        self.expression.referenced_columns()
    }

    fn make_selector(&self, factory: &dyn ColumnSelectorFactory) -> Box<dyn ColumnValueSelector> {
        let children = self
            .required_columns()
            .into_iter()
            .map(|name| {
                let selector = factory.make_selector(&name);
                (name, selector)
            })
            .collect();
        Box::new(ExpressionSelector {
            expression: Rc::clone(&self.expression),
            output_type: self.output_type,
            children,
        })
    }

    fn make_vector_selector(&self, factory: &dyn VectorSelectorFactory) -> ObjectVectorSelector {
        let children = self
            .required_columns()
            .into_iter()
            .map(|name| {
                let selector = factory.make_object_selector(&name);
                (name, selector)
            })
            .collect();
        ObjectVectorSelector::expression(
            Rc::clone(&self.expression),
            self.output_type,
            children,
            factory.window(),
        )
    }

    fn can_vectorize(&self, _inspector: &dyn ColumnInspector) -> bool {
        true
    }
}

struct ExpressionSelector {
    expression: Rc<Expr>,
    output_type: ValueType,
    children: Vec<(String, Box<dyn ColumnValueSelector>)>,
}

impl ExpressionSelector {
    fn value(&self) -> Value {
        let children = &self.children;
        let mut resolve = |name: &str| -> Value {
            children
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, s)| s.get_object())
                .unwrap_or(Value::Null)
        };
        self.expression
            .eval(&mut resolve)
            .coerce(Some(self.output_type))
    }
}

impl ColumnValueSelector for ExpressionSelector {
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
        self.value().is_null()
    }
}

/// The set of virtual columns declared by one build spec.
#[derive(Clone, Default)]
pub struct VirtualColumns {
    columns: Vec<Rc<dyn VirtualColumn>>,
    by_name: AHashMap<String, usize>,
}

impl std::fmt::Debug for VirtualColumns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualColumns")
            .field("names", &self.by_name.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl VirtualColumns {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validates name uniqueness and the absence of reference cycles.
    pub fn create(columns: Vec<Rc<dyn VirtualColumn>>) -> Result<Self> {
        let mut by_name = AHashMap::new();
        for (idx, column) in columns.iter().enumerate() {
            if by_name.insert(column.name().to_string(), idx).is_some() {
                return Err(
                    ConfigError::DuplicateColumnName(column.name().to_string()).into()
                );
            }
        }
        let vcs = Self { columns, by_name };
        vcs.check_cycles()?;
        Ok(vcs)
    }

    fn check_cycles(&self) -> Result<()> {
        for column in &self.columns {
            let mut visiting = HashSet::new();
            self.visit(column.name(), &mut visiting)?;
        }
        Ok(())
    }

    fn visit<'s>(&'s self, name: &'s str, visiting: &mut HashSet<&'s str>) -> Result<()> {
        let Some(&idx) = self.by_name.get(name) else {
            return Ok(()); // physical reference, no cycle through here
        };
        if !visiting.insert(name) {
            return Err(ConfigError::CyclicVirtualColumn(name.to_string()).into());
        }
        for required in self.columns[idx].required_columns() {
            if let Some(&next) = self.by_name.get(required.as_str()) {
                self.visit(self.columns[next].name(), visiting)?;
            }
        }
        visiting.remove(name);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Rc<dyn VirtualColumn>> {
        self.by_name.get(name).map(|&idx| &self.columns[idx])
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name()).collect()
    }

    /// Virtual names must never shadow what the segment already exposes.
    pub fn check_no_shadowing(&self, exists: impl Fn(&str) -> bool) -> Result<()> {
        for column in &self.columns {
            if exists(column.name()) {
                return Err(
                    ConfigError::DuplicateColumnName(column.name().to_string()).into()
                );
            }
        }
        Ok(())
    }

    pub fn can_vectorize(&self, inspector: &dyn ColumnInspector) -> bool {
        self.columns.iter().all(|c| c.can_vectorize(inspector))
    }
}
