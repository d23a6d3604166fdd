//! Filters and filter bundles
//!
//! A filter answers a scan in up to two ways: a precomputed bitmap of
//! matching rows (when the touched columns carry indexes) and/or a
//! per-row value matcher evaluated through selectors. The bundle carries
//! whichever representations the filter can offer; the cursor holder
//! picks the iteration strategy from what is present.

use std::fmt;
use std::rc::Rc;

use regex::Regex;
use roaring::RoaringBitmap;

use crate::data::{parse_long, ColumnCapabilities, Value, ValueType};
use crate::scan::selector::{ColumnInspector, ColumnSelectorFactory};
use crate::scan::vector::{
    AndVectorMatcher, NotVectorMatcher, OrVectorMatcher, PredicateVectorMatcher,
    VectorSelectorFactory, VectorValueMatcher,
};
use crate::Result;

/// Per-row predicate bound to a selector factory's current position.
pub type ValueMatcher = Box<dyn Fn() -> bool>;

/// Access to per-value bitmap indexes during bundle construction.
pub trait BitmapIndexSelector {
    fn num_rows(&self) -> u32;

    fn has_bitmap_index(&self, column: &str) -> bool;

    /// Bitmap of rows holding `value` (`None` for null), when indexed.
    fn value_bitmap(&self, column: &str, value: Option<&str>) -> Option<Rc<RoaringBitmap>>;
}

/// Debug description of how a bundle was partitioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInfo {
    pub index: Option<String>,
    pub matcher: Option<String>,
}

impl fmt::Display for BundleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.index, &self.matcher) {
            (Some(i), Some(m)) => write!(f, "index={i}, matcher={m}"),
            (Some(i), None) => write!(f, "index={i}"),
            (None, Some(m)) => write!(f, "matcher={m}"),
            (None, None) => write!(f, "empty"),
        }
    }
}

/// A precomputed bitmap of matching rows plus its description.
pub struct BitmapHolder {
    pub bitmap: Rc<RoaringBitmap>,
    pub info: String,
}

/// Factory for the matcher half of a bundle: produces scalar or vector
/// matchers against whatever selector factory the cursor ends up using.
pub struct MatcherBundle {
    filter: Rc<dyn Filter>,
    info: String,
}

impl MatcherBundle {
    pub fn new(filter: Rc<dyn Filter>) -> Self {
        let info = filter.describe();
        Self { filter, info }
    }

    pub fn filter(&self) -> &Rc<dyn Filter> {
        &self.filter
    }

    pub fn info(&self) -> &str {
        &self.info
    }

    pub fn value_matcher(&self, factory: &dyn ColumnSelectorFactory) -> ValueMatcher {
        self.filter.make_matcher(factory)
    }

    pub fn vector_matcher(&self, factory: &dyn VectorSelectorFactory) -> Box<dyn VectorValueMatcher> {
        self.filter.make_vector_matcher(factory)
    }

    pub fn can_vectorize(&self, inspector: &dyn ColumnInspector) -> bool {
        self.filter.can_vectorize_matcher(inspector)
    }
}

/// What a filter offers for one scan: either, both, or neither half.
pub struct FilterBundle {
    pub index: Option<BitmapHolder>,
    pub matcher: Option<MatcherBundle>,
}

impl FilterBundle {
    pub fn info(&self) -> BundleInfo {
        BundleInfo {
            index: self.index.as_ref().map(|i| i.info.clone()),
            matcher: self.matcher.as_ref().map(|m| m.info.clone()),
        }
    }

    pub fn can_vectorize_matcher(&self, inspector: &dyn ColumnInspector) -> bool {
        self.matcher
            .as_ref()
            .map(|m| m.can_vectorize(inspector))
            .unwrap_or(true)
    }
}

/// A row predicate, opaque to the scan beyond this contract.
pub trait Filter {
    /// Short human-readable form, used in bundle info and debug logs.
    fn describe(&self) -> String;

    fn required_columns(&self) -> Vec<String>;

    /// Decide which representations to offer given the available indexes.
    /// `total_rows` is the segment size; `applied_rows` is how many rows
    /// remain after bundles already applied upstream; `cnf_already` marks
    /// that conjunctive normalization has been tried.
    fn make_filter_bundle(
        self: Rc<Self>,
        selector: &dyn BitmapIndexSelector,
        total_rows: u32,
        applied_rows: u32,
        cnf_already: bool,
    ) -> Result<FilterBundle>;

    fn make_matcher(&self, factory: &dyn ColumnSelectorFactory) -> ValueMatcher;

    fn make_vector_matcher(&self, factory: &dyn VectorSelectorFactory)
        -> Box<dyn VectorValueMatcher>;

    fn can_vectorize_matcher(&self, _inspector: &dyn ColumnInspector) -> bool {
        true
    }
}

fn matcher_only(filter: Rc<dyn Filter>) -> FilterBundle {
    FilterBundle {
        index: None,
        matcher: Some(MatcherBundle::new(filter)),
    }
}

fn index_only(bitmap: Rc<RoaringBitmap>, info: String) -> FilterBundle {
    FilterBundle {
        index: Some(BitmapHolder { bitmap, info }),
        matcher: None,
    }
}

/// Predicate over already-read values, shared by the object matcher path
/// and the vector matcher path. The target string is coerced to the
/// column's type, mirroring the typed scalar matchers.
fn value_predicate(
    capabilities: Option<&ColumnCapabilities>,
    target: Option<&str>,
) -> Box<dyn Fn(&Value) -> bool> {
    let Some(target) = target else {
        return Box::new(|v| v.is_null());
    };
    match capabilities.map(|c| c.value_type) {
        Some(ValueType::Long) => match parse_long(target) {
            Some(t) => Box::new(move |v| v.as_long() == Some(t)),
            None => Box::new(|_| false),
        },
        Some(ValueType::Double) => match target.trim().parse::<f64>() {
            Ok(t) => Box::new(move |v| v.as_double() == Some(t)),
            Err(_) => Box::new(|_| false),
        },
        Some(ValueType::Float) => match target.trim().parse::<f32>() {
            Ok(t) => Box::new(move |v| v.as_float() == Some(t)),
            Err(_) => Box::new(|_| false),
        },
        _ => {
            let target = target.to_string();
            Box::new(move |v| v.as_text().as_deref() == Some(target.as_str()))
        }
    }
}

/// Equality against a single value; `None` matches null (and therefore
/// matches every row of a column that does not exist).
pub struct SelectorFilter {
    column: String,
    value: Option<String>,
}

impl SelectorFilter {
    pub fn new(column: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            column: column.into(),
            value: value.map(|v| v.to_string()),
        }
    }
}

impl Filter for SelectorFilter {
    fn describe(&self) -> String {
        match &self.value {
            Some(v) => format!("{} = {}", self.column, v),
            None => format!("{} is null", self.column),
        }
    }

    fn required_columns(&self) -> Vec<String> {
        vec![self.column.clone()]
    }

    fn make_filter_bundle(
        self: Rc<Self>,
        selector: &dyn BitmapIndexSelector,
        _total_rows: u32,
        _applied_rows: u32,
        _cnf_already: bool,
    ) -> Result<FilterBundle> {
        if selector.has_bitmap_index(&self.column) {
            if let Some(bitmap) = selector.value_bitmap(&self.column, self.value.as_deref()) {
                let info = self.describe();
                return Ok(index_only(bitmap, info));
            }
        }
        Ok(matcher_only(self))
    }

    fn make_matcher(&self, factory: &dyn ColumnSelectorFactory) -> ValueMatcher {
        let capabilities = factory.column_capabilities(&self.column);
        let selector = factory.make_selector(&self.column);

        let Some(target) = self.value.clone() else {
            return Box::new(move || selector.get_object().is_null());
        };

        match capabilities.map(|c| c.value_type) {
            Some(ValueType::Long) => match parse_long(&target) {
                Some(t) => Box::new(move || !selector.is_null() && selector.get_long() == t),
                None => Box::new(|| false),
            },
            Some(ValueType::Double) => match target.trim().parse::<f64>() {
                Ok(t) => Box::new(move || !selector.is_null() && selector.get_double() == t),
                Err(_) => Box::new(|| false),
            },
            Some(ValueType::Float) => match target.trim().parse::<f32>() {
                Ok(t) => Box::new(move || !selector.is_null() && selector.get_float() == t),
                Err(_) => Box::new(|| false),
            },
            _ => Box::new(move || {
                selector.get_object().as_text().as_deref() == Some(target.as_str())
            }),
        }
    }

    fn make_vector_matcher(
        &self,
        factory: &dyn VectorSelectorFactory,
    ) -> Box<dyn VectorValueMatcher> {
        let capabilities = factory.column_capabilities(&self.column);
        let pred = value_predicate(capabilities.as_ref(), self.value.as_deref());
        Box::new(PredicateVectorMatcher::new(
            factory.make_object_selector(&self.column),
            factory.window(),
            pred,
        ))
    }
}

/// Membership in a set of values (`None` entries match null).
pub struct InFilter {
    column: String,
    values: Vec<Option<String>>,
}

impl InFilter {
    pub fn new(column: impl Into<String>, values: Vec<Option<&str>>) -> Self {
        Self {
            column: column.into(),
            values: values
                .into_iter()
                .map(|v| v.map(|s| s.to_string()))
                .collect(),
        }
    }
}

impl Filter for InFilter {
    fn describe(&self) -> String {
        format!("{} in ({} values)", self.column, self.values.len())
    }

    fn required_columns(&self) -> Vec<String> {
        vec![self.column.clone()]
    }

    fn make_filter_bundle(
        self: Rc<Self>,
        selector: &dyn BitmapIndexSelector,
        _total_rows: u32,
        _applied_rows: u32,
        _cnf_already: bool,
    ) -> Result<FilterBundle> {
        if selector.has_bitmap_index(&self.column) {
            let mut union = RoaringBitmap::new();
            let mut all_present = true;
            for value in &self.values {
                match selector.value_bitmap(&self.column, value.as_deref()) {
                    Some(bitmap) => union |= &*bitmap,
                    None => {
                        all_present = false;
                        break;
                    }
                }
            }
            if all_present {
                let info = self.describe();
                return Ok(index_only(Rc::new(union), info));
            }
        }
        Ok(matcher_only(self))
    }

    fn make_matcher(&self, factory: &dyn ColumnSelectorFactory) -> ValueMatcher {
        let capabilities = factory.column_capabilities(&self.column);
        let selector = factory.make_selector(&self.column);
        let preds: Vec<_> = self
            .values
            .iter()
            .map(|v| value_predicate(capabilities.as_ref(), v.as_deref()))
            .collect();
        Box::new(move || {
            let value = selector.get_object();
            preds.iter().any(|p| p(&value))
        })
    }

    fn make_vector_matcher(
        &self,
        factory: &dyn VectorSelectorFactory,
    ) -> Box<dyn VectorValueMatcher> {
        let capabilities = factory.column_capabilities(&self.column);
        let preds: Vec<_> = self
            .values
            .iter()
            .map(|v| value_predicate(capabilities.as_ref(), v.as_deref()))
            .collect();
        Box::new(PredicateVectorMatcher::new(
            factory.make_object_selector(&self.column),
            factory.window(),
            Box::new(move |value| preds.iter().any(|p| p(value))),
        ))
    }
}

/// Inclusive numeric range. Nulls never match.
pub struct BoundFilter {
    column: String,
    lower: Option<f64>,
    upper: Option<f64>,
}

impl BoundFilter {
    pub fn new(column: impl Into<String>, lower: Option<f64>, upper: Option<f64>) -> Self {
        Self {
            column: column.into(),
            lower,
            upper,
        }
    }

    fn in_range(&self) -> impl Fn(&Value) -> bool {
        let lower = self.lower;
        let upper = self.upper;
        move |value: &Value| match value.as_double() {
            None => false,
            Some(v) => {
                lower.map(|l| v >= l).unwrap_or(true) && upper.map(|u| v <= u).unwrap_or(true)
            }
        }
    }
}

impl Filter for BoundFilter {
    fn describe(&self) -> String {
        format!(
            "{} in [{}, {}]",
            self.column,
            self.lower.map(|v| v.to_string()).unwrap_or_else(|| "-inf".into()),
            self.upper.map(|v| v.to_string()).unwrap_or_else(|| "+inf".into()),
        )
    }

    fn required_columns(&self) -> Vec<String> {
        vec![self.column.clone()]
    }

    fn make_filter_bundle(
        self: Rc<Self>,
        _selector: &dyn BitmapIndexSelector,
        _total_rows: u32,
        _applied_rows: u32,
        _cnf_already: bool,
    ) -> Result<FilterBundle> {
        Ok(matcher_only(self))
    }

    fn make_matcher(&self, factory: &dyn ColumnSelectorFactory) -> ValueMatcher {
        let selector = factory.make_selector(&self.column);
        let in_range = self.in_range();
        Box::new(move || in_range(&selector.get_object()))
    }

    fn make_vector_matcher(
        &self,
        factory: &dyn VectorSelectorFactory,
    ) -> Box<dyn VectorValueMatcher> {
        let in_range = self.in_range();
        Box::new(PredicateVectorMatcher::new(
            factory.make_object_selector(&self.column),
            factory.window(),
            Box::new(in_range),
        ))
    }
}

/// Compiled SQL LIKE pattern: `%` is any run, `_` any single character,
/// everything else literal.
pub struct LikeMatcher {
    regex: Regex,
}

impl LikeMatcher {
    pub fn new(pattern: &str) -> Self {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        for c in pattern.chars() {
            match c {
                '%' => expr.push_str(".*"),
                '_' => expr.push('.'),
                c => expr.push_str(&regex::escape(&c.to_string())),
            }
        }
        expr.push('$');
        // the pattern is fully escaped above, compilation cannot fail
        let regex = Regex::new(&expr).expect("escaped LIKE pattern");
        Self { regex }
    }

    #[inline]
    pub fn matches(&self, s: &str) -> bool {
        self.regex.is_match(s)
    }
}

/// SQL LIKE over a column's text rendering. Matcher-only: LIKE never has
/// a per-value bitmap.
pub struct LikeFilter {
    column: String,
    pattern: String,
    matcher: Rc<LikeMatcher>,
}

impl LikeFilter {
    pub fn new(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let matcher = Rc::new(LikeMatcher::new(&pattern));
        Self {
            column: column.into(),
            pattern,
            matcher,
        }
    }
}

impl Filter for LikeFilter {
    fn describe(&self) -> String {
        format!("{} like '{}'", self.column, self.pattern)
    }

    fn required_columns(&self) -> Vec<String> {
        vec![self.column.clone()]
    }

    fn make_filter_bundle(
        self: Rc<Self>,
        _selector: &dyn BitmapIndexSelector,
        _total_rows: u32,
        _applied_rows: u32,
        _cnf_already: bool,
    ) -> Result<FilterBundle> {
        Ok(matcher_only(self))
    }

    fn make_matcher(&self, factory: &dyn ColumnSelectorFactory) -> ValueMatcher {
        let selector = factory.make_selector(&self.column);
        let like = Rc::clone(&self.matcher);
        Box::new(move || {
            selector
                .get_object()
                .as_text()
                .map(|s| like.matches(&s))
                .unwrap_or(false)
        })
    }

    fn make_vector_matcher(
        &self,
        factory: &dyn VectorSelectorFactory,
    ) -> Box<dyn VectorValueMatcher> {
        let like = Rc::clone(&self.matcher);
        Box::new(PredicateVectorMatcher::new(
            factory.make_object_selector(&self.column),
            factory.window(),
            Box::new(move |v| v.as_text().map(|s| like.matches(&s)).unwrap_or(false)),
        ))
    }
}

/// Conjunction. Child indexes intersect; child matchers conjoin; a mix
/// yields a bundle with both halves.
pub struct AndFilter {
    filters: Vec<Rc<dyn Filter>>,
}

impl AndFilter {
    pub fn new(filters: Vec<Rc<dyn Filter>>) -> Self {
        Self { filters }
    }
}

impl Filter for AndFilter {
    fn describe(&self) -> String {
        let parts: Vec<_> = self.filters.iter().map(|f| f.describe()).collect();
        format!("and({})", parts.join(", "))
    }

    fn required_columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        for f in &self.filters {
            for c in f.required_columns() {
                if !out.contains(&c) {
                    out.push(c);
                }
            }
        }
        out
    }

    fn make_filter_bundle(
        self: Rc<Self>,
        selector: &dyn BitmapIndexSelector,
        total_rows: u32,
        applied_rows: u32,
        cnf_already: bool,
    ) -> Result<FilterBundle> {
        let mut index: Option<(RoaringBitmap, Vec<String>)> = None;
        let mut matcher_children: Vec<Rc<dyn Filter>> = Vec::new();
        let mut remaining = applied_rows;

        for child in &self.filters {
            let bundle =
                Rc::clone(child).make_filter_bundle(selector, total_rows, remaining, cnf_already)?;
            if let Some(holder) = bundle.index {
                remaining = (holder.bitmap.len() as u32).min(remaining);
                index = Some(match index {
                    None => ((*holder.bitmap).clone(), vec![holder.info]),
                    Some((acc, mut infos)) => {
                        infos.push(holder.info);
                        (&acc & &*holder.bitmap, infos)
                    }
                });
            }
            if let Some(matcher) = bundle.matcher {
                matcher_children.push(Rc::clone(matcher.filter()));
            }
        }

        Ok(FilterBundle {
            index: index.map(|(bitmap, infos)| BitmapHolder {
                bitmap: Rc::new(bitmap),
                info: format!("and({})", infos.join(", ")),
            }),
            matcher: if matcher_children.is_empty() {
                None
            } else {
                Some(MatcherBundle::new(Rc::new(AndFilter::new(matcher_children))))
            },
        })
    }

    fn make_matcher(&self, factory: &dyn ColumnSelectorFactory) -> ValueMatcher {
        let matchers: Vec<_> = self.filters.iter().map(|f| f.make_matcher(factory)).collect();
        Box::new(move || matchers.iter().all(|m| m()))
    }

    fn make_vector_matcher(
        &self,
        factory: &dyn VectorSelectorFactory,
    ) -> Box<dyn VectorValueMatcher> {
        let children: Vec<_> = self
            .filters
            .iter()
            .map(|f| f.make_vector_matcher(factory))
            .collect();
        Box::new(AndVectorMatcher::new(children))
    }

    fn can_vectorize_matcher(&self, inspector: &dyn ColumnInspector) -> bool {
        self.filters.iter().all(|f| f.can_vectorize_matcher(inspector))
    }
}

/// Disjunction. Index-only when every child offers an index; otherwise
/// the whole disjunction falls back to a matcher.
pub struct OrFilter {
    filters: Vec<Rc<dyn Filter>>,
}

impl OrFilter {
    pub fn new(filters: Vec<Rc<dyn Filter>>) -> Self {
        Self { filters }
    }
}

impl Filter for OrFilter {
    fn describe(&self) -> String {
        let parts: Vec<_> = self.filters.iter().map(|f| f.describe()).collect();
        format!("or({})", parts.join(", "))
    }

    fn required_columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        for f in &self.filters {
            for c in f.required_columns() {
                if !out.contains(&c) {
                    out.push(c);
                }
            }
        }
        out
    }

    fn make_filter_bundle(
        self: Rc<Self>,
        selector: &dyn BitmapIndexSelector,
        total_rows: u32,
        applied_rows: u32,
        cnf_already: bool,
    ) -> Result<FilterBundle> {
        let mut union = RoaringBitmap::new();
        let mut infos = Vec::new();
        let mut all_indexed = true;
        for child in &self.filters {
            let bundle = Rc::clone(child).make_filter_bundle(
                selector,
                total_rows,
                applied_rows,
                cnf_already,
            )?;
            match (bundle.index, bundle.matcher) {
                (Some(holder), None) => {
                    union |= &*holder.bitmap;
                    infos.push(holder.info);
                }
                // one non-indexable child forces the whole disjunction
                // through the matcher path
                _ => {
                    all_indexed = false;
                    break;
                }
            }
        }
        if all_indexed {
            Ok(index_only(
                Rc::new(union),
                format!("or({})", infos.join(", ")),
            ))
        } else {
            Ok(matcher_only(self))
        }
    }

    fn make_matcher(&self, factory: &dyn ColumnSelectorFactory) -> ValueMatcher {
        let matchers: Vec<_> = self.filters.iter().map(|f| f.make_matcher(factory)).collect();
        Box::new(move || matchers.iter().any(|m| m()))
    }

    fn make_vector_matcher(
        &self,
        factory: &dyn VectorSelectorFactory,
    ) -> Box<dyn VectorValueMatcher> {
        let children: Vec<_> = self
            .filters
            .iter()
            .map(|f| f.make_vector_matcher(factory))
            .collect();
        Box::new(OrVectorMatcher::new(children))
    }

    fn can_vectorize_matcher(&self, inspector: &dyn ColumnInspector) -> bool {
        self.filters.iter().all(|f| f.can_vectorize_matcher(inspector))
    }
}

/// Negation. Matcher-only: complementing a bitmap would also need the
/// not-null universe, which the matcher path gets for free.
pub struct NotFilter {
    filter: Rc<dyn Filter>,
}

impl NotFilter {
    pub fn new(filter: Rc<dyn Filter>) -> Self {
        Self { filter }
    }
}

impl Filter for NotFilter {
    fn describe(&self) -> String {
        format!("not({})", self.filter.describe())
    }

    fn required_columns(&self) -> Vec<String> {
        self.filter.required_columns()
    }

    fn make_filter_bundle(
        self: Rc<Self>,
        _selector: &dyn BitmapIndexSelector,
        _total_rows: u32,
        _applied_rows: u32,
        _cnf_already: bool,
    ) -> Result<FilterBundle> {
        Ok(matcher_only(self))
    }

    fn make_matcher(&self, factory: &dyn ColumnSelectorFactory) -> ValueMatcher {
        let inner = self.filter.make_matcher(factory);
        Box::new(move || !inner())
    }

    fn make_vector_matcher(
        &self,
        factory: &dyn VectorSelectorFactory,
    ) -> Box<dyn VectorValueMatcher> {
        let inner = self.filter.make_vector_matcher(factory);
        Box::new(NotVectorMatcher::new(inner, factory.window()))
    }

    fn can_vectorize_matcher(&self, inspector: &dyn ColumnInspector) -> bool {
        self.filter.can_vectorize_matcher(inspector)
    }
}

/// Matches every row. Bundles as a full-range index.
pub struct TrueFilter;

impl Filter for TrueFilter {
    fn describe(&self) -> String {
        "true".to_string()
    }

    fn required_columns(&self) -> Vec<String> {
        Vec::new()
    }

    fn make_filter_bundle(
        self: Rc<Self>,
        _selector: &dyn BitmapIndexSelector,
        total_rows: u32,
        _applied_rows: u32,
        _cnf_already: bool,
    ) -> Result<FilterBundle> {
        let mut bitmap = RoaringBitmap::new();
        if total_rows > 0 {
            bitmap.insert_range(0..total_rows);
        }
        Ok(index_only(Rc::new(bitmap), "true".to_string()))
    }

    fn make_matcher(&self, _factory: &dyn ColumnSelectorFactory) -> ValueMatcher {
        Box::new(|| true)
    }

    fn make_vector_matcher(
        &self,
        factory: &dyn VectorSelectorFactory,
    ) -> Box<dyn VectorValueMatcher> {
        Box::new(PredicateVectorMatcher::constant(factory.window(), true))
    }
}

/// Matches nothing. Bundles as an empty index.
pub struct FalseFilter;

impl Filter for FalseFilter {
    fn describe(&self) -> String {
        "false".to_string()
    }

    fn required_columns(&self) -> Vec<String> {
        Vec::new()
    }

    fn make_filter_bundle(
        self: Rc<Self>,
        _selector: &dyn BitmapIndexSelector,
        _total_rows: u32,
        _applied_rows: u32,
        _cnf_already: bool,
    ) -> Result<FilterBundle> {
        Ok(index_only(Rc::new(RoaringBitmap::new()), "false".to_string()))
    }

    fn make_matcher(&self, _factory: &dyn ColumnSelectorFactory) -> ValueMatcher {
        Box::new(|| false)
    }

    fn make_vector_matcher(
        &self,
        factory: &dyn VectorSelectorFactory,
    ) -> Box<dyn VectorValueMatcher> {
        Box::new(PredicateVectorMatcher::constant(factory.window(), false))
    }
}
