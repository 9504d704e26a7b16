//! Fluent filter and query builders for Sophos Central listing endpoints.
//!
//! A [`FilterBuilder`] accumulates one predicate per field name; setting the
//! same field again replaces the earlier predicate in place. A [`Query`]
//! adds sorting, sparse field selection, free-text search, page size, cursor
//! and a client-side result limit on top, and [`Query::build`] turns the
//! whole thing into the flat `name=value` mapping the transport sends.
//!
//! ## Wire format
//!
//! | Predicate | Parameter |
//! |---|---|
//! | `equals` | `field=value` |
//! | `in_list` | `field=a,b,c` |
//! | `between` / `date_range` | `field=between:lo,hi` |
//! | `is_null` / `is_not_null` | `field=is_null` / `field=is_not_null` |
//! | everything else | `field=<op>:<value>` (`ne`, `gt`, `gte`, `lt`, `lte`, `contains`, `starts_with`, `ends_with`, `not_in`) |
//!
//! List values are always a single comma-joined parameter, never repeated
//! keys, so a list element that itself contains a comma is rejected.
//! Sorting is `sort=field:asc,other:desc` in declaration order.
//!
//! Builders never touch the network. Every validation failure surfaces from
//! `build()` as `SophosError::Validation` before any request is made.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Result, SophosError};

/// Flat query-parameter mapping sent by the transport.
pub type QueryParams = BTreeMap<String, String>;

/// Page size used when none is set.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Largest page size the API accepts.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Cursor parameter name.
pub const CURSOR_PARAM: &str = "pageFromKey";
/// Page-size parameter name.
pub const PAGE_SIZE_PARAM: &str = "pageSize";

/// Parameter names owned by [`Query`] that filters may not use.
pub const RESERVED_KEYS: &[&str] = &[
    PAGE_SIZE_PARAM,
    CURSOR_PARAM,
    "sort",
    "fields",
    "search",
    "searchFields",
];

// ── Values and operators ───────────────────────────────────────────────

/// A typed filter operand.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Free text, sent verbatim.
    Text(String),
    /// `true` / `false`.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Timestamp, sent as RFC 3339 with a `Z` suffix.
    Timestamp(DateTime<Utc>),
}

impl FilterValue {
    /// The value as it appears on the wire.
    pub fn to_wire(&self) -> String {
        match self {
            FilterValue::Text(s) => s.clone(),
            FilterValue::Bool(b) => b.to_string(),
            FilterValue::Int(i) => i.to_string(),
            FilterValue::UInt(u) => u.to_string(),
            FilterValue::Timestamp(t) => t.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Text(v)
    }
}

impl From<&String> for FilterValue {
    fn from(v: &String) -> Self {
        FilterValue::Text(v.clone())
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Bool(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        FilterValue::Int(i64::from(v))
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<u32> for FilterValue {
    fn from(v: u32) -> Self {
        FilterValue::UInt(u64::from(v))
    }
}

impl From<u64> for FilterValue {
    fn from(v: u64) -> Self {
        FilterValue::UInt(v)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(v: DateTime<Utc>) -> Self {
        FilterValue::Timestamp(v)
    }
}

/// Comparison a filter applies to its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Exact match.
    Equals,
    /// Anything but the value.
    NotEquals,
    /// Strictly greater.
    GreaterThan,
    /// Greater or equal.
    GreaterOrEqual,
    /// Strictly less.
    LessThan,
    /// Less or equal.
    LessOrEqual,
    /// Substring match.
    Contains,
    /// Prefix match.
    StartsWith,
    /// Suffix match.
    EndsWith,
    /// Matches any listed value.
    InList,
    /// Matches none of the listed values.
    NotInList,
    /// Inclusive range; exactly two bounds.
    Between,
    /// Field is absent.
    IsNull,
    /// Field is present.
    IsNotNull,
}

impl FilterOperator {
    /// Wire prefix for operators that carry one.
    pub fn token(self) -> &'static str {
        match self {
            FilterOperator::Equals => "eq",
            FilterOperator::NotEquals => "ne",
            FilterOperator::GreaterThan => "gt",
            FilterOperator::GreaterOrEqual => "gte",
            FilterOperator::LessThan => "lt",
            FilterOperator::LessOrEqual => "lte",
            FilterOperator::Contains => "contains",
            FilterOperator::StartsWith => "starts_with",
            FilterOperator::EndsWith => "ends_with",
            FilterOperator::InList => "in",
            FilterOperator::NotInList => "not_in",
            FilterOperator::Between => "between",
            FilterOperator::IsNull => "is_null",
            FilterOperator::IsNotNull => "is_not_null",
        }
    }

    /// Checks the operand count for this operator.
    fn check_arity(self, field: &str, count: usize) -> Result<()> {
        let ok = match self {
            FilterOperator::IsNull | FilterOperator::IsNotNull => count == 0,
            FilterOperator::Between => count == 2,
            FilterOperator::InList | FilterOperator::NotInList => count >= 1,
            _ => count == 1,
        };
        if ok {
            return Ok(());
        }
        let expected = match self {
            FilterOperator::IsNull | FilterOperator::IsNotNull => "no operands",
            FilterOperator::Between => "exactly two bounds",
            FilterOperator::InList | FilterOperator::NotInList => "at least one value",
            _ => "exactly one value",
        };
        Err(SophosError::validation(format!(
            "filter '{field}' with operator '{}' requires {expected}, got {count}",
            self.token()
        )))
    }
}

/// One predicate: field, operator, operands.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Field name as the API spells it.
    pub field: String,
    /// Comparison applied.
    pub operator: FilterOperator,
    /// Operands, in order.
    pub values: Vec<FilterValue>,
}

impl Filter {
    /// Serializes the right-hand side of `field=...`, validating first.
    pub fn to_wire(&self) -> Result<String> {
        if self.field.trim().is_empty() {
            return Err(SophosError::validation("filter field name must not be empty"));
        }
        if RESERVED_KEYS.contains(&self.field.as_str()) {
            return Err(SophosError::validation(format!(
                "'{}' is a reserved query parameter and cannot be filtered on",
                self.field
            )));
        }
        self.operator.check_arity(&self.field, self.values.len())?;

        let joined = join_values(&self.field, &self.values)?;
        Ok(match self.operator {
            FilterOperator::Equals | FilterOperator::InList => joined,
            FilterOperator::IsNull | FilterOperator::IsNotNull => self.operator.token().to_string(),
            op => format!("{}:{joined}", op.token()),
        })
    }
}

fn join_values(field: &str, values: &[FilterValue]) -> Result<String> {
    let wire: Vec<String> = values.iter().map(FilterValue::to_wire).collect();
    if values.len() > 1 {
        if let Some(bad) = wire.iter().find(|v| v.contains(',')) {
            return Err(SophosError::validation(format!(
                "value '{bad}' for filter '{field}' contains a comma, which is the list separator"
            )));
        }
    }
    Ok(wire.join(","))
}

// ── FilterBuilder ──────────────────────────────────────────────────────

/// Accumulates predicates keyed by field name (last write wins).
///
/// ```
/// use sophos_central::query::FilterBuilder;
///
/// let params = FilterBuilder::new()
///     .equals("type", "computer")
///     .in_list("healthStatus", ["bad", "suspicious"])
///     .build()
///     .unwrap();
/// assert_eq!(params["healthStatus"], "bad,suspicious");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterBuilder {
    filters: Vec<Filter>,
}

impl FilterBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a predicate, replacing any earlier one on the same field
    /// without moving it.
    pub fn filter<I, V>(mut self, field: &str, operator: FilterOperator, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        let filter = Filter {
            field: field.to_string(),
            operator,
            values: values.into_iter().map(Into::into).collect(),
        };
        match self.filters.iter_mut().find(|f| f.field == field) {
            Some(existing) => *existing = filter,
            None => self.filters.push(filter),
        }
        self
    }

    fn single(self, field: &str, operator: FilterOperator, value: impl Into<FilterValue>) -> Self {
        self.filter(field, operator, [value.into()])
    }

    /// `field == value`.
    pub fn equals(self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.single(field, FilterOperator::Equals, value)
    }

    /// `field != value`.
    pub fn not_equals(self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.single(field, FilterOperator::NotEquals, value)
    }

    /// `field > value`.
    pub fn greater_than(self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.single(field, FilterOperator::GreaterThan, value)
    }

    /// `field >= value`.
    pub fn greater_or_equal(self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.single(field, FilterOperator::GreaterOrEqual, value)
    }

    /// `field < value`.
    pub fn less_than(self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.single(field, FilterOperator::LessThan, value)
    }

    /// `field <= value`.
    pub fn less_or_equal(self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.single(field, FilterOperator::LessOrEqual, value)
    }

    /// Substring match.
    pub fn contains(self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.single(field, FilterOperator::Contains, value)
    }

    /// Alias for [`contains`](Self::contains).
    pub fn search(self, field: &str, text: &str) -> Self {
        self.contains(field, text)
    }

    /// Prefix match.
    pub fn starts_with(self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.single(field, FilterOperator::StartsWith, value)
    }

    /// Suffix match.
    pub fn ends_with(self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.single(field, FilterOperator::EndsWith, value)
    }

    /// Matches any of `values`, sent comma-joined.
    pub fn in_list<I, V>(self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        self.filter(field, FilterOperator::InList, values)
    }

    /// Matches none of `values`.
    pub fn not_in_list<I, V>(self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        self.filter(field, FilterOperator::NotInList, values)
    }

    /// Inclusive range `[low, high]`.
    pub fn between(self, field: &str, low: impl Into<FilterValue>, high: impl Into<FilterValue>) -> Self {
        self.filter(field, FilterOperator::Between, [low.into(), high.into()])
    }

    /// Inclusive range from a runtime list of bounds. Anything other than
    /// exactly two bounds fails at `build()`.
    pub fn between_values<I, V>(self, field: &str, bounds: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        self.filter(field, FilterOperator::Between, bounds)
    }

    /// Inclusive timestamp range. Both ends are required; a missing end
    /// fails at `build()`.
    pub fn date_range(self, field: &str, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.filter(field, FilterOperator::Between, start.into_iter().chain(end))
    }

    /// Field is absent.
    pub fn is_null(self, field: &str) -> Self {
        self.filter(field, FilterOperator::IsNull, std::iter::empty::<FilterValue>())
    }

    /// Field is present.
    pub fn is_not_null(self, field: &str) -> Self {
        self.filter(field, FilterOperator::IsNotNull, std::iter::empty::<FilterValue>())
    }

    /// Removes every predicate.
    pub fn clear(mut self) -> Self {
        self.filters.clear();
        self
    }

    /// The predicate recorded for `field`, if any.
    pub fn get(&self, field: &str) -> Option<&Filter> {
        self.filters.iter().find(|f| f.field == field)
    }

    /// Predicates in first-declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }

    /// Number of distinct fields filtered on.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// True when no predicate has been recorded.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Serializes every predicate into a parameter mapping.
    pub fn build(&self) -> Result<QueryParams> {
        let mut params = QueryParams::new();
        self.write_into(&mut params)?;
        Ok(params)
    }

    fn write_into(&self, params: &mut QueryParams) -> Result<()> {
        for filter in &self.filters {
            params.insert(filter.field.clone(), filter.to_wire()?);
        }
        Ok(())
    }
}

// ── Sorting ────────────────────────────────────────────────────────────

/// Sort order for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    /// `asc` or `desc`.
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = SophosError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(SophosError::validation(format!(
                "invalid sort direction '{other}', expected 'asc' or 'desc'"
            ))),
        }
    }
}

// ── Query ──────────────────────────────────────────────────────────────

/// Filters plus sorting, paging, field selection and search.
///
/// `limit` caps how many items `Paginator::collect_all` returns. It never
/// changes the page size sent to the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    filters: FilterBuilder,
    sorts: Vec<(String, SortDirection)>,
    page_size: u32,
    cursor: Option<String>,
    fields: Vec<String>,
    limit: Option<usize>,
    search: Option<String>,
    search_fields: Vec<String>,
}

impl Default for Query {
    fn default() -> Self {
        Query {
            filters: FilterBuilder::new(),
            sorts: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            cursor: None,
            fields: Vec::new(),
            limit: None,
            search: None,
            search_fields: Vec::new(),
        }
    }
}

impl Query {
    /// An empty query with the default page size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Edits the filter set in place.
    ///
    /// ```
    /// use sophos_central::query::Query;
    ///
    /// let q = Query::new().filter(|f| f.equals("type", "server"));
    /// assert_eq!(q.build().unwrap()["type"], "server");
    /// ```
    pub fn filter(mut self, edit: impl FnOnce(FilterBuilder) -> FilterBuilder) -> Self {
        self.filters = edit(self.filters);
        self
    }

    /// Replaces the filter set.
    pub fn with_filters(mut self, filters: FilterBuilder) -> Self {
        self.filters = filters;
        self
    }

    /// The current filter set.
    pub fn filters(&self) -> &FilterBuilder {
        &self.filters
    }

    /// Adds or re-directs a sort key. Re-declaring a field keeps its
    /// original position.
    pub fn sort_by(mut self, field: &str, direction: SortDirection) -> Self {
        match self.sorts.iter_mut().find(|(f, _)| f.as_str() == field) {
            Some(entry) => entry.1 = direction,
            None => self.sorts.push((field.to_string(), direction)),
        }
        self
    }

    /// Sort ascending by `field`.
    pub fn sort_ascending(self, field: &str) -> Self {
        self.sort_by(field, SortDirection::Asc)
    }

    /// Sort descending by `field`.
    pub fn sort_descending(self, field: &str) -> Self {
        self.sort_by(field, SortDirection::Desc)
    }

    /// Sort keys in declaration order.
    pub fn sorts(&self) -> &[(String, SortDirection)] {
        &self.sorts
    }

    /// Server page size (1–1000, checked at build).
    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// The page size that will be sent.
    pub fn requested_page_size(&self) -> u32 {
        self.page_size
    }

    /// Starts listing from an opaque server cursor.
    pub fn cursor(mut self, key: &str) -> Self {
        self.cursor = Some(key.to_string());
        self
    }

    /// Sparse field selection.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Client-side cap on collected items.
    pub fn limit(mut self, max_items: usize) -> Self {
        self.limit = Some(max_items);
        self
    }

    /// The client-side cap, if set.
    pub fn result_limit(&self) -> Option<usize> {
        self.limit
    }

    /// Free-text search term.
    pub fn search(mut self, text: &str) -> Self {
        self.search = Some(text.to_string());
        self
    }

    /// Fields the free-text search applies to.
    pub fn search_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Serializes the query into wire parameters.
    ///
    /// Pure: calling it twice on the same query yields identical output.
    pub fn build(&self) -> Result<QueryParams> {
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(SophosError::validation(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }

        let mut params = QueryParams::new();
        self.filters.write_into(&mut params)?;
        params.insert(PAGE_SIZE_PARAM.to_string(), self.page_size.to_string());

        if let Some(cursor) = self.cursor.as_deref().filter(|c| !c.is_empty()) {
            params.insert(CURSOR_PARAM.to_string(), cursor.to_string());
        }
        if !self.sorts.is_empty() {
            let sort = self
                .sorts
                .iter()
                .map(|(field, dir)| check_list_item("sort", field).map(|f| format!("{f}:{}", dir.as_str())))
                .collect::<Result<Vec<_>>>()?;
            params.insert("sort".to_string(), sort.join(","));
        }
        if !self.fields.is_empty() {
            params.insert("fields".to_string(), join_names("fields", &self.fields)?);
        }
        if let Some(text) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
            params.insert("search".to_string(), text.to_string());
        }
        if !self.search_fields.is_empty() {
            params.insert("searchFields".to_string(), join_names("searchFields", &self.search_fields)?);
        }
        Ok(params)
    }

    /// URL-encoded form of [`build`](Self::build), for logging and display.
    pub fn to_query_string(&self) -> Result<String> {
        let params = self.build()?;
        serde_urlencoded::to_string(&params)
            .map_err(|e| SophosError::validation(format!("query cannot be encoded: {e}")))
    }
}

fn check_list_item<'a>(param: &str, item: &'a str) -> Result<&'a str> {
    if item.trim().is_empty() || item.contains(',') {
        return Err(SophosError::validation(format!(
            "invalid {param} entry '{item}': must be non-empty and contain no commas"
        )));
    }
    Ok(item)
}

fn join_names(param: &str, names: &[String]) -> Result<String> {
    let checked = names
        .iter()
        .map(|n| check_list_item(param, n))
        .collect::<Result<Vec<_>>>()?;
    Ok(checked.join(","))
}
