//! Hierarchical cache keys and per-feature key factories.
//!
//! A [`CacheKey`] is an ordered list of segments shaped like
//! `[feature, subresource?, operation, params?]`. Keys are compared
//! structurally: two requests for the same logical resource with the same
//! filters produce equal keys regardless of the order filters were added in.
//!
//! Invalidation works on subtrees. A key `K` belongs to the subtree rooted at
//! `P` when `K.starts_with(&P)`, so `accounts.lists()` covers every filtered
//! `accounts.list(..)` key.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

// ============================================================================
// FILTER VALUES
// ============================================================================

/// A scalar or enumerable filter value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Render the value the way it is sent in a query string.
    pub fn to_query_string(&self) -> String {
        match self {
            FilterValue::Bool(b) => b.to_string(),
            FilterValue::Int(i) => i.to_string(),
            FilterValue::Float(f) => f.to_string(),
            FilterValue::Str(s) => s.clone(),
            FilterValue::List(items) => items
                .iter()
                .map(FilterValue::to_query_string)
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

// Floats compare by bit pattern so keys stay `Eq + Hash`.
impl PartialEq for FilterValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FilterValue::Bool(a), FilterValue::Bool(b)) => a == b,
            (FilterValue::Int(a), FilterValue::Int(b)) => a == b,
            (FilterValue::Float(a), FilterValue::Float(b)) => a.to_bits() == b.to_bits(),
            (FilterValue::Str(a), FilterValue::Str(b)) => a == b,
            (FilterValue::List(a), FilterValue::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FilterValue {}

impl Hash for FilterValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            FilterValue::Bool(b) => b.hash(state),
            FilterValue::Int(i) => i.hash(state),
            FilterValue::Float(f) => f.to_bits().hash(state),
            FilterValue::Str(s) => s.hash(state),
            FilterValue::List(items) => items.hash(state),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Int(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        FilterValue::Int(i64::from(value))
    }
}

impl From<u32> for FilterValue {
    fn from(value: u32) -> Self {
        FilterValue::Int(i64::from(value))
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Float(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Str(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Str(value)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// FILTER PARAMS
// ============================================================================

/// Filter mapping attached to list keys.
///
/// Backed by a `BTreeMap`, so insertion order never affects equality or
/// hashing. Missing values are dropped instead of stored, which keeps
/// `{status: None}` and `{}` on the same cache entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterParams(BTreeMap<String, FilterValue>);

impl FilterParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`FilterParams::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Builder form of [`FilterParams::insert_opt`].
    pub fn with_opt<V>(mut self, key: impl Into<String>, value: Option<V>) -> Self
    where
        V: Into<FilterValue>,
    {
        self.insert_opt(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FilterValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Set an optional filter. `None` removes the filter entirely.
    pub fn insert_opt<V>(&mut self, key: impl Into<String>, value: Option<V>)
    where
        V: Into<FilterValue>,
    {
        let key = key.into();
        match value {
            Some(value) => {
                self.0.insert(key, value.into());
            }
            None => {
                self.0.remove(&key);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.0.iter()
    }

    /// True when every filter in `self` is present with the same value in `other`.
    pub fn is_subset_of(&self, other: &FilterParams) -> bool {
        self.0
            .iter()
            .all(|(key, value)| other.0.get(key) == Some(value))
    }

    /// Query-string pairs; list values expand into repeated keys.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.0.len());
        for (key, value) in &self.0 {
            match value {
                FilterValue::List(items) => {
                    for item in items {
                        pairs.push((key.clone(), item.to_query_string()));
                    }
                }
                other => pairs.push((key.clone(), other.to_query_string())),
            }
        }
        pairs
    }
}

impl<K, V> FromIterator<(K, Option<V>)> for FilterParams
where
    K: Into<String>,
    V: Into<FilterValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, Option<V>)>>(iter: I) -> Self {
        let mut params = FilterParams::new();
        for (key, value) in iter {
            params.insert_opt(key, value);
        }
        params
    }
}

// ============================================================================
// CACHE KEYS
// ============================================================================

/// One segment of a [`CacheKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeySegment {
    /// Feature, subresource or operation name.
    Static(Cow<'static, str>),
    /// Identifier of a single record.
    Id(String),
    /// Filters of a list query.
    Params(FilterParams),
}

impl KeySegment {
    /// Prefix matching rule: params match by subset, everything else by equality.
    fn covers(&self, other: &KeySegment) -> bool {
        match (self, other) {
            (KeySegment::Params(prefix), KeySegment::Params(params)) => {
                prefix.is_subset_of(params)
            }
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySegment::Static(name) => f.write_str(name),
            KeySegment::Id(id) => f.write_str(id),
            KeySegment::Params(params) => {
                let rendered = params
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join("&");
                f.write_str(&rendered)
            }
        }
    }
}

/// Structured identifier for a memoized read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(Vec<KeySegment>);

impl CacheKey {
    /// Root key for a feature namespace.
    pub fn root(feature: impl Into<Cow<'static, str>>) -> Self {
        Self(vec![KeySegment::Static(feature.into())])
    }

    /// A new key extending this one by a static segment.
    pub fn child(&self, name: impl Into<Cow<'static, str>>) -> Self {
        self.extend(KeySegment::Static(name.into()))
    }

    /// A new key extending this one by a record id.
    pub fn id(&self, id: impl Into<String>) -> Self {
        self.extend(KeySegment::Id(id.into()))
    }

    /// A new key extending this one by filters. Empty filters add nothing.
    pub fn params(&self, params: &FilterParams) -> Self {
        if params.is_empty() {
            return self.clone();
        }
        self.extend(KeySegment::Params(params.clone()))
    }

    fn extend(&self, segment: KeySegment) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend(self.0.iter().cloned());
        segments.push(segment);
        Self(segments)
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Name of the feature namespace this key belongs to.
    pub fn feature(&self) -> Option<&str> {
        match self.0.first() {
            Some(KeySegment::Static(name)) => Some(name),
            _ => None,
        }
    }

    /// True when `self` lies in the subtree rooted at `prefix`.
    pub fn starts_with(&self, prefix: &CacheKey) -> bool {
        if prefix.0.len() > self.0.len() {
            return false;
        }
        prefix
            .0
            .iter()
            .zip(self.0.iter())
            .all(|(p, s)| p.covers(s))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("/");
        f.write_str(&rendered)
    }
}

// ============================================================================
// KEY FACTORY
// ============================================================================

const LIST: &str = "list";
const DETAIL: &str = "detail";

/// Produces the keys of one feature (or sub-collection) namespace.
///
/// ```
/// use meridian_core::{FilterParams, KeyFactory};
///
/// let accounts = KeyFactory::new("accounts");
/// let page = FilterParams::new().with("page", 1);
/// assert!(accounts.list(&page).starts_with(&accounts.lists()));
/// assert!(accounts.detail("A1").starts_with(&accounts.all()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyFactory {
    root: CacheKey,
}

impl KeyFactory {
    pub fn new(feature: impl Into<Cow<'static, str>>) -> Self {
        Self {
            root: CacheKey::root(feature),
        }
    }

    /// Factory for a sub-collection nested under this namespace.
    pub fn scoped(&self, subresource: impl Into<Cow<'static, str>>) -> Self {
        Self {
            root: self.root.child(subresource),
        }
    }

    pub fn all(&self) -> CacheKey {
        self.root.clone()
    }

    pub fn lists(&self) -> CacheKey {
        self.root.child(LIST)
    }

    pub fn list(&self, filters: &FilterParams) -> CacheKey {
        self.lists().params(filters)
    }

    pub fn details(&self) -> CacheKey {
        self.root.child(DETAIL)
    }

    pub fn detail(&self, id: impl Into<String>) -> CacheKey {
        self.details().id(id)
    }

    /// Key for a feature-specific operation, e.g. a summary view.
    pub fn operation(&self, name: impl Into<Cow<'static, str>>) -> CacheKey {
        self.root.child(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_keys_ignore_insertion_order() {
        let keys = KeyFactory::new("accounts");
        let a = FilterParams::new().with("page", 1).with("status", "active");
        let b = FilterParams::new().with("status", "active").with("page", 1);
        assert_eq!(keys.list(&a), keys.list(&b));
    }

    #[test]
    fn test_missing_filter_does_not_partition() {
        let keys = KeyFactory::new("accounts");
        let with_none = FilterParams::new()
            .with("page", 1)
            .with_opt("status", None::<&str>);
        let without = FilterParams::new().with("page", 1);
        assert_eq!(keys.list(&with_none), keys.list(&without));

        let empty = FilterParams::new().with_opt("status", None::<String>);
        assert_eq!(keys.list(&empty), keys.lists());
    }

    #[test]
    fn test_insert_none_clears_previous_value() {
        let mut params = FilterParams::new().with("status", "open");
        params.insert_opt("status", None::<&str>);
        assert!(params.is_empty());
    }

    #[test]
    fn test_distinct_queries_produce_distinct_keys() {
        let accounts = KeyFactory::new("accounts");
        let invoices = KeyFactory::new("invoices");
        assert_ne!(accounts.lists(), invoices.lists());
        assert_ne!(accounts.detail("1"), accounts.detail("2"));
        assert_ne!(accounts.lists(), accounts.details());
        assert_ne!(
            accounts.list(&FilterParams::new().with("page", 1)),
            accounts.list(&FilterParams::new().with("page", 2))
        );
        // An id segment never collides with a static segment of the same text.
        assert_ne!(accounts.details().id("list"), accounts.details().child("list"));
    }

    #[test]
    fn test_subtree_membership() {
        let accounts = KeyFactory::new("accounts");
        let filtered = accounts.list(&FilterParams::new().with("page", 2));
        assert!(filtered.starts_with(&accounts.all()));
        assert!(filtered.starts_with(&accounts.lists()));
        assert!(!filtered.starts_with(&accounts.details()));
        assert!(!accounts.lists().starts_with(&filtered));
    }

    #[test]
    fn test_params_prefix_matches_by_subset() {
        let contacts = KeyFactory::new("accounts").scoped("contacts");
        let full = contacts.list(
            &FilterParams::new()
                .with("account_id", "A1")
                .with("page", 3),
        );
        let scope = contacts.list(&FilterParams::new().with("account_id", "A1"));
        let other = contacts.list(&FilterParams::new().with("account_id", "A2"));
        assert!(full.starts_with(&scope));
        assert!(!full.starts_with(&other));
    }

    #[test]
    fn test_scoped_factory_nests_under_parent() {
        let accounts = KeyFactory::new("accounts");
        let contacts = accounts.scoped("contacts");
        assert!(contacts.lists().starts_with(&accounts.all()));
        assert!(!contacts.lists().starts_with(&accounts.lists()));
        assert_eq!(contacts.all().feature(), Some("accounts"));
    }

    #[test]
    fn test_float_filters_are_hashable() {
        use std::collections::HashSet;
        let keys = KeyFactory::new("invoices");
        let mut set = HashSet::new();
        set.insert(keys.list(&FilterParams::new().with("min_amount", 10.5)));
        set.insert(keys.list(&FilterParams::new().with("min_amount", 10.5)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_query_pairs_expand_lists() {
        let params = FilterParams::new()
            .with("status", vec!["open", "draft"])
            .with("page", 1);
        assert_eq!(
            params.to_query_pairs(),
            vec![
                ("page".to_string(), "1".to_string()),
                ("status".to_string(), "open".to_string()),
                ("status".to_string(), "draft".to_string()),
            ]
        );
    }

    #[test]
    fn test_display_renders_segments() {
        let keys = KeyFactory::new("accounts");
        let key = keys.list(&FilterParams::new().with("page", 1).with("q", "acme"));
        assert_eq!(key.to_string(), "accounts/list/page=1&q=acme");
    }
}
