use std::ops::Index;
use std::sync::Arc;

use indexmap::IndexMap;

/// A parsed (or to-be-built) attribute value.
///
/// Unsigned integers of any declared width widen to [`Uint`](Self::Uint)
/// and signed ones to [`Int`](Self::Int); the codec range-checks them
/// against the declared width when building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Uint(u64),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    Flag(bool),
    Array(Vec<AttrValue>),
    /// Positionally indexed elements; a slot is `None` when the wire held
    /// no entry for that position.
    List(Vec<Option<AttrValue>>),
    Set(AttrSet),
}

impl AttrValue {
    /// Build an [`Array`](Self::Array) value from plain elements.
    pub fn array<I>(elems: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<AttrValue>,
    {
        Self::Array(elems.into_iter().map(Into::into).collect())
    }

    /// Build a dense [`List`](Self::List) value from plain elements.
    pub fn list<I>(elems: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<AttrValue>,
    {
        Self::List(elems.into_iter().map(|e| Some(e.into())).collect())
    }

    /// Name of the variant, used in diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Uint(_) => "uint",
            Self::Int(_) => "int",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::Flag(_) => "flag",
            Self::Array(_) => "array",
            Self::List(_) => "list",
            Self::Set(_) => "set",
        }
    }

    #[must_use]
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Self::Uint(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[AttrValue]> {
        match self {
            Self::Array(elems) => Some(elems),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Option<AttrValue>]> {
        match self {
            Self::List(elems) => Some(elems),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_set(&self) -> Option<&AttrSet> {
        match self {
            Self::Set(set) => Some(set),
            _ => None,
        }
    }
}

impl From<u8> for AttrValue {
    fn from(v: u8) -> Self {
        Self::Uint(v.into())
    }
}

impl From<u16> for AttrValue {
    fn from(v: u16) -> Self {
        Self::Uint(v.into())
    }
}

impl From<u32> for AttrValue {
    fn from(v: u32) -> Self {
        Self::Uint(v.into())
    }
}

impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<i16> for AttrValue {
    fn from(v: i16) -> Self {
        Self::Int(v.into())
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        Self::Flag(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&[u8]> for AttrValue {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl From<Vec<u8>> for AttrValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<AttrSet> for AttrValue {
    fn from(v: AttrSet) -> Self {
        Self::Set(v)
    }
}

/// An ordered set of named attribute values.
///
/// Values are keyed by their symbolic name in insertion order, which for a
/// parsed set is the wire order. A second, read-only view keyed by the
/// scope's short names delegates to the symbolic map, so a parsed message
/// can be navigated as either `attrs["NL80211_ATTR_IFINDEX"]` or
/// `attrs.get_short("ifindex")`.
#[derive(Debug, Clone)]
pub struct AttrSet {
    values: IndexMap<String, AttrValue>,
    short_names: Arc<IndexMap<String, String>>,
}

impl AttrSet {
    /// An empty set with no short-name view; the usual starting point for
    /// build input.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: IndexMap::new(),
            short_names: Arc::new(IndexMap::new()),
        }
    }

    pub(crate) fn with_short_names(
        values: IndexMap<String, AttrValue>,
        short_names: Arc<IndexMap<String, String>>,
    ) -> Self {
        Self {
            values,
            short_names,
        }
    }

    /// Look up a value by symbolic name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.values.get(name)
    }

    /// Look up a value by short name.
    #[must_use]
    pub fn get_short(&self, short_name: &str) -> Option<&AttrValue> {
        self.get(self.short_names.get(short_name)?)
    }

    /// Insert a value under its symbolic name, keeping insertion order.
    /// Re-inserting a name overwrites in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Symbolic names and values in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Symbolic names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// The scope's short-name → symbolic-name mapping.
    pub fn short_names(&self) -> impl Iterator<Item = (&str, &str)> {
        self.short_names
            .iter()
            .map(|(short, name)| (short.as_str(), name.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for AttrSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Equality considers the values only; the short-name view is derived from
/// the codec, not from the data.
impl PartialEq for AttrSet {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl Eq for AttrSet {}

impl Index<&str> for AttrSet {
    type Output = AttrValue;

    fn index(&self, name: &str) -> &AttrValue {
        self.get(name)
            .unwrap_or_else(|| panic!("no attribute named {name:?}"))
    }
}

impl<S: Into<String>, V: Into<AttrValue>> FromIterator<(S, V)> for AttrSet {
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, value) in iter {
            set.insert(name, value);
        }
        set
    }
}

impl<'a> IntoIterator for &'a AttrSet {
    type Item = (&'a String, &'a AttrValue);
    type IntoIter = indexmap::map::Iter<'a, String, AttrValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}
