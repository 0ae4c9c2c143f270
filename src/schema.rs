use std::collections::HashMap;

/// Maps symbolic attribute names (typically kernel enum identifiers such as
/// `NL80211_ATTR_IFINDEX`) to their numeric ids.
///
/// Ids only need to be unique within one attribute-set scope, so the same
/// table serves a whole schema tree. Every name a schema mentions must be
/// present, or compilation fails.
pub type IdTable = HashMap<String, u16>;

/// The expected type of a single attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    U8,
    U16,
    S16,
    U32,
    U64,
    /// NUL-terminated ASCII string.
    Str,
    /// Opaque byte blob.
    Bytes,
    /// Presence-only attribute with an empty payload.
    Flag,
    /// Concatenation of fixed-size elements, no per-element header. An
    /// example in Linux is `NL80211_ATTR_STA_SUPPORTED_RATES`, an array of
    /// `u8` rate values.
    Array(Box<FieldType>),
    /// Sequence of attributes whose type ids are the 1-based position
    /// rather than a semantic identifier, each payload encoded by the
    /// element type. `NL80211_ATTR_IFTYPE_EXT_CAPA` is encoded this way.
    List(Box<FieldType>),
    /// A directly nested attribute set, as in `NL80211_ATTR_KEY`.
    Nested(Vec<FieldDef>),
}

impl FieldType {
    /// Shorthand for `Array(Box::new(elem))`.
    #[must_use]
    pub fn array(elem: FieldType) -> Self {
        Self::Array(Box::new(elem))
    }

    /// Shorthand for `List(Box::new(elem))`.
    #[must_use]
    pub fn list(elem: FieldType) -> Self {
        Self::List(Box::new(elem))
    }

    /// Shorthand for a list whose elements are nested attribute sets.
    #[must_use]
    pub fn list_of(fields: Vec<FieldDef>) -> Self {
        Self::List(Box::new(Self::Nested(fields)))
    }
}

/// Describes one attribute expected in an attribute set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Symbolic name, unique among siblings and present in the [`IdTable`].
    pub name: String,
    /// Overrides the short name derived from the sibling common prefix.
    pub short_name: Option<String>,
    pub ty: FieldType,
    /// Building fails when no value is supplied for a required attribute,
    /// and parsing fails when it is missing from the wire.
    pub required: bool,
}

impl FieldDef {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            short_name: None,
            ty,
            required: false,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn short(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = Some(short_name.into());
        self
    }
}
