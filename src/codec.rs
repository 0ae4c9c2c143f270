use std::collections::HashMap;
use std::sync::Arc;
use std::{error, fmt};

use indexmap::IndexMap;
use log::warn;

use crate::attrs::{AttrSet, AttrValue};
use crate::schema::{FieldDef, FieldType, IdTable};
use crate::wire::{self, put_attr, Nla, NlaIter};

/// Schema compilation, build and parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A schema name has no entry in the id table.
    UnknownName(String),
    /// Array element type has no fixed size.
    ElementNotFixedSize(&'static str),
    /// Build input contains names the schema does not declare.
    UnknownAttributes(Vec<String>),
    /// Short-keyed build input contains unknown short names.
    UnknownShortNames {
        names: Vec<String>,
        supported: Vec<String>,
    },
    /// Required attributes absent from build input or parse output.
    MissingRequired(Vec<String>),
    /// Value variant does not match the declared attribute type.
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
    /// Integer out of range for the declared width.
    IntOverflow { kind: &'static str, value: i128 },
    /// String contains non-ASCII data.
    NotAscii,
    /// Leaf payload has the wrong size.
    WrongLength { expected: usize, found: usize },
    /// Array payload is not a whole number of elements.
    TrailingBytes { elem_size: usize, len: usize },
    /// List positions no longer fit the 16-bit type-id field.
    ListTooLong(usize),
    Wire(wire::Error),
    /// A child codec failed; annotated with the child's symbolic name and
    /// codec kind.
    Child {
        name: String,
        kind: &'static str,
        source: Box<Error>,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownName(name) => {
                write!(f, "no id table entry for attribute name {name:?}")
            }
            Self::ElementNotFixedSize(kind) => write!(
                f,
                "can only build arrays of fixed-size elements ({kind} has no fixed size)"
            ),
            Self::UnknownAttributes(names) => {
                write!(f, "unknown attributes: {}", names.join(", "))
            }
            Self::UnknownShortNames { names, supported } => write!(
                f,
                "unsupported short names {} (supported: {})",
                names.join(", "),
                supported.join(", ")
            ),
            Self::MissingRequired(names) => {
                write!(f, "missing required attributes: {}", names.join(", "))
            }
            Self::WrongType { expected, found } => {
                write!(f, "expected a {expected} value, got {found}")
            }
            Self::IntOverflow { kind, value } => {
                write!(f, "value {value} out of range for {kind}")
            }
            Self::NotAscii => f.write_str("string is not ASCII"),
            Self::WrongLength { expected, found } => {
                write!(f, "expected a {expected}-byte payload, got {found} byte(s)")
            }
            Self::TrailingBytes { elem_size, len } => write!(
                f,
                "payload of {len} byte(s) is not a multiple of the {elem_size}-byte element size"
            ),
            Self::ListTooLong(len) => {
                write!(f, "list of {len} elements overflows the 16-bit position id")
            }
            Self::Wire(err) => err.fmt(f),
            Self::Child { name, kind, source } => {
                write!(f, "got \"{source}\" while handling attribute {name:?} of type {kind}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Wire(err) => Some(err),
            Self::Child { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<wire::Error> for Error {
    fn from(err: wire::Error) -> Self {
        Self::Wire(err)
    }
}

fn wrong_type(expected: &'static str, found: &AttrValue) -> Error {
    Error::WrongType {
        expected,
        found: found.kind_name(),
    }
}

/// Annotate an error with the child it came from, unless a deeper codec
/// already did.
fn annotate(name: &str, codec: &Codec, err: Error) -> Error {
    match err {
        Error::Child { .. } => err,
        err => Error::Child {
            name: name.to_owned(),
            kind: codec.kind_name(),
            source: Box::new(err),
        },
    }
}

/// Fixed-width integer attribute kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntKind {
    U8,
    U16,
    S16,
    U32,
    U64,
}

impl IntKind {
    fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 | Self::S16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::S16 => "s16",
            Self::U32 => "u32",
            Self::U64 => "u64",
        }
    }

    fn build(self, value: &AttrValue) -> Result<Vec<u8>, Error> {
        let v: i128 = match value {
            AttrValue::Uint(v) => (*v).into(),
            AttrValue::Int(v) => (*v).into(),
            other => return Err(wrong_type(self.name(), other)),
        };
        let overflow = |_| Error::IntOverflow {
            kind: self.name(),
            value: v,
        };
        Ok(match self {
            Self::U8 => u8::try_from(v).map_err(overflow)?.to_ne_bytes().to_vec(),
            Self::U16 => u16::try_from(v).map_err(overflow)?.to_ne_bytes().to_vec(),
            Self::S16 => i16::try_from(v).map_err(overflow)?.to_ne_bytes().to_vec(),
            Self::U32 => u32::try_from(v).map_err(overflow)?.to_ne_bytes().to_vec(),
            Self::U64 => u64::try_from(v).map_err(overflow)?.to_ne_bytes().to_vec(),
        })
    }

    fn parse(self, data: &[u8]) -> Result<AttrValue, Error> {
        if data.len() != self.size() {
            return Err(Error::WrongLength {
                expected: self.size(),
                found: data.len(),
            });
        }
        Ok(match self {
            Self::U8 => AttrValue::Uint(data[0].into()),
            Self::U16 => AttrValue::Uint(u16::from_ne_bytes(data.try_into().unwrap()).into()),
            Self::S16 => AttrValue::Int(i16::from_ne_bytes(data.try_into().unwrap()).into()),
            Self::U32 => AttrValue::Uint(u32::from_ne_bytes(data.try_into().unwrap()).into()),
            Self::U64 => AttrValue::Uint(u64::from_ne_bytes(data.try_into().unwrap())),
        })
    }
}

/// One compiled codec node. Collections own their element codec; sets own
/// one codec per declared child, which is how schema nesting recurses.
#[derive(Debug, Clone)]
enum Codec {
    Int(IntKind),
    Str,
    Bytes,
    Flag,
    Array(ArrayCodec),
    List(ListCodec),
    Set(AttrSetCodec),
}

impl Codec {
    fn from_type(ty: &FieldType, ids: &Arc<HashMap<String, u16>>) -> Result<Self, Error> {
        Ok(match ty {
            FieldType::U8 => Self::Int(IntKind::U8),
            FieldType::U16 => Self::Int(IntKind::U16),
            FieldType::S16 => Self::Int(IntKind::S16),
            FieldType::U32 => Self::Int(IntKind::U32),
            FieldType::U64 => Self::Int(IntKind::U64),
            FieldType::Str => Self::Str,
            FieldType::Bytes => Self::Bytes,
            FieldType::Flag => Self::Flag,
            FieldType::Array(elem) => {
                let elem = Self::from_type(elem, ids)?;
                let elem_size = elem
                    .fixed_size()
                    .ok_or(Error::ElementNotFixedSize(elem.kind_name()))?;
                Self::Array(ArrayCodec {
                    elem: Box::new(elem),
                    elem_size,
                })
            }
            FieldType::List(elem) => Self::List(ListCodec {
                elem: Box::new(Self::from_type(elem, ids)?),
            }),
            FieldType::Nested(fields) => {
                Self::Set(AttrSetCodec::from_fields(fields, Arc::clone(ids))?)
            }
        })
    }

    /// Element size for array members; only integers qualify.
    fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::Int(kind) => Some(kind.size()),
            _ => None,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::Int(kind) => kind.name(),
            Self::Str => "str",
            Self::Bytes => "bytes",
            Self::Flag => "flag",
            Self::Array(_) => "array",
            Self::List(_) => "list",
            Self::Set(_) => "set",
        }
    }

    fn build(&self, value: &AttrValue) -> Result<Vec<u8>, Error> {
        match self {
            Self::Int(kind) => kind.build(value),
            Self::Str => match value {
                AttrValue::Str(s) => {
                    if !s.is_ascii() {
                        return Err(Error::NotAscii);
                    }
                    let mut payload = Vec::with_capacity(s.len() + 1);
                    payload.extend_from_slice(s.as_bytes());
                    payload.push(0);
                    Ok(payload)
                }
                other => Err(wrong_type("str", other)),
            },
            Self::Bytes => match value {
                AttrValue::Bytes(bytes) => Ok(bytes.clone()),
                other => Err(wrong_type("bytes", other)),
            },
            // Presence is the enclosing set's decision; the payload itself
            // is always empty.
            Self::Flag => match value {
                AttrValue::Flag(_) => Ok(Vec::new()),
                other => Err(wrong_type("flag", other)),
            },
            Self::Array(array) => array.build(value),
            Self::List(list) => list.build(value),
            Self::Set(set) => match value {
                AttrValue::Set(attrs) => set.build(attrs),
                other => Err(wrong_type("set", other)),
            },
        }
    }

    fn parse(&self, data: &[u8]) -> Result<AttrValue, Error> {
        match self {
            Self::Int(kind) => kind.parse(data),
            Self::Str => {
                // Strip at most one trailing NUL.
                let end = data.len() - usize::from(data.last() == Some(&0));
                let s = std::str::from_utf8(&data[..end]).map_err(|_| Error::NotAscii)?;
                if !s.is_ascii() {
                    return Err(Error::NotAscii);
                }
                Ok(AttrValue::Str(s.to_owned()))
            }
            Self::Bytes => Ok(AttrValue::Bytes(data.to_vec())),
            Self::Flag => Ok(AttrValue::Flag(true)),
            Self::Array(array) => array.parse(data),
            Self::List(list) => list.parse(data),
            Self::Set(set) => Ok(AttrValue::Set(set.parse(data)?)),
        }
    }
}

/// Fixed-stride concatenation with no per-element headers.
#[derive(Debug, Clone)]
struct ArrayCodec {
    elem: Box<Codec>,
    elem_size: usize,
}

impl ArrayCodec {
    fn build(&self, value: &AttrValue) -> Result<Vec<u8>, Error> {
        let elems = value.as_array().ok_or_else(|| wrong_type("array", value))?;
        let mut payload = Vec::with_capacity(elems.len() * self.elem_size);
        for elem in elems {
            payload.extend_from_slice(&self.elem.build(elem)?);
        }
        Ok(payload)
    }

    fn parse(&self, data: &[u8]) -> Result<AttrValue, Error> {
        if data.len() % self.elem_size != 0 {
            return Err(Error::TrailingBytes {
                elem_size: self.elem_size,
                len: data.len(),
            });
        }
        let mut elems = Vec::with_capacity(data.len() / self.elem_size);
        for chunk in data.chunks_exact(self.elem_size) {
            elems.push(self.elem.parse(chunk)?);
        }
        Ok(AttrValue::Array(elems))
    }
}

/// Elements wrapped in attribute headers whose type ids are the 1-based
/// position in the sequence.
#[derive(Debug, Clone)]
struct ListCodec {
    elem: Box<Codec>,
}

impl ListCodec {
    fn build(&self, value: &AttrValue) -> Result<Vec<u8>, Error> {
        let slots = value.as_list().ok_or_else(|| wrong_type("list", value))?;
        let mut buf = Vec::new();
        for (index, slot) in slots.iter().enumerate() {
            // Empty slots emit nothing but keep their position, so a
            // sparse parse result rebuilds to the same bytes.
            let Some(elem) = slot else { continue };
            let type_id =
                u16::try_from(index + 1).map_err(|_| Error::ListTooLong(slots.len()))?;
            let payload = self.elem.build(elem)?;
            put_attr(&mut buf, type_id, &payload)?;
        }
        Ok(buf)
    }

    fn parse(&self, data: &[u8]) -> Result<AttrValue, Error> {
        let mut slots: Vec<Option<AttrValue>> = Vec::new();
        for item in NlaIter::new(data) {
            let nla = item?;
            if nla.type_id == 0 {
                warn!("ignoring list entry with position id 0");
                continue;
            }
            let index = usize::from(nla.type_id) - 1;
            if slots.len() <= index {
                slots.resize(index + 1, None);
            }
            slots[index] = Some(self.elem.parse(nla.payload)?);
        }
        Ok(AttrValue::List(slots))
    }
}

/// A compiled attribute-set scope: the codec for one level of a schema.
///
/// Compiled once via [`from_schema`](Self::from_schema), then shared
/// read-only; concurrent [`build`](Self::build) and [`parse`](Self::parse)
/// calls are independent.
#[derive(Debug, Clone)]
pub struct AttrSetCodec {
    children: IndexMap<String, Codec>,
    /// The full name→id table, shared by every scope so diagnostics can
    /// name candidates from anywhere in the schema.
    ids: Arc<HashMap<String, u16>>,
    required: Vec<String>,
    short_names: Arc<IndexMap<String, String>>,
}

impl AttrSetCodec {
    /// Compile a schema into a codec tree.
    ///
    /// Fails if any symbolic name is missing from `ids` or an array element
    /// type has no fixed size.
    pub fn from_schema(fields: &[FieldDef], ids: IdTable) -> Result<Self, Error> {
        Self::from_fields(fields, Arc::new(ids))
    }

    fn from_fields(fields: &[FieldDef], ids: Arc<HashMap<String, u16>>) -> Result<Self, Error> {
        let prefix = scope_prefix(fields);
        let mut children = IndexMap::with_capacity(fields.len());
        let mut short_names = IndexMap::with_capacity(fields.len());
        let mut required = Vec::new();
        for field in fields {
            if !ids.contains_key(&field.name) {
                return Err(Error::UnknownName(field.name.clone()));
            }
            let short = match &field.short_name {
                Some(short) => short.clone(),
                None => derive_short_name(&field.name, &prefix),
            };
            short_names.insert(short, field.name.clone());
            if field.required {
                required.push(field.name.clone());
            }
            children.insert(field.name.clone(), Codec::from_type(&field.ty, &ids)?);
        }
        Ok(Self {
            children,
            ids,
            required,
            short_names: Arc::new(short_names),
        })
    }

    /// Numeric id of a declared child; compilation checked the entry exists.
    fn id_of(&self, name: &str) -> u16 {
        self.ids[name]
    }

    /// Short-name → symbolic-name mapping of this scope, in declaration
    /// order.
    pub fn short_names(&self) -> impl Iterator<Item = (&str, &str)> {
        self.short_names
            .iter()
            .map(|(short, name)| (short.as_str(), name.as_str()))
    }

    /// Serialize an attribute set keyed by symbolic names.
    ///
    /// Attributes are emitted in the input's iteration order. Flag values
    /// emit a header-only attribute when true and nothing at all when
    /// false.
    pub fn build(&self, attrs: &AttrSet) -> Result<Vec<u8>, Error> {
        let unknown: Vec<String> = attrs
            .names()
            .filter(|name| !self.children.contains_key(*name))
            .map(str::to_owned)
            .collect();
        if !unknown.is_empty() {
            return Err(Error::UnknownAttributes(unknown));
        }
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|name| attrs.get(name).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(Error::MissingRequired(missing));
        }

        let mut buf = Vec::new();
        for (name, value) in attrs.iter() {
            let codec = &self.children[name];
            let type_id = self.id_of(name);
            if let Codec::Flag = codec {
                match value {
                    AttrValue::Flag(true) => put_attr(&mut buf, type_id, &[])?,
                    AttrValue::Flag(false) => {}
                    other => return Err(annotate(name, codec, wrong_type("flag", other))),
                }
                continue;
            }
            let payload = codec.build(value).map_err(|err| annotate(name, codec, err))?;
            put_attr(&mut buf, type_id, &payload)?;
        }
        Ok(buf)
    }

    /// Serialize an attribute set keyed by this scope's short names.
    ///
    /// Keys are translated to symbolic names and handed to
    /// [`build`](Self::build), preserving the caller's order.
    pub fn build_short(&self, attrs: &AttrSet) -> Result<Vec<u8>, Error> {
        let unknown: Vec<String> = attrs
            .names()
            .filter(|name| !self.short_names.contains_key(*name))
            .map(str::to_owned)
            .collect();
        if !unknown.is_empty() {
            return Err(Error::UnknownShortNames {
                names: unknown,
                supported: self.short_names.keys().cloned().collect(),
            });
        }
        let translated: AttrSet = attrs
            .iter()
            .map(|(short, value)| (self.short_names[short].clone(), value.clone()))
            .collect();
        self.build(&translated)
    }

    /// Parse an attribute-set payload into a value tree.
    ///
    /// Attributes with an id the scope does not declare are skipped with a
    /// warning. Child failures are annotated with the child's name.
    pub fn parse(&self, data: &[u8]) -> Result<AttrSet, Error> {
        let mut values = IndexMap::new();
        for item in NlaIter::new(data) {
            let nla = item?;
            let Some((name, codec)) = self
                .children
                .iter()
                .find(|(name, _)| self.id_of(name) == nla.type_id)
            else {
                self.warn_unknown(&nla);
                continue;
            };
            let value = codec
                .parse(nla.payload)
                .map_err(|err| annotate(name, codec, err))?;
            values.insert(name.clone(), value);
        }

        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|name| !values.contains_key(*name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(Error::MissingRequired(missing));
        }

        // A flag's absence is meaningful: report it as explicitly false.
        for (name, codec) in &self.children {
            if matches!(codec, Codec::Flag) && !values.contains_key(name) {
                values.insert(name.clone(), AttrValue::Flag(false));
            }
        }

        Ok(AttrSet::with_short_names(
            values,
            Arc::clone(&self.short_names),
        ))
    }

    fn warn_unknown(&self, nla: &Nla<'_>) {
        let mut candidates: Vec<&str> = self
            .ids
            .iter()
            .filter(|&(_, &id)| id == nla.type_id || id == nla.kind())
            .map(|(name, _)| name.as_str())
            .collect();
        candidates.sort_unstable();
        let flags = nla.flags();
        let flag_note = if flags.is_empty() {
            String::new()
        } else {
            format!(" (flags {flags:?})")
        };
        if candidates.is_empty() {
            warn!("ignoring unknown attribute {}{}", nla.type_id, flag_note);
        } else {
            warn!(
                "ignoring unknown attribute {}{}; could be {}",
                nla.type_id,
                flag_note,
                candidates.join(", ")
            );
        }
    }
}

/// Longest common prefix of the scope's symbolic names, cut back so that
/// it ends on an underscore. `MY_ATTR_FOO`/`MY_ATTR_FOOD` share
/// `MY_ATTR_FOO`, but the usable prefix is `MY_ATTR_`.
fn scope_prefix(fields: &[FieldDef]) -> String {
    let mut names = fields.iter().map(|field| field.name.as_str());
    let Some(mut prefix) = names.next() else {
        return String::new();
    };
    for name in names {
        let common = prefix
            .char_indices()
            .zip(name.chars())
            .find(|((_, a), b)| a != b)
            .map(|((i, _), _)| i)
            .unwrap_or_else(|| prefix.len().min(name.len()));
        prefix = &prefix[..common];
    }
    match prefix.rfind('_') {
        Some(pos) => prefix[..=pos].to_owned(),
        None => String::new(),
    }
}

/// Strip the scope prefix and lowercase. Falls back to the full lowercase
/// name when stripping would leave nothing.
fn derive_short_name(name: &str, prefix: &str) -> String {
    match name.strip_prefix(prefix) {
        Some(rest) if !rest.is_empty() => rest.to_lowercase(),
        _ => name.to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(names: &[&str]) -> Vec<FieldDef> {
        names
            .iter()
            .map(|name| FieldDef::new(*name, FieldType::U32))
            .collect()
    }

    #[test]
    fn test_scope_prefix() {
        assert_eq!("MY_ATTR_", scope_prefix(&fields(&["MY_ATTR_FOO", "MY_ATTR_BAR"])));
        assert_eq!("MY_ATTR_", scope_prefix(&fields(&["MY_ATTR_FOO", "MY_ATTR_FOOD"])));
        assert_eq!("ATTR_", scope_prefix(&fields(&["ATTR_FOO"])));
        assert_eq!("", scope_prefix(&fields(&["ALPHA", "BETA"])));
        assert_eq!("", scope_prefix(&fields(&[])));
    }

    #[test]
    fn test_derive_short_name() {
        assert_eq!("foo", derive_short_name("MY_ATTR_FOO", "MY_ATTR_"));
        assert_eq!("food", derive_short_name("MY_ATTR_FOOD", "MY_ATTR_"));
        assert_eq!("alpha", derive_short_name("ALPHA", ""));
        // Stripping the whole name falls back to the full name.
        assert_eq!("foo_", derive_short_name("FOO_", "FOO_"));
    }

    #[test]
    fn test_compile_rejects_unknown_name() {
        let err = AttrSetCodec::from_schema(
            &[FieldDef::new("ATTR_MISSING", FieldType::U8)],
            IdTable::new(),
        )
        .unwrap_err();
        assert_eq!(Error::UnknownName("ATTR_MISSING".into()), err);
    }

    #[test]
    fn test_compile_rejects_variable_size_array_elements() {
        let ids = IdTable::from([("ATTR_NAMES".to_owned(), 1)]);
        let err = AttrSetCodec::from_schema(
            &[FieldDef::new("ATTR_NAMES", FieldType::array(FieldType::Str))],
            ids,
        )
        .unwrap_err();
        assert_eq!(Error::ElementNotFixedSize("str"), err);
    }

    #[test]
    fn test_int_overflow() {
        assert_eq!(
            Err(Error::IntOverflow { kind: "u8", value: 256 }),
            IntKind::U8.build(&AttrValue::Uint(256))
        );
        assert_eq!(
            Err(Error::IntOverflow { kind: "s16", value: 0x8000 }),
            IntKind::S16.build(&AttrValue::Uint(0x8000))
        );
        assert_eq!(
            Err(Error::IntOverflow { kind: "u32", value: -1 }),
            IntKind::U32.build(&AttrValue::Int(-1))
        );
    }

    #[test]
    fn test_int_roundtrip() {
        let buf = IntKind::S16.build(&AttrValue::Int(-2)).unwrap();
        assert_eq!((-2i16).to_ne_bytes().to_vec(), buf);
        assert_eq!(AttrValue::Int(-2), IntKind::S16.parse(&buf).unwrap());
    }

    #[test]
    fn test_str_trailing_nul() {
        assert_eq!(Ok(b"hi\0".to_vec()), Codec::Str.build(&"hi".into()));
        assert_eq!(Ok(AttrValue::Str("hi".into())), Codec::Str.parse(b"hi\0"));
        // At most one NUL is stripped, and a missing NUL is tolerated.
        assert_eq!(Ok(AttrValue::Str("hi\0".into())), Codec::Str.parse(b"hi\0\0"));
        assert_eq!(Ok(AttrValue::Str("hi".into())), Codec::Str.parse(b"hi"));
        assert_eq!(Ok(AttrValue::Str("".into())), Codec::Str.parse(b""));
        assert_eq!(Err(Error::NotAscii), Codec::Str.build(&"héllo".into()));
    }
}
