//! Schema-driven codec for Generic Netlink attribute payloads
//!
//! A schema describes the attributes expected in a message — symbolic
//! names, numeric ids, value types, nesting — and compiles into a codec
//! that serializes value trees to the kernel's native-endian TLV layout
//! and parses payloads back into navigable value trees.
//!
//! ```
//! use nlattr::{AttrSet, AttrSetCodec, FieldDef, FieldType, IdTable};
//!
//! let ids = IdTable::from([("CTRL_ATTR_FAMILY_NAME".to_owned(), 2)]);
//! let codec = AttrSetCodec::from_schema(
//!     &[FieldDef::new("CTRL_ATTR_FAMILY_NAME", FieldType::Str)],
//!     ids,
//! )
//! .unwrap();
//!
//! let mut attrs = AttrSet::new();
//! attrs.insert("CTRL_ATTR_FAMILY_NAME", "nl80211");
//! let payload = codec.build(&attrs).unwrap();
//!
//! let parsed = codec.parse(&payload).unwrap();
//! assert_eq!(Some("nl80211"), parsed["CTRL_ATTR_FAMILY_NAME"].as_str());
//! ```
//!
//! The outer netlink and genetlink message headers are the caller's
//! business: [`AttrSetCodec::parse`] takes a payload with the headers
//! already stripped, and [`AttrSetCodec::build`] returns bytes to place
//! after them.

/// Parsed attribute values
pub mod attrs;
/// Attribute codecs compiled from a schema
pub mod codec;
/// Declarative schema descriptions
pub mod schema;
/// Wire-level attribute primitives
pub mod wire;

pub use self::attrs::{AttrSet, AttrValue};
pub use self::codec::{AttrSetCodec, Error};
pub use self::schema::{FieldDef, FieldType, IdTable};
