//! The declarative intermediate representation: the document format the registry consumes and
//! the SVD front end produces.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A complete configuration document. Maps are keyed by declaration name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub namespace: Vec<String>,

  /// Other configuration documents, relative to this one, whose declarations are merged in.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub includes: Vec<String>,

  /// Primitive used for emitted numeric type identifiers.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id_underlying: Option<String>,

  #[serde(rename = "struct")]
  pub struct_defaults: StructDefaults,

  #[serde(rename = "enum")]
  pub enum_defaults: EnumDefaults,

  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub structs: BTreeMap<String, StructDecl>,

  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub enums: BTreeMap<String, EnumDecl>,
}

/// Defaults applied to every struct declaration that leaves a flag unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructDefaults {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub identifier: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub methods: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub codec: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub stream: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub json: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none", alias = "unitTest")]
  pub unit_test: Option<bool>,
}

/// Defaults applied to every enum declaration that leaves a flag unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumDefaults {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub identifier: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none", alias = "useMap")]
  pub use_map: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub json: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none", alias = "unitTest")]
  pub unit_test: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructDecl {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub namespace: Option<Vec<String>>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,

  /// Wire-order field list. Never reordered.
  pub fields: Vec<FieldDecl>,

  /// Total size the struct must lay out to.
  #[serde(skip_serializing_if = "Option::is_none", alias = "expectedSize")]
  pub expected_size: Option<usize>,

  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub instances: Vec<InstanceDecl>,

  #[serde(flatten)]
  pub flags: StructDefaults,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldDecl {
  pub name: String,

  #[serde(rename = "type")]
  pub type_name: String,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,

  #[serde(skip_serializing_if = "Option::is_none", alias = "arrayLength")]
  pub array_length: Option<usize>,

  #[serde(skip_serializing_if = "Option::is_none", alias = "expectedOffset")]
  pub expected_offset: Option<usize>,

  #[serde(skip_serializing_if = "Option::is_none", alias = "expectedSize")]
  pub expected_size: Option<usize>,

  #[serde(rename = "const", skip_serializing_if = "is_false")]
  pub is_const: bool,

  #[serde(skip_serializing_if = "is_false")]
  pub volatile: bool,

  #[serde(skip_serializing_if = "is_false")]
  pub padding: bool,

  /// Bit-fields packed into this field's storage.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub fields: Vec<BitFieldDecl>,

  /// Other named views over the same storage.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub alternates: Vec<AlternateDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitFieldDecl {
  pub name: String,

  pub index: u32,

  #[serde(default = "one")]
  pub width: u32,

  #[serde(default = "yes")]
  pub read: bool,

  #[serde(default = "yes")]
  pub write: bool,

  /// Enum the packed value is interpreted as.
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub type_name: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlternateDecl {
  pub name: String,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,

  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub fields: Vec<BitFieldDecl>,
}

/// A concrete memory-mapped instance of a struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceDecl {
  pub name: String,
  pub address: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "is_false")]
  pub volatile: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumDecl {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub namespace: Option<Vec<String>>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,

  #[serde(default = "default_underlying")]
  pub underlying: String,

  /// Members in declaration order.
  #[serde(rename = "enum", with = "ordered_members")]
  pub members: Vec<(String, EnumMemberDecl)>,

  #[serde(flatten)]
  pub flags: EnumDefaults,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumMemberDecl {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub value: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

fn is_false(value: &bool) -> bool {
  !*value
}

fn one() -> u32 {
  1
}

fn yes() -> bool {
  true
}

fn default_underlying() -> String {
  "uint8".to_owned()
}

/// Enum members are a map in the document but their order is the order of the generated
/// constants, so they round-trip through a `Vec` of pairs instead of a hashed map.
mod ordered_members {
  use super::EnumMemberDecl;
  use serde::de::{MapAccess, Visitor};
  use serde::ser::SerializeMap;
  use serde::{Deserialize, Deserializer, Serializer};
  use std::fmt;

  /// A member may be written as `null` (auto value), a bare integer, or a full table.
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum MemberShorthand {
    Value(i64),
    Full(EnumMemberDecl),
  }

  pub fn serialize<S>(members: &[(String, EnumMemberDecl)], serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    let mut map = serializer.serialize_map(Some(members.len()))?;
    for (name, member) in members {
      map.serialize_entry(name, member)?;
    }
    map.end()
  }

  pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, EnumMemberDecl)>, D::Error>
  where
    D: Deserializer<'de>,
  {
    struct MembersVisitor;

    impl<'de> Visitor<'de> for MembersVisitor {
      type Value = Vec<(String, EnumMemberDecl)>;

      fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of enum member names to member declarations")
      }

      fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
      where
        A: MapAccess<'de>,
      {
        let mut members = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, member)) = access.next_entry::<String, Option<MemberShorthand>>()? {
          let member = match member {
            None => EnumMemberDecl::default(),
            Some(MemberShorthand::Value(value)) => EnumMemberDecl {
              value: Some(value),
              description: None,
            },
            Some(MemberShorthand::Full(decl)) => decl,
          };
          members.push((name, member));
        }
        Ok(members)
      }
    }

    deserializer.deserialize_map(MembersVisitor)
  }
}
