use anyhow::Error as AnyhowError;
use thiserror::Error;

/// Convenience type for a result that may contain a `StructgenError`.
pub type StructgenResult<T> = std::result::Result<T, StructgenError>;

/// Error enum for all errors thrown by this crate or the crates on which it depends.
///
/// Every structural variant names the declaration it was raised for, so a failed run can point
/// at the piece of declarative source that needs editing.
#[derive(Debug, Error)]
pub enum StructgenError {
  #[error("unknown type '{name}' (referenced by {context})")]
  UnknownType { name: String, context: String },

  #[error("type '{name}' contains itself (resolution path: {path})")]
  CyclicType { name: String, path: String },

  #[error("{name} is declared at offset {expected} but the struct is already {current} bytes")]
  OffsetRegression {
    name: String,
    expected: usize,
    current: usize,
  },

  #[error("{name} is declared as {expected} bytes but its layout is {actual} bytes")]
  SizeMismatch {
    name: String,
    expected: usize,
    actual: usize,
  },

  #[error("{kind} '{name}' is derived from '{target}', which does not exist")]
  UnresolvedDerivation {
    kind: &'static str,
    name: String,
    target: String,
  },

  #[error("group '{0}' has no root")]
  AmbiguousRoot(String),

  #[error("bit-field {name} (index {index}, width {width}) exceeds its {storage_bits}-bit storage")]
  BitFieldOverflow {
    name: String,
    index: u32,
    width: u32,
    storage_bits: u32,
  },

  #[error("bit-field {0} is neither readable nor writable")]
  BitFieldUnusable(String),

  #[error("bit-fields {first} and {second} map to the same accessor parameter")]
  BitFieldNameCollision { first: String, second: String },

  #[error("bit-field {name} cannot pack into '{storage}' (integer or enum storage required)")]
  InvalidBitFieldStorage { name: String, storage: String },

  #[error("type '{0}' is declared more than once")]
  DuplicateType(String),

  #[error("register {name} has unsupported bit width {size}")]
  InvalidRegisterSize { name: String, size: u32 },

  #[error("<{parent}> is missing required element <{element}>")]
  MissingElement { parent: String, element: String },

  #[error("invalid value '{value}' for {context}")]
  InvalidValue { value: String, context: String },

  #[error("generation failed for: {}", .0.join(", "))]
  GenerationFailed(Vec<String>),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("XML error: {0}")]
  Xml(#[from] xmltree::ParseError),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("TOML error: {0}")]
  Toml(#[from] toml::de::Error),

  #[error("svd-parser error: {0:?}")]
  Svd(#[from] AnyhowError),

  #[error("regex error: {0}")]
  Regex(#[from] regex::Error),

  #[error("formatting error")]
  Fmt(#[from] std::fmt::Error),
}

impl StructgenError {
  pub(crate) fn unknown_type(name: &str, context: &str) -> Self {
    StructgenError::UnknownType {
      name: name.to_owned(),
      context: context.to_owned(),
    }
  }

  pub(crate) fn missing(parent: &str, element: &str) -> Self {
    StructgenError::MissingElement {
      parent: parent.to_owned(),
      element: element.to_owned(),
    }
  }

  pub(crate) fn invalid(value: &str, context: &str) -> Self {
    StructgenError::InvalidValue {
      value: value.to_owned(),
      context: context.to_owned(),
    }
  }
}
