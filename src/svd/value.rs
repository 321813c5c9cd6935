use xmltree::Element;

use super::{children, derived_from, description, required_text, text};
use crate::error::{StructgenError, StructgenResult};

/// One named value of a field's enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumeratedValueSpec {
  pub name: String,
  pub description: Option<String>,

  /// `None` for the `isDefault` member, which stands for every value not otherwise listed.
  pub value: Option<u64>,
  pub is_default: bool,
}
impl EnumeratedValueSpec {
  pub(crate) fn new(el: &Element) -> StructgenResult<Self> {
    let value = match text(el, "value") {
      Some(v) => Some(parse_enum_value(&v)?),
      None => None,
    };

    Ok(Self {
      name: required_text(el, "name")?,
      description: description(el)?,
      value,
      is_default: matches!(text(el, "isDefault").as_deref(), Some("true") | Some("1")),
    })
  }
}

/// An `<enumeratedValues>` block.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumeratedValuesSpec {
  pub name: Option<String>,

  /// `read`, `write` or `read-write`.
  pub usage: Option<String>,
  pub derived_from: Option<String>,
  pub values: Vec<EnumeratedValueSpec>,
}
impl EnumeratedValuesSpec {
  pub(crate) fn new(el: &Element) -> StructgenResult<Self> {
    Ok(Self {
      name: text(el, "name"),
      usage: text(el, "usage"),
      derived_from: derived_from(el),
      values: children(el, "enumeratedValue")
        .map(EnumeratedValueSpec::new)
        .collect::<StructgenResult<Vec<EnumeratedValueSpec>>>()?,
    })
  }
}

/// Parses an SVD integer: `0x` hexadecimal, `#` or `0b` binary, otherwise decimal.
pub fn parse_integer(text: &str) -> StructgenResult<u64> {
  parse(text, false)
}

/// Parses an enumerated value. Binary literals may carry `x` don't-care bits, which are read as
/// ones.
pub fn parse_enum_value(text: &str) -> StructgenResult<u64> {
  parse(text, true)
}

fn parse(text: &str, wildcards: bool) -> StructgenResult<u64> {
  let trimmed = text.trim();
  let lower = trimmed.to_lowercase();

  let parsed = if let Some(hex) = lower.strip_prefix("0x") {
    u64::from_str_radix(hex, 16)
  } else if let Some(bin) = lower.strip_prefix('#').or_else(|| lower.strip_prefix("0b")) {
    if wildcards {
      u64::from_str_radix(&bin.replace('x', "1"), 2)
    } else {
      u64::from_str_radix(bin, 2)
    }
  } else {
    lower.parse::<u64>()
  };

  parsed.map_err(|_| StructgenError::invalid(trimmed, "SVD integer"))
}
