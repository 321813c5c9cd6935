use regex::Regex;
use xmltree::Element;

use super::register::DimSpec;
use super::value::EnumeratedValuesSpec;
use super::{access, children, derived_from, description, integer_u32, required_text, text};
use super::{Derivable, StructuralEq};
use crate::error::{StructgenError, StructgenResult};
use crate::AccessSpec;

/// Position of a field inside its register, normalized from whichever of the three SVD encodings
/// the document used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitRange {
  /// Least significant bit.
  pub offset: u32,
  pub width: u32,
}
impl BitRange {
  pub fn from_lsb_msb(lsb: u32, msb: u32) -> StructgenResult<Self> {
    if msb < lsb {
      return Err(StructgenError::invalid(
        &format!("[{}:{}]", msb, lsb),
        "bit range (msb below lsb)",
      ));
    }

    Ok(Self {
      offset: lsb,
      width: msb - lsb + 1,
    })
  }

  fn parse(el: &Element) -> StructgenResult<Option<Self>> {
    if let Some(range) = text(el, "bitRange") {
      let pattern = Regex::new(r"^\[\s*(\d+)\s*:\s*(\d+)\s*\]$")?;
      let captures = pattern
        .captures(&range)
        .ok_or_else(|| StructgenError::invalid(&range, "bitRange"))?;
      let msb = captures[1]
        .parse::<u32>()
        .map_err(|_| StructgenError::invalid(&range, "bitRange"))?;
      let lsb = captures[2]
        .parse::<u32>()
        .map_err(|_| StructgenError::invalid(&range, "bitRange"))?;
      return Ok(Some(Self::from_lsb_msb(lsb, msb)?));
    }

    if let (Some(lsb), Some(msb)) = (integer_u32(el, "lsb")?, integer_u32(el, "msb")?) {
      return Ok(Some(Self::from_lsb_msb(lsb, msb)?));
    }

    if let Some(offset) = integer_u32(el, "bitOffset")? {
      let width = integer_u32(el, "bitWidth")?.unwrap_or(1);
      if width == 0 {
        return Err(StructgenError::invalid("0", "bitWidth"));
      }
      return Ok(Some(Self { offset, width }));
    }

    Ok(None)
  }
}

/// Describes a field of a register.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
  derived_from: Option<String>,

  pub name: String,
  pub description: Option<String>,

  /// Unset only on a derived field that takes its position from the field it derives from.
  pub bit_range: Option<BitRange>,

  pub access: Option<AccessSpec>,
  pub enumerated_values: Vec<EnumeratedValuesSpec>,
}
impl FieldSpec {
  /// Reads a `<field>` element. Fields with a `%s` placeholder and a `dim` expand into one field
  /// per index, each offset by `dimIncrement` bits.
  pub(crate) fn new(el: &Element) -> StructgenResult<Vec<Self>> {
    let prototype = Self {
      derived_from: derived_from(el),
      name: required_text(el, "name")?,
      description: description(el)?,
      bit_range: BitRange::parse(el)?,
      access: access(el)?,
      enumerated_values: children(el, "enumeratedValues")
        .map(EnumeratedValuesSpec::new)
        .collect::<StructgenResult<Vec<EnumeratedValuesSpec>>>()?,
    };

    let dim = match DimSpec::parse(el, &prototype.name)? {
      Some(dim) => dim,
      None => return Ok(vec![prototype]),
    };

    let first = prototype.bit_range;
    Ok(
      dim
        .indices
        .iter()
        .enumerate()
        .map(|(n, index)| {
          let mut spec = prototype.clone();
          spec.interpolate_array_params(
            index,
            first.map(|r| BitRange {
              offset: r.offset + n as u32 * dim.increment,
              width: r.width,
            }),
          );
          spec
        })
        .collect(),
    )
  }

  /// The field's position, which every field has once derivation is resolved.
  pub fn bits(&self) -> StructgenResult<BitRange> {
    self
      .bit_range
      .ok_or_else(|| StructgenError::missing(&self.name, "bitRange"))
  }

  pub fn can_read(&self) -> bool {
    self.access.map(|a| a.can_read()).unwrap_or(true)
  }

  pub fn can_write(&self) -> bool {
    self.access.map(|a| a.can_write()).unwrap_or(true)
  }

  /// Enumerations that describe values read from the field.
  pub fn readable_values(&self) -> Option<&EnumeratedValuesSpec> {
    self
      .enumerated_values
      .iter()
      .find(|ev| ev.usage.as_deref() != Some("write"))
      .or_else(|| self.enumerated_values.first())
  }

  pub(crate) fn propagate_default_properties(&mut self, access: &Option<AccessSpec>) -> bool {
    if self.access.is_none() && access.is_some() {
      self.access = *access;
      return true;
    }
    false
  }

  fn interpolate_array_params(&mut self, index: &str, bit_range: Option<BitRange>) {
    self.name = self.name.replace("[%s]", index).replace("%s", index);

    if let Some(df) = self.derived_from.clone() {
      self.derived_from = Some(df.replace("%s", index));
    }

    if let Some(desc) = self.description.clone() {
      self.description = Some(desc.replace("%s", index));
    }

    self.bit_range = bit_range;
  }
}

impl Derivable for FieldSpec {
  const KIND: &'static str = "field";

  fn name(&self) -> &str {
    &self.name
  }

  fn derived_from(&self) -> Option<&str> {
    self.derived_from.as_deref()
  }

  fn inherit_from(&mut self, fs: &FieldSpec) -> bool {
    let mut changed = false;

    if self.description.is_none() && fs.description.is_some() {
      self.description = fs.description.clone();
      changed = true;
    }

    if self.bit_range.is_none() && fs.bit_range.is_some() {
      self.bit_range = fs.bit_range;
      changed = true;
    }

    if self.access.is_none() && fs.access.is_some() {
      self.access = fs.access;
      changed = true;
    }

    if self.enumerated_values.is_empty() && !fs.enumerated_values.is_empty() {
      self.enumerated_values = fs.enumerated_values.clone();
      changed = true;
    }

    changed
  }
}

impl StructuralEq for FieldSpec {
  fn structurally_eq(&self, other: &Self) -> bool {
    self.name == other.name
      && self.bit_range == other.bit_range
      && self.can_read() == other.can_read()
      && self.can_write() == other.can_write()
  }
}
