use serde::Serialize;
use svd_parser::{Cpu, Endian};
use xmltree::Element;

use super::{access, description, integer, integer_u32, required_text, text};
use crate::error::StructgenResult;
use crate::AccessSpec;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndianSpec {
  Little,
  Big,
  Selectable,
  Other,
}
impl EndianSpec {
  pub fn new(e: &Endian) -> Self {
    match e {
      Endian::Little => EndianSpec::Little,
      Endian::Big => EndianSpec::Big,
      Endian::Selectable => EndianSpec::Selectable,
      Endian::Other => EndianSpec::Other,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuSpec {
  pub name: String,
  pub revision: String,
  pub endian: EndianSpec,
  pub mpu_present: bool,
  pub fpu_present: bool,
  pub nvic_priority_bits: u32,
  pub has_vendor_systick: bool,
}
impl CpuSpec {
  pub fn new(c: &Cpu) -> Self {
    Self {
      name: c.name.clone(),
      revision: c.revision.clone(),
      endian: EndianSpec::new(&c.endian),
      mpu_present: c.mpu_present,
      fpu_present: c.fpu_present,
      nvic_priority_bits: c.nvic_priority_bits,
      has_vendor_systick: c.has_vendor_systick,
    }
  }
}

/// Device-level properties. Peripherals are held by the model beside it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSpec {
  pub name: String,
  pub version: Option<String>,
  pub description: Option<String>,
  pub address_unit_bits: Option<u32>,
  pub width: Option<u32>,
  pub default_register_size: Option<u32>,
  pub default_register_access: Option<AccessSpec>,
  pub default_register_reset_value: Option<u64>,
}
impl DeviceSpec {
  pub(crate) fn new(el: &Element) -> StructgenResult<Self> {
    Ok(Self {
      name: required_text(el, "name")?,
      version: text(el, "version"),
      description: description(el)?,
      address_unit_bits: integer_u32(el, "addressUnitBits")?,
      width: integer_u32(el, "width")?,
      default_register_size: integer_u32(el, "size")?,
      default_register_access: access(el)?,
      default_register_reset_value: integer(el, "resetValue")?,
    })
  }
}
