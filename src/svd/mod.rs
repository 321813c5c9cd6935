//! SVD model builder: reads a CMSIS-SVD device description into an in-memory model with every
//! `derivedFrom` reference resolved and default register properties propagated.

use log::{debug, info};
use regex::Regex;
use std::fs;
use std::path::Path;
use svd_parser::parse::Parse;
use svd_parser::Access;
use xmltree::Element;

use crate::error::{StructgenError, StructgenResult};
use crate::AccessSpec;

mod cluster;
mod derived;
mod device;
mod equality;
mod field;
mod peripheral;
mod register;
mod value;

pub use cluster::ClusterSpec;
pub use derived::{derived_from_stack, resolve_derivations, Derivable};
pub use device::{CpuSpec, DeviceSpec, EndianSpec};
pub use equality::StructuralEq;
pub use field::{BitRange, FieldSpec};
pub use peripheral::{AddressBlockSpec, InterruptSpec, PeripheralSpec};
pub use register::{DimSpec, RegisterItem, RegisterNode, RegisterSpec};
pub use value::{parse_enum_value, parse_integer, EnumeratedValueSpec, EnumeratedValuesSpec};

/// Register width used when neither the register nor any enclosing scope declares one.
pub const DEFAULT_REGISTER_SIZE: u32 = 32;

/// A fully resolved device description. Built once per document and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SvdModel {
  pub device: DeviceSpec,
  pub cpu: Option<CpuSpec>,

  /// Peripherals in document order.
  pub peripherals: Vec<PeripheralSpec>,
}
impl SvdModel {
  pub fn peripheral(&self, name: &str) -> Option<&PeripheralSpec> {
    self.peripherals.iter().find(|p| p.name == name)
  }
}

/// Builds the model from a parsed `<device>` element.
pub fn ingest(root: &Element) -> StructgenResult<SvdModel> {
  if root.name != "device" {
    return Err(StructgenError::invalid(&root.name, "SVD root element (expected <device>)"));
  }

  let device = DeviceSpec::new(root)?;

  let cpu = match root.get_child("cpu") {
    Some(el) => Some(CpuSpec::new(&svd_parser::Cpu::parse(el)?)),
    None => None,
  };

  let peripherals = match root.get_child("peripherals") {
    Some(el) => children(el, "peripheral")
      .map(PeripheralSpec::new)
      .collect::<StructgenResult<Vec<PeripheralSpec>>>()?,
    None => Vec::new(),
  };

  let mut peripherals = resolve_derivations(peripherals)?;

  for peripheral in peripherals.iter_mut() {
    while peripheral.propagate_default_register_properties(
      &device.default_register_size,
      &device.default_register_access,
      &device.default_register_reset_value,
    ) {}
  }

  info!(
    "ingested device {} with {} peripherals",
    device.name,
    peripherals.len()
  );

  Ok(SvdModel {
    device,
    cpu,
    peripherals,
  })
}

pub fn ingest_str(xml: &str) -> StructgenResult<SvdModel> {
  ingest(&Element::parse(xml.as_bytes())?)
}

pub fn ingest_file(path: &Path) -> StructgenResult<SvdModel> {
  debug!("reading {}", path.display());
  ingest_str(&fs::read_to_string(path)?)
}

pub(crate) fn children<'a>(el: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> {
  el.children.iter().filter(move |child| child.name == name)
}

/// Trimmed text of a direct child element.
pub(crate) fn text(el: &Element, name: &str) -> Option<String> {
  el.get_child(name)
    .and_then(|c| c.text.as_ref())
    .map(|t| t.trim().to_owned())
}

pub(crate) fn required_text(el: &Element, name: &str) -> StructgenResult<String> {
  text(el, name).ok_or_else(|| StructgenError::missing(&el.name, name))
}

pub(crate) fn integer(el: &Element, name: &str) -> StructgenResult<Option<u64>> {
  match text(el, name) {
    Some(t) => Ok(Some(parse_integer(&t)?)),
    None => Ok(None),
  }
}

pub(crate) fn required_integer(el: &Element, name: &str) -> StructgenResult<u64> {
  parse_integer(&required_text(el, name)?)
}

pub(crate) fn integer_u32(el: &Element, name: &str) -> StructgenResult<Option<u32>> {
  match integer(el, name)? {
    Some(v) => Ok(Some(narrow(v, el, name)?)),
    None => Ok(None),
  }
}

pub(crate) fn required_u32(el: &Element, name: &str) -> StructgenResult<u32> {
  narrow(required_integer(el, name)?, el, name)
}

fn narrow(value: u64, el: &Element, name: &str) -> StructgenResult<u32> {
  u32::try_from(value)
    .map_err(|_| StructgenError::invalid(&value.to_string(), &format!("<{}> of <{}>", name, el.name)))
}

pub(crate) fn access(el: &Element) -> StructgenResult<Option<AccessSpec>> {
  match el.get_child("access") {
    Some(a) => Ok(Some(AccessSpec::new(&Access::parse(a)?))),
    None => Ok(None),
  }
}

pub(crate) fn derived_from(el: &Element) -> Option<String> {
  el.attributes.get("derivedFrom").map(|d| d.trim().to_owned())
}

/// Description text with every whitespace run collapsed to one space.
pub(crate) fn description(el: &Element) -> StructgenResult<Option<String>> {
  match text(el, "description") {
    Some(d) => Ok(Some(clean_whitespace(&d)?)),
    None => Ok(None),
  }
}

pub fn clean_whitespace(text: &str) -> StructgenResult<String> {
  let whitespace = Regex::new(r"\s+")?;
  Ok(whitespace.replace_all(text.trim(), " ").into_owned())
}

#[cfg(test)]
mod tests {
  use super::{children, clean_whitespace, ingest_str, text};
  use crate::error::StructgenError;
  use crate::AccessSpec;
  use xmltree::Element;

  const DEVICE: &str = r##"
    <device>
      <name>ACME</name>
      <version>1.2</version>
      <description>An   example
        device</description>
      <width>32</width>
      <size>32</size>
      <access>read-write</access>
      <cpu>
        <name>CM4</name>
        <revision>r0p1</revision>
        <endian>little</endian>
        <mpuPresent>true</mpuPresent>
        <fpuPresent>false</fpuPresent>
        <nvicPrioBits>3</nvicPrioBits>
        <vendorSystickConfig>false</vendorSystickConfig>
      </cpu>
      <peripherals>
        <peripheral derivedFrom="UART0">
          <name>UART1</name>
          <baseAddress>0x40001000</baseAddress>
        </peripheral>
        <peripheral>
          <name>UART0</name>
          <baseAddress>0x40000000</baseAddress>
          <size>16</size>
          <registers>
            <register>
              <name>DATA</name>
              <addressOffset>0x0</addressOffset>
            </register>
            <register>
              <name>STATUS</name>
              <addressOffset>0x4</addressOffset>
              <size>32</size>
              <access>read-only</access>
              <fields>
                <field>
                  <name>BUSY</name>
                  <bitRange>[0:0]</bitRange>
                </field>
              </fields>
            </register>
          </registers>
        </peripheral>
      </peripherals>
    </device>
  "##;

  #[test]
  fn ingests_device() {
    let model = ingest_str(DEVICE).unwrap();

    assert_eq!("ACME", model.device.name);
    assert_eq!(Some("An example device".to_owned()), model.device.description);
    assert_eq!("CM4", model.cpu.unwrap().name);

    let names: Vec<&str> = model.peripherals.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(vec!["UART1", "UART0"], names);
  }

  #[test]
  fn derived_peripheral_inherits_registers() {
    let model = ingest_str(DEVICE).unwrap();

    let uart1 = model.peripheral("UART1").unwrap();
    assert_eq!(Some("UART0".to_owned()), uart1.derived_from);
    assert_eq!(0x4000_1000, uart1.base_address);
    assert_eq!(2, uart1.registers.len());
    assert_eq!("DATA", uart1.registers[0].as_register().unwrap().name);
  }

  #[test]
  fn propagates_default_register_properties() {
    let model = ingest_str(DEVICE).unwrap();
    let uart0 = model.peripheral("UART0").unwrap();

    let data = uart0.registers[0].as_register().unwrap();
    assert_eq!(Some(16), data.size);
    assert_eq!(Some(AccessSpec::ReadWrite), data.access);

    let status = uart0.registers[1].as_register().unwrap();
    assert_eq!(Some(32), status.size);
    assert_eq!(Some(AccessSpec::ReadOnly), status.fields[0].access);
  }

  #[test]
  fn missing_derivation_target_fails() {
    let result = ingest_str(
      r##"
      <device>
        <name>BAD</name>
        <peripherals>
          <peripheral derivedFrom="NOPE">
            <name>P1</name>
            <baseAddress>0</baseAddress>
          </peripheral>
        </peripherals>
      </device>
      "##,
    );

    match result {
      Err(StructgenError::UnresolvedDerivation { name, target, .. }) => {
        assert_eq!("P1", name);
        assert_eq!("NOPE", target);
      }
      other => panic!("unexpected result {:?}", other),
    }
  }

  #[test]
  fn rejects_non_device_root() {
    assert!(matches!(
      ingest_str("<peripheral/>"),
      Err(StructgenError::InvalidValue { .. })
    ));
  }

  #[test]
  fn reads_direct_children_and_trimmed_text() {
    let el = Element::parse(
      r##"
      <register>
        <name>  CTRL
        </name>
        <field><name>A</name></field>
        <fields/>
        <field><name>B</name></field>
        <empty/>
      </register>
      "##
        .as_bytes(),
    )
    .unwrap();

    assert_eq!(Some("CTRL".to_owned()), text(&el, "name"));
    assert_eq!(None, text(&el, "empty"));
    assert_eq!(None, text(&el, "missing"));

    let names: Vec<Option<String>> = children(&el, "field").map(|f| text(f, "name")).collect();
    assert_eq!(vec![Some("A".to_owned()), Some("B".to_owned())], names);
  }

  #[test]
  fn collapses_whitespace() {
    assert_eq!("a b c", clean_whitespace("  a \n\t b   c ").unwrap());
  }
}
