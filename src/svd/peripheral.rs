use serde::Serialize;
use svd_parser::parse::Parse;
use svd_parser::{AddressBlock, Interrupt};
use xmltree::Element;

use super::cluster::inherit_children;
use super::register::RegisterNode;
use super::{
  access, children, derived_from, description, integer, integer_u32, required_integer,
  required_text, text, Derivable, StructuralEq,
};
use crate::error::StructgenResult;
use crate::AccessSpec;

/// Describes an address range uniquely mapped to a peripheral.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressBlockSpec {
  /// The start address of the address block relative to the peripheral's base address.
  pub offset: u32,

  /// The number of address unit bits covered by this address block.
  pub size: u32,

  /// What the address block is used for: `registers`, `buffer` or `reserved`.
  pub usage: String,
}
impl AddressBlockSpec {
  pub(crate) fn new(ab: &AddressBlock) -> Self {
    Self {
      offset: ab.offset,
      size: ab.size,
      usage: ab.usage.clone(),
    }
  }
}

/// Describes an interrupt that exists on a peripheral.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterruptSpec {
  pub name: String,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,

  /// The index value of the interrupt.
  pub value: u32,
}
impl InterruptSpec {
  pub(crate) fn new(is: &Interrupt) -> Self {
    Self {
      name: is.name.clone(),
      description: is.description.clone(),
      value: is.value,
    }
  }
}

/// Describes a peripheral: a base address plus the registers laid out from it.
#[derive(Debug, Clone, PartialEq)]
pub struct PeripheralSpec {
  pub name: String,

  /// Name of the peripheral this one copies its layout from.
  pub derived_from: Option<String>,

  pub description: Option<String>,
  pub group_name: Option<String>,
  pub base_address: u64,

  pub default_register_size: Option<u32>,
  pub default_register_access: Option<AccessSpec>,
  pub default_register_reset_value: Option<u64>,

  pub registers: Vec<RegisterNode>,
  pub interrupts: Vec<InterruptSpec>,
  pub address_blocks: Vec<AddressBlockSpec>,
}
impl PeripheralSpec {
  pub(crate) fn new(el: &Element) -> StructgenResult<Self> {
    let registers = match el.get_child("registers") {
      Some(r) => RegisterNode::parse_block(r)?,
      None => Vec::new(),
    };

    let interrupts = children(el, "interrupt")
      .map(|i| -> StructgenResult<InterruptSpec> {
        Ok(InterruptSpec::new(&Interrupt::parse(i)?))
      })
      .collect::<StructgenResult<Vec<InterruptSpec>>>()?;

    let address_blocks = children(el, "addressBlock")
      .map(|ab| -> StructgenResult<AddressBlockSpec> {
        Ok(AddressBlockSpec::new(&AddressBlock::parse(ab)?))
      })
      .collect::<StructgenResult<Vec<AddressBlockSpec>>>()?;

    Ok(Self {
      name: required_text(el, "name")?,
      derived_from: derived_from(el),
      description: description(el)?,
      group_name: text(el, "groupName"),
      base_address: required_integer(el, "baseAddress")?,
      default_register_size: integer_u32(el, "size")?,
      default_register_access: access(el)?,
      default_register_reset_value: integer(el, "resetValue")?,
      registers,
      interrupts,
      address_blocks,
    })
  }

  /// Names of the alternate groups used by this peripheral's registers, in first-use order.
  pub fn alternate_groups(&self) -> Vec<String> {
    fn collect(nodes: &[RegisterNode], groups: &mut Vec<String>) {
      for node in nodes {
        match node {
          RegisterNode::Register(r) => {
            for group in r.alternates.iter().filter_map(|a| a.alternate_group.as_ref()) {
              if !groups.contains(group) {
                groups.push(group.clone());
              }
            }
          }
          RegisterNode::Cluster(c) => collect(&c.children, groups),
        }
      }
    }

    let mut groups = Vec::new();
    collect(&self.registers, &mut groups);
    groups
  }

  pub(crate) fn propagate_default_register_properties(
    &mut self,
    size: &Option<u32>,
    access: &Option<AccessSpec>,
    reset_value: &Option<u64>,
  ) -> bool {
    let mut changed = false;

    if self.default_register_size.is_none() && size.is_some() {
      self.default_register_size = *size;
      changed = true;
    }

    if self.default_register_access.is_none() && access.is_some() {
      self.default_register_access = *access;
      changed = true;
    }

    if self.default_register_reset_value.is_none() && reset_value.is_some() {
      self.default_register_reset_value = *reset_value;
      changed = true;
    }

    for register in self.registers.iter_mut() {
      if register.propagate_default_properties(
        &self.default_register_size,
        &self.default_register_access,
        &self.default_register_reset_value,
      ) {
        changed = true;
      }
    }

    changed
  }
}

impl Derivable for PeripheralSpec {
  const KIND: &'static str = "peripheral";

  fn name(&self) -> &str {
    &self.name
  }

  fn derived_from(&self) -> Option<&str> {
    self.derived_from.as_deref()
  }

  /// Interrupts are never inherited: each peripheral instance owns its own vectors.
  fn inherit_from(&mut self, ps: &PeripheralSpec) -> bool {
    let mut changed = false;

    if self.description.is_none() && ps.description.is_some() {
      self.description = ps.description.clone();
      changed = true;
    }

    if self.group_name.is_none() && ps.group_name.is_some() {
      self.group_name = ps.group_name.clone();
      changed = true;
    }

    if self.default_register_size.is_none() && ps.default_register_size.is_some() {
      self.default_register_size = ps.default_register_size;
      changed = true;
    }

    if self.default_register_access.is_none() && ps.default_register_access.is_some() {
      self.default_register_access = ps.default_register_access;
      changed = true;
    }

    if self.default_register_reset_value.is_none() && ps.default_register_reset_value.is_some() {
      self.default_register_reset_value = ps.default_register_reset_value;
      changed = true;
    }

    if self.address_blocks.is_empty() && !ps.address_blocks.is_empty() {
      self.address_blocks = ps.address_blocks.clone();
      changed = true;
    }

    if inherit_children(&mut self.registers, &ps.registers) {
      changed = true;
    }

    changed
  }
}

/// Peripherals compare by register layout only; name and base address are per instance.
impl StructuralEq for PeripheralSpec {
  fn structurally_eq(&self, other: &Self) -> bool {
    self.registers.structurally_eq(&other.registers)
  }
}
