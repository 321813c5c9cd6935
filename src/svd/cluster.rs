use xmltree::Element;

use super::register::{DimSpec, RegisterItem, RegisterNode};
use super::{
  access, derived_from, description, integer, integer_u32, required_text, required_u32,
  Derivable, StructuralEq,
};
use crate::error::StructgenResult;
use crate::AccessSpec;

/// A named group of registers (and nested clusters) laid out relative to the cluster's own
/// offset.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSpec {
  derived_from: Option<String>,

  pub name: String,
  pub description: Option<String>,

  /// Cluster's starting address relative to its parent.
  pub address_offset: u32,

  /// Set for `NAME[%s]` arrays, which stay one cluster.
  pub dim: Option<DimSpec>,

  pub default_register_size: Option<u32>,
  pub default_register_access: Option<AccessSpec>,
  pub default_register_reset_value: Option<u64>,

  /// Registers and clusters with offsets relative to this cluster.
  pub children: Vec<RegisterNode>,
}
impl ClusterSpec {
  pub(crate) fn new(el: &Element) -> StructgenResult<Vec<Self>> {
    let name = required_text(el, "name")?;

    let mut prototype = Self {
      derived_from: derived_from(el),
      name: name.clone(),
      description: description(el)?,
      address_offset: required_u32(el, "addressOffset")?,
      dim: None,
      default_register_size: integer_u32(el, "size")?,
      default_register_access: access(el)?,
      default_register_reset_value: integer(el, "resetValue")?,
      children: RegisterNode::parse_block(el)?,
    };

    let dim = match DimSpec::parse(el, &name)? {
      Some(dim) => dim,
      None => return Ok(vec![prototype]),
    };

    if name.contains("[%s]") || !name.contains("%s") {
      prototype.name = name.replace("[%s]", "");
      prototype.dim = Some(dim);
      return Ok(vec![prototype]);
    }

    Ok(
      dim
        .indices
        .iter()
        .enumerate()
        .map(|(n, index)| {
          let mut spec = prototype.clone();
          spec.interpolate_array_params(index, prototype.address_offset + dim.offset_of(n));
          spec
        })
        .collect(),
    )
  }

  pub fn iter_registers(&self) -> impl Iterator<Item = &RegisterNode> {
    self.children.iter()
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

    for child in self.children.iter_mut() {
      if child.propagate_default_properties(
        &self.default_register_size,
        &self.default_register_access,
        &self.default_register_reset_value,
      ) {
        changed = true;
      }
    }

    changed
  }

  fn interpolate_array_params(&mut self, index: &str, address_offset: u32) {
    self.name = self.name.replace("%s", index);

    if let Some(df) = self.derived_from.clone() {
      self.derived_from = Some(df.replace("%s", index));
    }

    if let Some(desc) = self.description.clone() {
      self.description = Some(desc.replace("%s", index));
    }

    self.address_offset = address_offset;
  }
}

impl Derivable for ClusterSpec {
  const KIND: &'static str = "cluster";

  fn name(&self) -> &str {
    &self.name
  }

  fn derived_from(&self) -> Option<&str> {
    self.derived_from.as_deref()
  }

  fn inherit_from(&mut self, cs: &ClusterSpec) -> bool {
    let mut changed = false;

    if self.description.is_none() && cs.description.is_some() {
      self.description = cs.description.clone();
      changed = true;
    }

    if self.default_register_size.is_none() && cs.default_register_size.is_some() {
      self.default_register_size = cs.default_register_size;
      changed = true;
    }

    if self.default_register_access.is_none() && cs.default_register_access.is_some() {
      self.default_register_access = cs.default_register_access;
      changed = true;
    }

    if self.default_register_reset_value.is_none() && cs.default_register_reset_value.is_some() {
      self.default_register_reset_value = cs.default_register_reset_value;
      changed = true;
    }

    if self.dim.is_none() && cs.dim.is_some() {
      self.dim = cs.dim.clone();
      changed = true;
    }

    if inherit_children(&mut self.children, &cs.children) {
      changed = true;
    }

    changed
  }
}

/// Merges inherited registers and clusters into `children`: same-named entries inherit, missing
/// ones are copied.
pub(crate) fn inherit_children(children: &mut Vec<RegisterNode>, ancestors: &[RegisterNode]) -> bool {
  let mut changed = false;

  for ancestor in ancestors.iter() {
    let name = RegisterItem::name(ancestor);
    if let Some(descendant) = children.iter_mut().find(|c| RegisterItem::name(*c) == name) {
      if descendant.inherit_from(ancestor) {
        changed = true;
      }
    } else {
      children.push(ancestor.clone());
      changed = true;
    }
  }

  changed
}

impl RegisterItem for ClusterSpec {
  fn name(&self) -> &str {
    &self.name
  }

  fn address_offset(&self) -> u32 {
    self.address_offset
  }

  /// The furthest extent of any child.
  fn element_size(&self) -> u32 {
    self.children.iter().map(|c| c.extent()).max().unwrap_or(0)
  }

  fn dim(&self) -> Option<&DimSpec> {
    self.dim.as_ref()
  }

  fn description(&self) -> Option<&str> {
    self.description.as_deref()
  }
}

impl StructuralEq for ClusterSpec {
  fn structurally_eq(&self, other: &Self) -> bool {
    self.name == other.name
      && self.address_offset == other.address_offset
      && self.dim == other.dim
      && self.children.structurally_eq(&other.children)
  }
}

#[cfg(test)]
mod tests {
  use super::ClusterSpec;
  use crate::svd::{Derivable, RegisterItem, RegisterNode, StructuralEq};
  use crate::AccessSpec;
  use xmltree::Element;

  fn parse(xml: &str) -> Vec<ClusterSpec> {
    ClusterSpec::new(&Element::parse(xml.as_bytes()).unwrap()).unwrap()
  }

  const CHANNEL: &str = r##"
    <cluster>
      <name>CH[%s]</name>
      <description>DMA channel</description>
      <addressOffset>0x100</addressOffset>
      <dim>4</dim>
      <dimIncrement>0x10</dimIncrement>
      <size>32</size>
      <register>
        <name>CFG</name>
        <addressOffset>0x0</addressOffset>
      </register>
      <register>
        <name>CNT</name>
        <addressOffset>0x8</addressOffset>
        <size>16</size>
      </register>
    </cluster>
  "##;

  #[test]
  fn can_create_single_from_xml() {
    let cluster = parse(CHANNEL).remove(0);

    assert_eq!("CH", cluster.name);
    assert_eq!(0x100, cluster.address_offset);
    assert_eq!(4, cluster.dim.as_ref().unwrap().dim);
    assert_eq!(2, cluster.children.len());
    assert_eq!(Some(32), cluster.default_register_size);
  }

  #[test]
  fn can_create_multiple_from_xml() {
    let clusters = parse(
      r##"
      <cluster>
        <name>PORT%s</name>
        <addressOffset>0</addressOffset>
        <dim>2</dim>
        <dimIncrement>0x20</dimIncrement>
        <dimIndex>A-B</dimIndex>
        <register><name>IN</name><addressOffset>0</addressOffset></register>
      </cluster>
      "##,
    );

    assert_eq!(2, clusters.len());
    assert_eq!("PORTB", clusters[1].name);
    assert_eq!(0x20, clusters[1].address_offset);
  }

  #[test]
  fn element_size_spans_children() {
    let mut cluster = parse(CHANNEL).remove(0);
    assert!(cluster.propagate_default_register_properties(&None, &Some(AccessSpec::ReadWrite), &None));

    assert_eq!(10, cluster.element_size());
    assert_eq!(0x100 + 3 * 0x10 + 10, cluster.extent());

    let cfg = cluster.children[0].as_register().unwrap();
    assert_eq!(Some(32), cfg.size);
    assert_eq!(Some(AccessSpec::ReadWrite), cfg.access);
  }

  #[test]
  fn inherits_from_other_cluster() {
    let base = parse(CHANNEL).remove(0);
    let mut derived = parse(
      r##"
      <cluster derivedFrom="CH">
        <name>SPARE</name>
        <addressOffset>0x200</addressOffset>
        <register>
          <name>CNT</name>
          <description>Spare counter</description>
          <addressOffset>0x8</addressOffset>
        </register>
      </cluster>
      "##,
    )
    .remove(0);

    assert!(derived.inherit_from(&base));
    assert_eq!(Some("DMA channel".to_owned()), derived.description);
    assert_eq!(2, derived.children.len());

    let cnt = derived.children[0].as_register().unwrap();
    assert_eq!(Some("Spare counter".to_owned()), cnt.description);
    assert_eq!(Some(16), cnt.size);
    assert!(matches!(derived.children[1], RegisterNode::Register(ref r) if r.name == "CFG"));

    assert!(!derived.inherit_from(&base));
  }

  #[test]
  fn nested_clusters_are_children() {
    let cluster = parse(
      r##"
      <cluster>
        <name>OUTER</name>
        <addressOffset>0</addressOffset>
        <cluster>
          <name>INNER</name>
          <addressOffset>4</addressOffset>
          <register><name>R</name><addressOffset>0</addressOffset><size>8</size></register>
        </cluster>
      </cluster>
      "##,
    )
    .remove(0);

    let inner = cluster.children[0].as_cluster().unwrap();
    assert_eq!("INNER", inner.name);
    assert_eq!(5, cluster.element_size());
  }

  #[test]
  fn structural_equality_ignores_descriptions() {
    let a = parse(CHANNEL).remove(0);
    let mut b = a.clone();
    b.description = None;
    assert!(a.structurally_eq(&b));

    b.address_offset = 0;
    assert!(!a.structurally_eq(&b));
  }
}
