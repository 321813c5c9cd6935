use regex::Regex;
use xmltree::Element;

use super::cluster::ClusterSpec;
use super::field::FieldSpec;
use super::{
  access, children, derived_from, description, integer, integer_u32, required_text, required_u32,
  resolve_derivations, text, Derivable, StructuralEq, DEFAULT_REGISTER_SIZE,
};
use crate::error::{StructgenError, StructgenResult};
use crate::AccessSpec;

/// Array dimension of a register, cluster or field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimSpec {
  pub dim: u32,

  /// Address distance between consecutive elements: bytes for registers and clusters, bits for
  /// fields.
  pub increment: u32,

  /// One substitution string per element.
  pub indices: Vec<String>,
}
impl DimSpec {
  pub(crate) fn parse(el: &Element, name: &str) -> StructgenResult<Option<Self>> {
    let dim = match integer_u32(el, "dim")? {
      Some(dim) => dim,
      None => return Ok(None),
    };
    let increment = required_u32(el, "dimIncrement")?;

    let indices = match text(el, "dimIndex") {
      Some(index) => parse_dim_index(&index)?,
      None => (0..dim).map(|v| v.to_string()).collect(),
    };

    if indices.len() != dim as usize {
      return Err(StructgenError::invalid(
        &dim.to_string(),
        &format!("dim of {} ('dim' must equal the length of 'dimIndex')", name),
      ));
    }

    Ok(Some(Self {
      dim,
      increment,
      indices,
    }))
  }

  /// Offset of element `n` relative to the first.
  pub fn offset_of(&self, n: usize) -> u32 {
    n as u32 * self.increment
  }
}

/// Expands `A,B,C`, `0-3` and `A-D` index lists.
fn parse_dim_index(index: &str) -> StructgenResult<Vec<String>> {
  if index.contains(',') {
    return Ok(index.split(',').map(|i| i.trim().to_owned()).collect());
  }

  let numeric = Regex::new(r"^(\d+)\s*-\s*(\d+)$")?;
  if let Some(c) = numeric.captures(index) {
    let first = c[1]
      .parse::<u32>()
      .map_err(|_| StructgenError::invalid(index, "dimIndex"))?;
    let last = c[2]
      .parse::<u32>()
      .map_err(|_| StructgenError::invalid(index, "dimIndex"))?;
    return Ok((first..=last).map(|v| v.to_string()).collect());
  }

  let letters = Regex::new(r"^([A-Z])\s*-\s*([A-Z])$")?;
  if let Some(c) = letters.captures(index) {
    let first = c[1].chars().next().unwrap_or('A');
    let last = c[2].chars().next().unwrap_or('A');
    return Ok((first..=last).map(|v| v.to_string()).collect());
  }

  Ok(vec![index.trim().to_owned()])
}

/// Capabilities shared by everything that can sit in a `<registers>` block.
pub trait RegisterItem {
  fn name(&self) -> &str;

  /// Offset of the first element relative to the enclosing peripheral or cluster.
  fn address_offset(&self) -> u32;

  /// Bytes occupied by one element.
  fn element_size(&self) -> u32;

  fn dim(&self) -> Option<&DimSpec>;

  fn description(&self) -> Option<&str>;

  /// Offset one past the last byte of the last element.
  fn extent(&self) -> u32 {
    let last = self
      .dim()
      .map(|d| d.offset_of(d.dim.saturating_sub(1) as usize))
      .unwrap_or(0);
    self.address_offset() + last + self.element_size()
  }
}

/// Describes a register. Registers may be top-level constructs of a peripheral or may be nested
/// within register clusters.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterSpec {
  derived_from: Option<String>,

  /// Name that identifies the register. Must be unique within the scope of its parent.
  pub name: String,

  pub description: Option<String>,

  /// Register's starting address relative to its parent.
  pub address_offset: u32,

  /// The bit width of the register.
  pub size: Option<u32>,

  pub access: Option<AccessSpec>,

  /// The value of the register after reset.
  pub reset_value: Option<u64>,

  /// Set for `NAME[%s]` arrays, which stay one register.
  pub dim: Option<DimSpec>,

  /// Registers in the same group share an address with the first register declared there.
  pub alternate_group: Option<String>,

  /// Name of the register this one overlays.
  pub alternate_register: Option<String>,

  pub fields: Vec<FieldSpec>,

  /// Other registers overlaying this one's storage.
  pub alternates: Vec<RegisterSpec>,
}
impl RegisterSpec {
  /// Reads a `<register>` element. A `%s` name with a `dim` expands into one register per index;
  /// a `[%s]` name stays a single register carrying its dimension.
  pub(crate) fn new(el: &Element) -> StructgenResult<Vec<Self>> {
    let name = required_text(el, "name")?;

    let fields = match el.get_child("fields") {
      Some(f) => {
        let mut parsed = Vec::new();
        for field in children(f, "field") {
          parsed.extend(FieldSpec::new(field)?);
        }
        resolve_derivations(parsed)?
      }
      None => Vec::new(),
    };

    let mut prototype = Self {
      derived_from: derived_from(el),
      name: name.clone(),
      description: description(el)?,
      address_offset: required_u32(el, "addressOffset")?,
      size: integer_u32(el, "size")?,
      access: access(el)?,
      reset_value: integer(el, "resetValue")?,
      dim: None,
      alternate_group: text(el, "alternateGroup"),
      alternate_register: text(el, "alternateRegister"),
      fields,
      alternates: Vec::new(),
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

    let mut register_specs = Vec::with_capacity(dim.dim as usize);
    for (n, index) in dim.indices.iter().enumerate() {
      let mut spec = prototype.clone();
      spec.interpolate_array_params(index, prototype.address_offset + dim.offset_of(n));
      register_specs.push(spec);
    }

    Ok(register_specs)
  }

  /// Bit width, falling back to the SVD default once no enclosing scope supplied one.
  pub fn bit_size(&self) -> u32 {
    self.size.unwrap_or(DEFAULT_REGISTER_SIZE)
  }

  pub(crate) fn propagate_default_properties(
    &mut self,
    size: &Option<u32>,
    access: &Option<AccessSpec>,
    reset_value: &Option<u64>,
  ) -> bool {
    let mut changed = false;

    if self.size.is_none() && size.is_some() {
      self.size = *size;
      changed = true;
    }

    if self.access.is_none() && access.is_some() {
      self.access = *access;
      changed = true;
    }

    if self.reset_value.is_none() && reset_value.is_some() {
      self.reset_value = *reset_value;
      changed = true;
    }

    for field in self.fields.iter_mut() {
      if field.propagate_default_properties(&self.access) {
        changed = true;
      }
    }

    for alternate in self.alternates.iter_mut() {
      if alternate.propagate_default_properties(&self.size, &self.access, &self.reset_value) {
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

impl Derivable for RegisterSpec {
  const KIND: &'static str = "register";

  fn name(&self) -> &str {
    &self.name
  }

  fn derived_from(&self) -> Option<&str> {
    self.derived_from.as_deref()
  }

  fn inherit_from(&mut self, rs: &RegisterSpec) -> bool {
    let mut changed = false;

    if self.description.is_none() && rs.description.is_some() {
      self.description = rs.description.clone();
      changed = true;
    }

    if self.size.is_none() && rs.size.is_some() {
      self.size = rs.size;
      changed = true;
    }

    if self.access.is_none() && rs.access.is_some() {
      self.access = rs.access;
      changed = true;
    }

    if self.reset_value.is_none() && rs.reset_value.is_some() {
      self.reset_value = rs.reset_value;
      changed = true;
    }

    if self.dim.is_none() && rs.dim.is_some() {
      self.dim = rs.dim.clone();
      changed = true;
    }

    for ancestor in rs.fields.iter() {
      if let Some(descendant) = self.fields.iter_mut().find(|f| f.name == ancestor.name) {
        if descendant.inherit_from(ancestor) {
          changed = true;
        }
      } else {
        self.fields.push(ancestor.clone());
        changed = true;
      }
    }

    changed
  }
}

impl RegisterItem for RegisterSpec {
  fn name(&self) -> &str {
    &self.name
  }

  fn address_offset(&self) -> u32 {
    self.address_offset
  }

  fn element_size(&self) -> u32 {
    self.bit_size() / 8
  }

  fn dim(&self) -> Option<&DimSpec> {
    self.dim.as_ref()
  }

  fn description(&self) -> Option<&str> {
    self.description.as_deref()
  }
}

impl StructuralEq for RegisterSpec {
  fn structurally_eq(&self, other: &Self) -> bool {
    self.name == other.name
      && self.address_offset == other.address_offset
      && self.bit_size() == other.bit_size()
      && self.dim == other.dim
      && self.fields.structurally_eq(&other.fields)
      && self.alternates.structurally_eq(&other.alternates)
  }
}

/// An entry of a `<registers>` block.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterNode {
  Register(RegisterSpec),
  Cluster(ClusterSpec),
}
impl RegisterNode {
  /// Reads every register and cluster of a `<registers>` block or cluster body, resolves
  /// derivations between them and links alternate registers onto their targets.
  pub(crate) fn parse_block(el: &Element) -> StructgenResult<Vec<Self>> {
    let mut nodes = Vec::new();

    for child in el.children.iter() {
      match child.name.as_str() {
        "register" => nodes.extend(RegisterSpec::new(child)?.into_iter().map(RegisterNode::Register)),
        "cluster" => nodes.extend(ClusterSpec::new(child)?.into_iter().map(RegisterNode::Cluster)),
        _ => {}
      }
    }

    link_alternates(resolve_derivations(nodes)?)
  }

  pub fn as_register(&self) -> Option<&RegisterSpec> {
    match self {
      RegisterNode::Register(r) => Some(r),
      RegisterNode::Cluster(_) => None,
    }
  }

  pub fn as_cluster(&self) -> Option<&ClusterSpec> {
    match self {
      RegisterNode::Cluster(c) => Some(c),
      RegisterNode::Register(_) => None,
    }
  }

  pub(crate) fn propagate_default_properties(
    &mut self,
    size: &Option<u32>,
    access: &Option<AccessSpec>,
    reset_value: &Option<u64>,
  ) -> bool {
    match self {
      RegisterNode::Register(r) => r.propagate_default_properties(size, access, reset_value),
      RegisterNode::Cluster(c) => c.propagate_default_register_properties(size, access, reset_value),
    }
  }
}

impl Derivable for RegisterNode {
  const KIND: &'static str = "register";

  fn name(&self) -> &str {
    RegisterItem::name(self)
  }

  fn derived_from(&self) -> Option<&str> {
    match self {
      RegisterNode::Register(r) => r.derived_from(),
      RegisterNode::Cluster(c) => c.derived_from(),
    }
  }

  fn inherit_from(&mut self, base: &Self) -> bool {
    match (self, base) {
      (RegisterNode::Register(r), RegisterNode::Register(b)) => r.inherit_from(b),
      (RegisterNode::Cluster(c), RegisterNode::Cluster(b)) => c.inherit_from(b),
      _ => false,
    }
  }
}

impl RegisterItem for RegisterNode {
  fn name(&self) -> &str {
    match self {
      RegisterNode::Register(r) => &r.name,
      RegisterNode::Cluster(c) => &c.name,
    }
  }

  fn address_offset(&self) -> u32 {
    match self {
      RegisterNode::Register(r) => r.address_offset,
      RegisterNode::Cluster(c) => c.address_offset,
    }
  }

  fn element_size(&self) -> u32 {
    match self {
      RegisterNode::Register(r) => r.element_size(),
      RegisterNode::Cluster(c) => c.element_size(),
    }
  }

  fn dim(&self) -> Option<&DimSpec> {
    match self {
      RegisterNode::Register(r) => r.dim.as_ref(),
      RegisterNode::Cluster(c) => c.dim.as_ref(),
    }
  }

  fn description(&self) -> Option<&str> {
    match self {
      RegisterNode::Register(r) => r.description.as_deref(),
      RegisterNode::Cluster(c) => c.description.as_deref(),
    }
  }
}

impl StructuralEq for RegisterNode {
  fn structurally_eq(&self, other: &Self) -> bool {
    match (self, other) {
      (RegisterNode::Register(a), RegisterNode::Register(b)) => a.structurally_eq(b),
      (RegisterNode::Cluster(a), RegisterNode::Cluster(b)) => a.structurally_eq(b),
      _ => false,
    }
  }
}

/// Moves registers tagged `alternateRegister` or `alternateGroup` onto the `alternates` of the
/// register whose storage they share.
pub(crate) fn link_alternates(nodes: Vec<RegisterNode>) -> StructgenResult<Vec<RegisterNode>> {
  let mut linked = Vec::with_capacity(nodes.len());
  let mut grouped = Vec::new();
  let mut overlays = Vec::new();

  for node in nodes {
    match node {
      RegisterNode::Register(r) if r.alternate_register.is_some() => overlays.push(r),
      RegisterNode::Register(r) if r.alternate_group.is_some() => grouped.push(r),
      other => linked.push(other),
    }
  }

  for register in grouped {
    let target = linked.iter().position(|n: &RegisterNode| {
      n.as_register().is_some() && n.address_offset() == register.address_offset
    });

    match target {
      Some(t) => push_alternate(&mut linked[t], register)?,
      None => linked.push(RegisterNode::Register(register)),
    }
  }

  for register in overlays {
    let target_name = register.alternate_register.clone().unwrap_or_default();
    match linked.iter().position(|n| RegisterItem::name(n) == target_name) {
      Some(t) => push_alternate(&mut linked[t], register)?,
      None => {
        return Err(StructgenError::UnresolvedDerivation {
          kind: "alternate register",
          name: register.name,
          target: target_name,
        })
      }
    }
  }

  Ok(linked)
}

fn push_alternate(target: &mut RegisterNode, register: RegisterSpec) -> StructgenResult<()> {
  match target {
    RegisterNode::Register(t) => {
      t.alternates.push(register);
      Ok(())
    }
    RegisterNode::Cluster(c) => Err(StructgenError::invalid(
      &c.name,
      &format!("alternate target of register {} (must be a register)", register.name),
    )),
  }
}
