//! Lowers resolved registers and clusters to struct declarations.

use log::debug;

use super::enums::EnumNamer;
use crate::config::SvdConfig;
use crate::error::{StructgenError, StructgenResult};
use crate::ir::{AlternateDecl, BitFieldDecl, Config, FieldDecl, StructDecl};
use crate::svd::{ClusterSpec, RegisterItem, RegisterNode, RegisterSpec, StructuralEq};

/// Lowers register blocks into declarations, remembering the cluster structs and enums already
/// emitted so that later groups can share them.
#[derive(Debug)]
pub struct StructBuilder<'c> {
  config: &'c SvdConfig,
  enums: EnumNamer,
  clusters: Vec<(ClusterSpec, String)>,
}
impl<'c> StructBuilder<'c> {
  pub fn new(config: &'c SvdConfig) -> Self {
    Self {
      config,
      enums: EnumNamer::new(config),
      clusters: Vec::new(),
    }
  }

  /// Declares `struct_name` from a register block. Cluster structs and bit-field enums it needs are
  /// declared into `out` as well.
  pub fn declare_struct(
    &mut self,
    peripheral: &str,
    struct_name: &str,
    description: Option<String>,
    nodes: &[RegisterNode],
    out: &mut Config,
  ) -> StructgenResult<StructDecl> {
    let mut ordered: Vec<&RegisterNode> = nodes.iter().collect();
    ordered.sort_by_key(|n| n.address_offset());

    let mut fields = Vec::with_capacity(ordered.len());
    for node in ordered {
      match node {
        RegisterNode::Register(r) => fields.extend(self.register_fields(peripheral, struct_name, r, out)?),
        RegisterNode::Cluster(c) => fields.extend(self.cluster_fields(peripheral, struct_name, c, out)?),
      }
    }

    Ok(StructDecl {
      description,
      fields,
      ..Default::default()
    })
  }

  fn register_fields(
    &mut self,
    peripheral: &str,
    struct_name: &str,
    register: &RegisterSpec,
    out: &mut Config,
  ) -> StructgenResult<Vec<FieldDecl>> {
    let size = register.bit_size();
    if !matches!(size, 8 | 16 | 32 | 64) {
      return Err(StructgenError::InvalidRegisterSize {
        name: format!("{}.{}", struct_name, register.name),
        size,
      });
    }

    let prefix = format!("{}_{}", struct_name, register.name);
    let prototype = FieldDecl {
      name: register.name.clone(),
      type_name: format!("uint{}", size),
      description: register.description.clone(),
      is_const: !register.access.map(|a| a.can_write()).unwrap_or(true),
      volatile: true,
      fields: self.bit_fields(peripheral, &prefix, register, out)?,
      alternates: register
        .alternates
        .iter()
        .map(|alt| -> StructgenResult<AlternateDecl> {
          Ok(AlternateDecl {
            name: alt.name.clone(),
            description: alt.description.clone(),
            fields: self.bit_fields(peripheral, &format!("{}_{}", struct_name, alt.name), alt, out)?,
          })
        })
        .collect::<StructgenResult<Vec<AlternateDecl>>>()?,
      ..Default::default()
    };

    Ok(place(register, prototype))
  }

  fn bit_fields(
    &mut self,
    peripheral: &str,
    prefix: &str,
    register: &RegisterSpec,
    out: &mut Config,
  ) -> StructgenResult<Vec<BitFieldDecl>> {
    let mut bit_fields = Vec::with_capacity(register.fields.len());

    for field in register.fields.iter() {
      let bits = field.bits()?;

      let enum_type = match field.readable_values() {
        Some(values) if bits.width >= self.config.min_enum_width && !values.values.is_empty() => {
          let proposed = format!("{}_{}", prefix, field.name);
          Some(self.enums.declare(peripheral, &proposed, values, bits.width, &mut out.enums)?)
        }
        _ => None,
      };

      bit_fields.push(BitFieldDecl {
        name: field.name.clone(),
        index: bits.offset,
        width: bits.width,
        read: field.can_read(),
        write: field.can_write(),
        type_name: enum_type,
        description: field.description.clone(),
      });
    }

    Ok(bit_fields)
  }

  fn cluster_fields(
    &mut self,
    peripheral: &str,
    struct_name: &str,
    cluster: &ClusterSpec,
    out: &mut Config,
  ) -> StructgenResult<Vec<FieldDecl>> {
    let type_name = self.cluster_struct(peripheral, struct_name, cluster, out)?;

    let prototype = FieldDecl {
      name: cluster.name.clone(),
      type_name,
      description: cluster.description.clone(),
      ..Default::default()
    };

    Ok(place(cluster, prototype))
  }

  /// Declares the struct for a cluster's body, or finds an identical one when pruning.
  fn cluster_struct(
    &mut self,
    peripheral: &str,
    struct_name: &str,
    cluster: &ClusterSpec,
    out: &mut Config,
  ) -> StructgenResult<String> {
    if self.config.prune_structs {
      if let Some((_, name)) = self.clusters.iter().find(|(c, _)| c.structurally_eq(cluster)) {
        debug!("{}: cluster {} shares struct {}", struct_name, cluster.name, name);
        return Ok(name.clone());
      }
    }

    let name = format!("{}_{}", struct_name, cluster.name);
    if out.structs.contains_key(&name) || self.clusters.iter().any(|(_, n)| *n == name) {
      return Err(StructgenError::DuplicateType(name));
    }

    let decl = self.declare_struct(
      peripheral,
      &name,
      cluster.description.clone(),
      &cluster.children,
      out,
    )?;
    out.structs.insert(name.clone(), decl);
    self.clusters.push((cluster.clone(), name.clone()));

    Ok(name)
  }
}

/// Positions a register or cluster field. Arrays whose stride equals the element size become one
/// array field; any other stride expands into one field per index so padding fills the gaps.
fn place<T: RegisterItem>(item: &T, prototype: FieldDecl) -> Vec<FieldDecl> {
  let offset = item.address_offset() as usize;

  match item.dim() {
    Some(dim) if dim.increment == item.element_size() => vec![FieldDecl {
      array_length: Some(dim.dim as usize),
      expected_offset: Some(offset),
      ..prototype
    }],
    Some(dim) => dim
      .indices
      .iter()
      .enumerate()
      .map(|(n, index)| FieldDecl {
        name: format!("{}{}", prototype.name, index),
        expected_offset: Some(offset + dim.offset_of(n) as usize),
        ..prototype.clone()
      })
      .collect(),
    None => vec![FieldDecl {
      expected_offset: Some(offset),
      ..prototype
    }],
  }
}

#[cfg(test)]
mod tests {
  use super::StructBuilder;
  use crate::config::SvdConfig;
  use crate::error::StructgenError;
  use crate::ir::Config;
  use crate::svd::ingest_str;

  const DEVICE: &str = r##"
    <device>
      <name>ACME</name>
      <peripherals>
        <peripheral>
          <name>DMA</name>
          <baseAddress>0x40020000</baseAddress>
          <registers>
            <register>
              <name>STATUS</name>
              <addressOffset>0x4</addressOffset>
              <access>read-only</access>
              <fields>
                <field>
                  <name>STATE</name>
                  <bitRange>[3:0]</bitRange>
                  <enumeratedValues>
                    <enumeratedValue><name>IDLE</name><value>0</value></enumeratedValue>
                    <enumeratedValue><name>BUSY</name><value>1</value></enumeratedValue>
                  </enumeratedValues>
                </field>
                <field>
                  <name>ERR</name>
                  <bitRange>[4:4]</bitRange>
                  <enumeratedValues>
                    <enumeratedValue><name>NO</name><value>0</value></enumeratedValue>
                    <enumeratedValue><name>YES</name><value>1</value></enumeratedValue>
                  </enumeratedValues>
                </field>
              </fields>
            </register>
            <register>
              <name>CTRL</name>
              <addressOffset>0x0</addressOffset>
              <size>16</size>
            </register>
            <register>
              <name>CTRL_ALT</name>
              <addressOffset>0x0</addressOffset>
              <size>16</size>
              <alternateRegister>CTRL</alternateRegister>
              <fields>
                <field><name>RAW</name><bitRange>[15:0]</bitRange></field>
              </fields>
            </register>
            <cluster>
              <name>CH[%s]</name>
              <addressOffset>0x10</addressOffset>
              <dim>2</dim>
              <dimIncrement>8</dimIncrement>
              <register><name>SRC</name><addressOffset>0</addressOffset></register>
              <register><name>DST</name><addressOffset>4</addressOffset></register>
            </cluster>
            <cluster>
              <name>AUX[%s]</name>
              <addressOffset>0x20</addressOffset>
              <dim>2</dim>
              <dimIncrement>8</dimIncrement>
              <register><name>V</name><addressOffset>0</addressOffset></register>
            </cluster>
          </registers>
        </peripheral>
      </peripherals>
    </device>
  "##;

  fn lower(config: &SvdConfig) -> (crate::ir::StructDecl, Config) {
    let model = ingest_str(DEVICE).unwrap();
    let dma = model.peripheral("DMA").unwrap();
    let mut out = Config::default();
    let decl = StructBuilder::new(config)
      .declare_struct("DMA", "DMA", None, &dma.registers, &mut out)
      .unwrap();
    (decl, out)
  }

  #[test]
  fn lowers_registers_in_offset_order() {
    let (decl, _) = lower(&SvdConfig::default());

    let names: Vec<&str> = decl.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(vec!["CTRL", "STATUS", "CH", "AUX0", "AUX1"], names);

    let ctrl = &decl.fields[0];
    assert_eq!("uint16", ctrl.type_name);
    assert_eq!(Some(0), ctrl.expected_offset);
    assert!(ctrl.volatile && !ctrl.is_const);
    assert_eq!("CTRL_ALT", ctrl.alternates[0].name);
    assert_eq!(16, ctrl.alternates[0].fields[0].width);

    let status = &decl.fields[1];
    assert_eq!("uint32", status.type_name);
    assert!(status.is_const);
    assert!(status.fields.iter().all(|b| b.read && !b.write));
  }

  #[test]
  fn narrow_fields_stay_raw() {
    let (decl, out) = lower(&SvdConfig::default());
    let status = &decl.fields[1];

    assert_eq!(Some("DMA_STATUS_STATE".to_owned()), status.fields[0].type_name);
    assert_eq!(None, status.fields[1].type_name);
    assert_eq!(1, out.enums.len());
    assert_eq!("IDLE", out.enums["DMA_STATUS_STATE"].members[0].0);
  }

  #[test]
  fn clusters_become_structs() {
    let (decl, out) = lower(&SvdConfig::default());

    let ch = &decl.fields[2];
    assert_eq!("DMA_CH", ch.type_name);
    assert_eq!(Some(2), ch.array_length);
    assert_eq!(Some(0x10), ch.expected_offset);

    let aux = &decl.fields[4];
    assert_eq!("DMA_AUX", aux.type_name);
    assert_eq!(None, aux.array_length);
    assert_eq!(Some(0x28), aux.expected_offset);

    assert_eq!(2, out.structs["DMA_CH"].fields.len());
  }

  #[test]
  fn pruning_shares_identical_clusters() {
    let config = SvdConfig {
      prune_structs: true,
      ..Default::default()
    };
    let model = ingest_str(DEVICE).unwrap();
    let dma = model.peripheral("DMA").unwrap();

    let mut builder = StructBuilder::new(&config);
    let mut out = Config::default();
    builder
      .declare_struct("DMA", "DMA", None, &dma.registers, &mut out)
      .unwrap();
    let again = builder
      .declare_struct("DMA", "DMA2", None, &dma.registers, &mut out)
      .unwrap();

    assert_eq!("DMA_CH", again.fields[2].type_name);
    assert!(!out.structs.contains_key("DMA2_CH"));
  }

  #[test]
  fn rejects_odd_register_sizes() {
    let model = ingest_str(
      r##"
      <device>
        <name>ACME</name>
        <peripherals>
          <peripheral>
            <name>P</name>
            <baseAddress>0</baseAddress>
            <registers>
              <register><name>R</name><addressOffset>0</addressOffset><size>24</size></register>
            </registers>
          </peripheral>
        </peripherals>
      </device>
      "##,
    )
    .unwrap();

    let config = SvdConfig::default();
    let result = StructBuilder::new(&config).declare_struct(
      "P",
      "P",
      None,
      &model.peripherals[0].registers,
      &mut Config::default(),
    );

    assert!(matches!(
      result,
      Err(StructgenError::InvalidRegisterSize { size: 24, .. })
    ));
  }
}
