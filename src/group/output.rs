use log::info;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::{filter_peripherals, peripheral_groups, FilteredPeripheral, StructBuilder};
use crate::config::{self, SvdConfig};
use crate::emit;
use crate::error::StructgenResult;
use crate::ir::{Config, EnumDefaults, InstanceDecl, StructDefaults};
use crate::svd::{AddressBlockSpec, CpuSpec, InterruptSpec, SvdModel};

/// File name of the top-level document listing every include.
pub const MANIFEST: &str = "structgen.json";

/// File name of the document recording what the IR does not carry.
pub const METADATA: &str = "metadata.json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceMetadata {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub width: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeripheralMetadata {
  pub name: String,

  /// The struct declaration this peripheral is an instance of.
  #[serde(rename = "struct")]
  pub struct_name: String,
  pub base_address: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub group_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub derived_from: Option<String>,
  pub interrupts: Vec<InterruptSpec>,
  pub address_blocks: Vec<AddressBlockSpec>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub alternate_groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
  pub device: DeviceMetadata,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cpu: Option<CpuSpec>,
  pub peripherals: Vec<PeripheralMetadata>,
  pub filtered: Vec<FilteredPeripheral>,
}

/// Everything one SVD ingestion run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct SvdOutput {
  pub manifest: Config,

  /// One document per peripheral group, keyed by file name.
  pub includes: Vec<(String, Config)>,
  pub metadata: Metadata,
}
impl SvdOutput {
  /// Writes the manifest, every include and the metadata document into `dir`.
  pub fn write(&self, dir: &Path) -> StructgenResult<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(self.includes.len() + 2);

    let manifest = dir.join(MANIFEST);
    fs::write(&manifest, serde_json::to_string_pretty(&self.manifest)?)?;
    written.push(manifest);

    for (file, include) in self.includes.iter() {
      let path = dir.join(file);
      fs::write(&path, serde_json::to_string_pretty(include)?)?;
      written.push(path);
    }

    let metadata = dir.join(METADATA);
    fs::write(&metadata, serde_json::to_string_pretty(&self.metadata)?)?;
    written.push(metadata);

    info!("wrote {} files to {}", written.len(), dir.display());
    Ok(written)
  }

  /// The manifest with every include merged in, as `config::load` would produce from disk.
  pub fn merged(&self) -> StructgenResult<Config> {
    let mut config = self.manifest.clone();
    config.includes.clear();

    for (_, include) in self.includes.iter() {
      config::merge(&mut config, include.clone())?;
    }

    Ok(config)
  }
}

/// Hardware-register structs are mapped, not serialized: no codec, stream or helper methods.
fn struct_defaults() -> StructDefaults {
  StructDefaults {
    identifier: Some(false),
    methods: Some(false),
    codec: Some(false),
    stream: Some(false),
    json: Some(false),
    unit_test: Some(false),
  }
}

fn enum_defaults() -> EnumDefaults {
  EnumDefaults {
    identifier: Some(false),
    use_map: Some(false),
    json: Some(false),
    unit_test: Some(false),
  }
}

/// Groups the model's peripherals and lowers each group to one include document holding the
/// group's struct (with one instance per member peripheral), its cluster structs and its enums.
pub fn build(model: &SvdModel, config: &SvdConfig) -> StructgenResult<SvdOutput> {
  let (kept, filtered) = filter_peripherals(model, config);
  let groups = peripheral_groups(&kept, config)?;
  let namespace = vec![model.device.name.clone()];

  let mut builder = StructBuilder::new(config);
  let mut includes = Vec::with_capacity(groups.len());
  let mut peripherals = Vec::with_capacity(kept.len());

  for group in groups.iter() {
    let root = group.root;
    let struct_name = root.name.clone();

    let mut include = Config {
      namespace: namespace.clone(),
      ..Default::default()
    };

    let mut decl = builder.declare_struct(
      &root.name,
      &struct_name,
      root.description.clone(),
      &root.registers,
      &mut include,
    )?;

    for member in group.members() {
      decl.instances.push(InstanceDecl {
        name: member.name.clone(),
        address: member.base_address,
        description: member.description.clone(),
        volatile: true,
      });

      peripherals.push(PeripheralMetadata {
        name: member.name.clone(),
        struct_name: struct_name.clone(),
        base_address: member.base_address,
        group_name: member.group_name.clone(),
        derived_from: member.derived_from.clone(),
        interrupts: member.interrupts.clone(),
        address_blocks: member.address_blocks.clone(),
        alternate_groups: member.alternate_groups(),
      });
    }

    include.structs.insert(struct_name, decl);
    includes.push((format!("{}.json", emit::module_name(&root.name)), include));
  }

  peripherals.sort_by_key(|p| p.base_address);

  let manifest = Config {
    namespace,
    includes: includes.iter().map(|(file, _)| file.clone()).collect(),
    id_underlying: None,
    struct_defaults: struct_defaults(),
    enum_defaults: enum_defaults(),
    ..Default::default()
  };

  let metadata = Metadata {
    device: DeviceMetadata {
      name: model.device.name.clone(),
      version: model.device.version.clone(),
      description: model.device.description.clone(),
      width: model.device.width,
    },
    cpu: model.cpu.clone(),
    peripherals,
    filtered,
  };

  info!(
    "{}: {} struct groups, {} filtered peripherals",
    model.device.name,
    includes.len(),
    metadata.filtered.len()
  );

  Ok(SvdOutput {
    manifest,
    includes,
    metadata,
  })
}
