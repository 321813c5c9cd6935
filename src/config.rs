use log::debug;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{StructgenError, StructgenResult};
use crate::ir::{Config, EnumDecl, StructDecl};

/// Concrete struct flags after default layering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructFlags {
  pub identifier: bool,
  pub methods: bool,
  pub codec: bool,
  pub stream: bool,
  pub json: bool,
  pub unit_test: bool,
}
impl Default for StructFlags {
  fn default() -> Self {
    Self {
      identifier: false,
      methods: true,
      codec: true,
      stream: false,
      json: false,
      unit_test: false,
    }
  }
}
impl StructFlags {
  /// Resolves a declaration's flags: the declaration wins, then the document's `struct` block,
  /// then the built-in defaults.
  pub fn resolve(config: &Config, decl: &StructDecl) -> Self {
    let builtin = Self::default();
    let defaults = &config.struct_defaults;
    let pick = |own: Option<bool>, shared: Option<bool>, fallback: bool| {
      own.or(shared).unwrap_or(fallback)
    };

    Self {
      identifier: pick(decl.flags.identifier, defaults.identifier, builtin.identifier),
      methods: pick(decl.flags.methods, defaults.methods, builtin.methods),
      codec: pick(decl.flags.codec, defaults.codec, builtin.codec),
      stream: pick(decl.flags.stream, defaults.stream, builtin.stream),
      json: pick(decl.flags.json, defaults.json, builtin.json),
      unit_test: pick(decl.flags.unit_test, defaults.unit_test, builtin.unit_test),
    }
  }
}

/// Concrete enum flags after default layering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnumFlags {
  pub identifier: bool,
  pub use_map: bool,
  pub json: bool,
  pub unit_test: bool,
}
impl EnumFlags {
  pub fn resolve(config: &Config, decl: &EnumDecl) -> Self {
    let defaults = &config.enum_defaults;

    Self {
      identifier: decl.flags.identifier.or(defaults.identifier).unwrap_or(false),
      use_map: decl.flags.use_map.or(defaults.use_map).unwrap_or(false),
      json: decl.flags.json.or(defaults.json).unwrap_or(false),
      unit_test: decl.flags.unit_test.or(defaults.unit_test).unwrap_or(false),
    }
  }
}

/// Options for SVD ingestion. Passed explicitly to grouping and enum naming so that each run
/// carries its own state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvdConfig {
  /// Merge peripherals and clusters that are structurally identical even when the document does
  /// not derive one from the other.
  pub prune_structs: bool,

  /// Reuse one enum declaration for identical enumerations within a peripheral.
  pub prune_enums: bool,

  /// Bit-fields narrower than this stay raw integers even when they carry enumerated values.
  pub min_enum_width: u32,

  /// Peripheral names to leave out of the output.
  pub ignore: Vec<String>,
}
impl Default for SvdConfig {
  fn default() -> Self {
    Self {
      prune_structs: false,
      prune_enums: false,
      min_enum_width: 2,
      ignore: Vec::new(),
    }
  }
}
impl SvdConfig {
  pub fn is_ignored(&self, peripheral: &str) -> bool {
    self.ignore.iter().any(|i| i == peripheral)
  }
}

/// Loads a configuration document and every document it includes.
pub fn load(path: &Path) -> StructgenResult<Config> {
  let mut visited = HashSet::new();
  load_recursive(path, &mut visited)
}

/// Parses one document, choosing the format by file extension.
pub fn parse(path: &Path, contents: &str) -> StructgenResult<Config> {
  match path.extension().and_then(|e| e.to_str()) {
    Some("toml") => Ok(toml::from_str(contents)?),
    Some("json") => Ok(serde_json::from_str(contents)?),
    _ => Err(StructgenError::invalid(
      &path.display().to_string(),
      "configuration path (expected a .json or .toml file)",
    )),
  }
}

fn load_recursive(path: &Path, visited: &mut HashSet<PathBuf>) -> StructgenResult<Config> {
  if !visited.insert(fs::canonicalize(path)?) {
    debug!("{} already included, skipping", path.display());
    return Ok(Config::default());
  }

  let mut config = parse(path, &fs::read_to_string(path)?)?;

  let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
  let includes = std::mem::take(&mut config.includes);

  for include in includes {
    let included = load_recursive(&base.join(&include), visited)?;
    debug!(
      "{}: merging {} structs and {} enums from {}",
      path.display(),
      included.structs.len(),
      included.enums.len(),
      include
    );
    merge(&mut config, included)?;
  }

  Ok(config)
}

/// Merges the declarations of `other` into `config`. The including document's namespace and
/// defaults win; declarations must not collide.
pub fn merge(config: &mut Config, other: Config) -> StructgenResult<()> {
  if config.namespace.is_empty() {
    config.namespace = other.namespace.clone();
  }

  if config.id_underlying.is_none() {
    config.id_underlying = other.id_underlying.clone();
  }

  let namespace = other.namespace;

  merge_map(&mut config.structs, other.structs, |decl: &mut StructDecl| {
    if decl.namespace.is_none() && !namespace.is_empty() {
      decl.namespace = Some(namespace.clone());
    }
  })?;

  merge_map(&mut config.enums, other.enums, |decl: &mut EnumDecl| {
    if decl.namespace.is_none() && !namespace.is_empty() {
      decl.namespace = Some(namespace.clone());
    }
  })?;

  Ok(())
}

fn merge_map<T, F>(
  into: &mut BTreeMap<String, T>,
  from: BTreeMap<String, T>,
  mut adopt: F,
) -> StructgenResult<()>
where
  F: FnMut(&mut T),
{
  for (name, mut decl) in from {
    if into.contains_key(&name) {
      return Err(StructgenError::DuplicateType(name));
    }
    adopt(&mut decl);
    into.insert(name, decl);
  }

  Ok(())
}
