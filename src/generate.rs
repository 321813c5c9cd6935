use log::{error, info};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::codec::CodecGenerator;
use crate::emit;
use crate::error::{StructgenError, StructgenResult};
use crate::registry::TypeRegistry;

/// One unit of generation work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declaration<'a> {
  Struct(&'a str),
  Enum(&'a str),
}
impl<'a> Declaration<'a> {
  pub fn name(&self) -> &'a str {
    match *self {
      Declaration::Struct(name) | Declaration::Enum(name) => name,
    }
  }

  fn directory(&self) -> &'static str {
    match self {
      Declaration::Struct(_) => "structs",
      Declaration::Enum(_) => "enums",
    }
  }
}

/// Files written by a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
  pub structs: Vec<String>,
  pub enums: Vec<String>,
  pub files: Vec<PathBuf>,
}

/// Renders the source for one declaration against the frozen registry.
pub fn render(registry: &TypeRegistry, declaration: Declaration) -> StructgenResult<String> {
  match declaration {
    Declaration::Struct(name) => {
      let s = registry
        .get_struct(name)
        .ok_or_else(|| StructgenError::unknown_type(name, "generation"))?;
      emit::render_struct(&CodecGenerator::new(registry), s)
    }
    Declaration::Enum(name) => {
      let e = registry
        .get_enum(name)
        .ok_or_else(|| StructgenError::unknown_type(name, "generation"))?;
      emit::render_enum(registry, e)
    }
  }
}

/// Generates every registered declaration into `output`, which is removed and recreated first.
///
/// Declarations are rendered by `jobs` workers sharing the registry read-only. A failing
/// declaration does not stop its siblings, but the run as a whole fails and names every
/// declaration that did not generate.
pub fn generate(
  registry: &TypeRegistry,
  output: &Path,
  jobs: usize,
) -> StructgenResult<GenerationReport> {
  let declarations: Vec<Declaration> = registry
    .structs()
    .map(|s| Declaration::Struct(s.name.as_str()))
    .chain(registry.enums().map(|e| Declaration::Enum(e.name.as_str())))
    .collect();
  check_module_names(&declarations)?;

  if output.exists() {
    fs::remove_dir_all(output)?;
  }
  fs::create_dir_all(output.join("structs"))?;
  fs::create_dir_all(output.join("enums"))?;

  let next = AtomicUsize::new(0);
  let written = Mutex::new(Vec::with_capacity(declarations.len()));
  let failed = Mutex::new(Vec::new());
  let jobs = jobs.max(1).min(declarations.len().max(1));

  std::thread::scope(|scope| {
    for _ in 0..jobs {
      scope.spawn(|| loop {
        let index = next.fetch_add(1, Ordering::Relaxed);
        let declaration = match declarations.get(index) {
          Some(d) => *d,
          None => break,
        };

        match write_declaration(registry, output, declaration) {
          Ok(path) => lock(&written).push((index, path)),
          Err(e) => {
            error!("{}: {}", declaration.name(), e);
            lock(&failed).push(declaration.name().to_owned());
          }
        }
      });
    }
  });

  let mut failed = into_inner(failed);
  if !failed.is_empty() {
    failed.sort();
    return Err(StructgenError::GenerationFailed(failed));
  }

  let mut written = into_inner(written);
  written.sort_by_key(|(index, _)| *index);

  let mut report = GenerationReport::default();
  for (index, path) in written {
    match declarations[index] {
      Declaration::Struct(name) => report.structs.push(name.to_owned()),
      Declaration::Enum(name) => report.enums.push(name.to_owned()),
    }
    report.files.push(path);
  }

  let root = output.join("mod.rs");
  fs::write(&root, emit::render_root())?;
  report.files.push(root);

  let structs = output.join("structs").join("mod.rs");
  fs::write(&structs, emit::render_index(report.structs.iter().map(String::as_str))?)?;
  report.files.push(structs);

  let enums = output.join("enums").join("mod.rs");
  fs::write(&enums, emit::render_index(report.enums.iter().map(String::as_str))?)?;
  report.files.push(enums);

  info!(
    "generated {} structs and {} enums into {}",
    report.structs.len(),
    report.enums.len(),
    output.display()
  );

  Ok(report)
}

/// Declarations sharing a directory must map to distinct module files.
fn check_module_names(declarations: &[Declaration]) -> StructgenResult<()> {
  let mut seen = HashSet::new();
  for declaration in declarations {
    let module = emit::module_name(declaration.name());
    if !seen.insert((declaration.directory(), module)) {
      return Err(StructgenError::DuplicateType(declaration.name().to_owned()));
    }
  }
  Ok(())
}

fn write_declaration(
  registry: &TypeRegistry,
  output: &Path,
  declaration: Declaration,
) -> StructgenResult<PathBuf> {
  let source = render(registry, declaration)?;
  let path = output
    .join(declaration.directory())
    .join(format!("{}.rs", emit::module_name(declaration.name())));

  if let Err(e) = fs::write(&path, source) {
    let _ = fs::remove_file(&path);
    return Err(e.into());
  }

  Ok(path)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn into_inner<T>(mutex: Mutex<T>) -> T {
  mutex
    .into_inner()
    .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
  use super::{generate, render, Declaration};
  use crate::error::StructgenError;
  use crate::ir::Config;
  use crate::registry::TypeRegistry;
  use std::fs;

  fn registry() -> TypeRegistry {
    let config: Config = serde_json::from_str(
      r##"{
        "enums": { "Mode": { "enum": { "idle": null, "run": null } } },
        "structs": {
          "Status": { "fields": [ { "name": "mode", "type": "Mode" }, { "name": "count", "type": "uint32" } ] },
          "Empty": { "fields": [] }
        }
      }"##,
    )
    .unwrap();
    TypeRegistry::from_config(&config).unwrap()
  }

  #[test]
  fn writes_every_declaration() {
    let registry = registry();
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("generated");

    fs::create_dir_all(output.join("stale")).unwrap();

    let report = generate(&registry, &output, 4).unwrap();
    assert_eq!(vec!["Empty", "Status"], report.structs);
    assert_eq!(vec!["Mode"], report.enums);
    assert!(!output.join("stale").exists());

    let status = fs::read_to_string(output.join("structs/status.rs")).unwrap();
    assert!(status.contains("pub struct Status {"));

    let index = fs::read_to_string(output.join("structs/mod.rs")).unwrap();
    assert!(index.contains("pub mod empty;"));
    assert!(index.contains("pub use status::Status;"));

    assert!(output.join("enums/mode.rs").exists());
    assert!(fs::read_to_string(output.join("mod.rs"))
      .unwrap()
      .contains("pub enum Endianness"));
  }

  #[test]
  fn single_worker_matches_parallel_output() {
    let registry = registry();
    let dir = tempfile::tempdir().unwrap();

    generate(&registry, &dir.path().join("one"), 1).unwrap();
    generate(&registry, &dir.path().join("many"), 8).unwrap();

    for file in ["structs/status.rs", "structs/empty.rs", "enums/mode.rs"] {
      assert_eq!(
        fs::read_to_string(dir.path().join("one").join(file)).unwrap(),
        fs::read_to_string(dir.path().join("many").join(file)).unwrap()
      );
    }
  }

  #[test]
  fn case_only_name_differences_collide() {
    let config: Config = serde_json::from_str(
      r##"{ "structs": { "UART": { "fields": [] }, "Uart": { "fields": [] } } }"##,
    )
    .unwrap();
    let registry = TypeRegistry::from_config(&config).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("generated");
    fs::create_dir_all(&output).unwrap();
    fs::write(output.join("keep.rs"), "").unwrap();

    assert!(matches!(
      generate(&registry, &output, 2),
      Err(StructgenError::DuplicateType(name)) if name == "Uart"
    ));
    assert!(output.join("keep.rs").exists());
  }

  #[test]
  fn unknown_declarations_fail() {
    let registry = registry();
    assert!(matches!(
      render(&registry, Declaration::Struct("Nope")),
      Err(StructgenError::UnknownType { .. })
    ));
  }
}
