//! Peripheral grouping and deduplication: decides which peripherals share one struct
//! declaration, then lowers each group to the declarative IR.

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashSet;

use crate::config::SvdConfig;
use crate::error::{StructgenError, StructgenResult};
use crate::svd::{PeripheralSpec, StructuralEq, SvdModel};

pub mod enums;
mod fields;
mod output;

pub use fields::StructBuilder;
pub use output::{build, Metadata, PeripheralMetadata, SvdOutput, MANIFEST, METADATA};

/// A root peripheral plus every peripheral sharing its register layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PeripheralGroup<'a> {
  /// Never itself derived.
  pub root: &'a PeripheralSpec,
  pub derivatives: Vec<&'a PeripheralSpec>,
}
impl<'a> PeripheralGroup<'a> {
  /// Root first, then derivatives in the order they joined.
  pub fn members(&self) -> impl Iterator<Item = &'a PeripheralSpec> + '_ {
    std::iter::once(self.root).chain(self.derivatives.iter().copied())
  }

  pub fn contains(&self, name: &str) -> bool {
    self.members().any(|p| p.name == name)
  }
}

/// A peripheral left out of the output, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilteredPeripheral {
  pub name: String,
  pub reason: String,
}

/// Splits the model's peripherals into those that get generated and those filtered out.
pub fn filter_peripherals<'a>(
  model: &'a SvdModel,
  config: &SvdConfig,
) -> (Vec<&'a PeripheralSpec>, Vec<FilteredPeripheral>) {
  let mut filtered = Vec::new();
  let mut dropped = HashSet::new();

  for p in model.peripherals.iter() {
    let reason = if config.is_ignored(&p.name) {
      Some("ignored by configuration".to_owned())
    } else if p.registers.is_empty() {
      Some("no registers".to_owned())
    } else {
      None
    };

    if let Some(reason) = reason {
      dropped.insert(p.name.clone());
      filtered.push(FilteredPeripheral {
        name: p.name.clone(),
        reason,
      });
    }
  }

  // Derivatives of a dropped peripheral have no root left to join.
  loop {
    let orphans: Vec<&PeripheralSpec> = model
      .peripherals
      .iter()
      .filter(|p| !dropped.contains(&p.name))
      .filter(|p| matches!(&p.derived_from, Some(target) if dropped.contains(target)))
      .collect();

    if orphans.is_empty() {
      break;
    }

    for p in orphans {
      let target = p.derived_from.clone().unwrap_or_default();
      dropped.insert(p.name.clone());
      filtered.push(FilteredPeripheral {
        name: p.name.clone(),
        reason: format!("derived from filtered peripheral {}", target),
      });
    }
  }

  for f in filtered.iter() {
    warn!("skipping peripheral {}: {}", f.name, f.reason);
  }

  let kept = model
    .peripherals
    .iter()
    .filter(|p| !dropped.contains(&p.name))
    .collect();

  (kept, filtered)
}

/// Partitions peripherals into groups.
///
/// Every peripheral without `derivedFrom` roots a group, unless structural pruning is enabled
/// and an earlier root has an identical layout, in which case it joins that root instead. Derived
/// peripherals join the group holding their target.
pub fn peripheral_groups<'a>(
  peripherals: &[&'a PeripheralSpec],
  config: &SvdConfig,
) -> StructgenResult<Vec<PeripheralGroup<'a>>> {
  let mut groups: Vec<PeripheralGroup<'a>> = Vec::new();

  for &p in peripherals.iter().filter(|p| p.derived_from.is_none()) {
    if config.prune_structs {
      if let Some(group) = groups.iter_mut().find(|g| g.root.structurally_eq(p)) {
        debug!("{} has the same layout as {}", p.name, group.root.name);
        group.derivatives.push(p);
        continue;
      }
    }

    groups.push(PeripheralGroup {
      root: p,
      derivatives: Vec::new(),
    });
  }

  let mut pending: Vec<&'a PeripheralSpec> = peripherals
    .iter()
    .copied()
    .filter(|p| p.derived_from.is_some())
    .collect();

  while !pending.is_empty() {
    let before = pending.len();

    pending.retain(|p| {
      let target = p.derived_from.as_deref().unwrap_or_default();
      match groups.iter_mut().find(|g| g.contains(target)) {
        Some(group) => {
          debug!("{} joins group {}", p.name, group.root.name);
          group.derivatives.push(*p);
          false
        }
        None => true,
      }
    });

    if pending.len() == before {
      return Err(StructgenError::AmbiguousRoot(pending[0].name.clone()));
    }
  }

  info!(
    "{} peripherals in {} groups",
    peripherals.len(),
    groups.len()
  );

  Ok(groups)
}
