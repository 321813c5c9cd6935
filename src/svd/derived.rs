use log::debug;
use std::collections::{HashMap, VecDeque};

use crate::error::{StructgenError, StructgenResult};

/// An SVD element that may copy another element's definition by name through `derivedFrom`.
pub trait Derivable {
  /// Element kind named in errors.
  const KIND: &'static str;

  fn name(&self) -> &str;

  fn derived_from(&self) -> Option<&str>;

  /// Fills every property left unset on `self` from `base`. Returns whether anything changed.
  fn inherit_from(&mut self, base: &Self) -> bool;
}

/// Orders elements for resolution: elements that derive from nothing go to the front, derived
/// elements to the back, so popping from the front sees every independent element first.
pub fn derived_from_stack<T: Derivable>(items: Vec<T>) -> VecDeque<(usize, T)> {
  let mut stack = VecDeque::with_capacity(items.len());

  for (index, item) in items.into_iter().enumerate() {
    if item.derived_from().is_some() {
      stack.push_back((index, item));
    } else {
      stack.push_front((index, item));
    }
  }

  stack
}

/// Resolves every `derivedFrom` reference among sibling elements and returns them in their
/// original order.
///
/// A derived element whose target is itself still pending is retried after the rest of the
/// queue; a reference that never resolves fails with `UnresolvedDerivation`.
pub fn resolve_derivations<T: Derivable>(items: Vec<T>) -> StructgenResult<Vec<T>> {
  let count = items.len();
  let mut stack = derived_from_stack(items);
  let mut resolved: Vec<Option<T>> = (0..count).map(|_| None).collect();
  let mut by_name: HashMap<String, usize> = HashMap::with_capacity(count);
  let mut stalled = 0;

  while let Some((index, mut item)) = stack.pop_front() {
    if let Some(target) = item.derived_from().map(target_name) {
      let base = by_name.get(&target).and_then(|&t| resolved[t].as_ref());

      match base {
        Some(base) => {
          item.inherit_from(base);
          debug!("{} {} derived from {}", T::KIND, item.name(), target);
        }
        None => {
          let pending = stack.iter().any(|(_, p)| p.name() == target);
          if pending && stalled <= stack.len() {
            stalled += 1;
            stack.push_back((index, item));
            continue;
          }

          return Err(StructgenError::UnresolvedDerivation {
            kind: T::KIND,
            name: item.name().to_owned(),
            target,
          });
        }
      }
    }

    stalled = 0;
    by_name.insert(item.name().to_owned(), index);
    resolved[index] = Some(item);
  }

  Ok(resolved.into_iter().flatten().collect())
}

/// `derivedFrom` may be a dotted path; siblings are matched on the last segment.
fn target_name(derived_from: &str) -> String {
  derived_from
    .rsplit('.')
    .next()
    .unwrap_or(derived_from)
    .to_owned()
}

#[cfg(test)]
mod tests {
  use super::{derived_from_stack, resolve_derivations, Derivable};
  use crate::error::StructgenError;

  #[derive(Debug, Clone, PartialEq)]
  struct Node {
    name: String,
    derived_from: Option<String>,
    value: Option<u32>,
  }

  impl Derivable for Node {
    const KIND: &'static str = "node";

    fn name(&self) -> &str {
      &self.name
    }

    fn derived_from(&self) -> Option<&str> {
      self.derived_from.as_deref()
    }

    fn inherit_from(&mut self, base: &Self) -> bool {
      if self.value.is_none() && base.value.is_some() {
        self.value = base.value;
        return true;
      }
      false
    }
  }

  fn node(name: &str, derived_from: Option<&str>, value: Option<u32>) -> Node {
    Node {
      name: name.to_owned(),
      derived_from: derived_from.map(str::to_owned),
      value,
    }
  }

  #[test]
  fn independent_elements_come_first() {
    let stack = derived_from_stack(vec![
      node("b", Some("a"), None),
      node("a", None, Some(1)),
      node("c", None, Some(2)),
    ]);

    let order: Vec<&str> = stack.iter().map(|(_, n)| n.name.as_str()).collect();
    assert_eq!(vec!["c", "a", "b"], order);
  }

  #[test]
  fn resolves_in_document_order() {
    let nodes = resolve_derivations(vec![
      node("b", Some("a"), None),
      node("a", None, Some(1)),
      node("c", Some("a"), Some(7)),
    ])
    .unwrap();

    assert_eq!(node("b", Some("a"), Some(1)), nodes[0]);
    assert_eq!(node("a", None, Some(1)), nodes[1]);
    assert_eq!(Some(7), nodes[2].value);
  }

  #[test]
  fn resolves_chains_declared_out_of_order() {
    let nodes = resolve_derivations(vec![
      node("c", Some("b"), None),
      node("b", Some("a"), None),
      node("a", None, Some(3)),
    ])
    .unwrap();

    assert!(nodes.iter().all(|n| n.value == Some(3)));
  }

  #[test]
  fn accepts_dotted_targets() {
    let nodes =
      resolve_derivations(vec![node("a", None, Some(4)), node("b", Some("P.a"), None)]).unwrap();
    assert_eq!(Some(4), nodes[1].value);
  }

  #[test]
  fn missing_target_fails() {
    let result = resolve_derivations(vec![node("b", Some("zz"), None)]);
    assert!(matches!(
      result,
      Err(StructgenError::UnresolvedDerivation { kind: "node", .. })
    ));
  }

  #[test]
  fn cycles_fail() {
    let result = resolve_derivations(vec![node("a", Some("b"), None), node("b", Some("a"), None)]);
    assert!(matches!(result, Err(StructgenError::UnresolvedDerivation { .. })));
  }
}
