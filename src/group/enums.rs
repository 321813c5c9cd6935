//! Turns SVD enumerated values into enum declarations with usable member names.

use log::debug;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::SvdConfig;
use crate::error::{StructgenError, StructgenResult};
use crate::ir::{EnumDecl, EnumMemberDecl};
use crate::svd::{EnumeratedValueSpec, EnumeratedValuesSpec};

/// Dropped from member names built out of descriptions.
pub const IGNORE_WORDS: [&str; 18] = [
  "the", "as", "a", "is", "will", "but", "are", "yet", "that", "to", "and", "in", "of", "on",
  "for", "from", "its", "it",
];

/// Names at least this long are cut down to keep generated identifiers readable.
const MAX_NAME_LEN: usize = 50;
const TRUNCATED_LEN: usize = 45;

/// Placeholder names like `value1` say nothing; when a description exists, build the name from
/// its words instead.
pub fn member_name(name: &str, description: Option<&str>) -> String {
  let description = match description {
    Some(d) if name.to_lowercase().starts_with("value") => d,
    _ => return name.to_owned(),
  };

  let parts: Vec<String> = description
    .split_whitespace()
    .filter(|word| *word != "-")
    .map(|word| {
      word
        .to_lowercase()
        .replace('-', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
    })
    .filter(|word| !word.is_empty())
    .collect();

  let parts: Vec<&str> = if parts.len() > 1 {
    parts
      .iter()
      .map(String::as_str)
      .filter(|word| !IGNORE_WORDS.contains(word))
      .collect()
  } else {
    parts.iter().map(String::as_str).collect()
  };

  if parts.is_empty() {
    name.to_owned()
  } else {
    parts.join("_")
  }
}

/// Strips a prefix shared by every name when it is longer than one character. A name equal to the
/// prefix keeps it.
pub fn remove_common_prefix(names: &mut [String]) {
  if names.len() < 2 {
    return;
  }

  let mut prefix = names[0].clone();
  for name in names.iter().skip(1) {
    let shared = prefix
      .chars()
      .zip(name.chars())
      .take_while(|(a, b)| a == b)
      .count();
    prefix.truncate(prefix.char_indices().nth(shared).map(|(i, _)| i).unwrap_or(prefix.len()));
  }

  if prefix.chars().count() <= 1 {
    return;
  }

  for name in names.iter_mut() {
    if *name != prefix {
      *name = name[prefix.len()..].to_owned();
    }
  }
}

/// Cuts names of 51 characters or more down to 45 plus a `_cont` marker.
pub fn truncate(name: &str) -> String {
  if name.chars().count() > MAX_NAME_LEN {
    let mut cut: String = name.chars().take(TRUNCATED_LEN).collect();
    cut.push_str("_cont");
    cut
  } else {
    name.to_owned()
  }
}

/// Makes a name usable and unique among `taken`: a leading digit gets a `_` prefix and `_x` is
/// appended until the name is free.
pub fn unique_name(name: &str, taken: &HashSet<String>) -> String {
  let mut result = name.to_owned();

  if result.starts_with(|c: char| c.is_ascii_digit()) {
    result.insert(0, '_');
  }

  while taken.contains(&result) {
    result.push_str("_x");
  }

  result
}

fn sanitize(name: &str) -> String {
  name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
    .collect()
}

/// Builds the member list for one enumeration. The `isDefault` member moves to the end so that it
/// takes the next free value.
pub fn members(values: &[EnumeratedValueSpec]) -> StructgenResult<Vec<(String, EnumMemberDecl)>> {
  let mut ordered: Vec<&EnumeratedValueSpec> = values.iter().filter(|v| !v.is_default).collect();
  ordered.extend(values.iter().filter(|v| v.is_default));

  let mut names: Vec<String> = ordered
    .iter()
    .map(|v| sanitize(&member_name(&v.name, v.description.as_deref())))
    .collect();
  remove_common_prefix(&mut names);

  let mut taken = HashSet::with_capacity(names.len());
  let mut members = Vec::with_capacity(names.len());

  for (name, value) in names.iter().zip(ordered) {
    let name = unique_name(&truncate(name), &taken);
    taken.insert(name.clone());

    let numeric = match value.value {
      Some(v) if !value.is_default => Some(
        i64::try_from(v)
          .map_err(|_| StructgenError::invalid(&v.to_string(), &format!("enum member {}", name)))?,
      ),
      _ => None,
    };

    members.push((
      name,
      EnumMemberDecl {
        value: numeric,
        description: value.description.clone(),
      },
    ));
  }

  Ok(members)
}

/// Smallest unsigned primitive holding `width` bits.
pub fn underlying_for_width(width: u32) -> &'static str {
  match width {
    0..=8 => "uint8",
    9..=16 => "uint16",
    17..=32 => "uint32",
    _ => "uint64",
  }
}

/// Hands out enum declarations for bit-fields. With pruning enabled, an enumeration whose members
/// match one already declared for the same peripheral reuses that declaration.
#[derive(Debug)]
pub struct EnumNamer {
  prune: bool,
  seen: HashMap<(String, String), String>,
  names: HashSet<String>,
}
impl EnumNamer {
  pub fn new(config: &SvdConfig) -> Self {
    Self {
      prune: config.prune_enums,
      seen: HashMap::new(),
      names: HashSet::new(),
    }
  }

  /// Declares (or reuses) the enum for one bit-field's values and returns its name.
  pub fn declare(
    &mut self,
    peripheral: &str,
    proposed: &str,
    values: &EnumeratedValuesSpec,
    width: u32,
    out: &mut BTreeMap<String, EnumDecl>,
  ) -> StructgenResult<String> {
    let members = members(&values.values)?;
    let key = content_key(&members);

    if self.prune {
      if let Some(name) = self.seen.get(&(peripheral.to_owned(), key.clone())) {
        debug!("{}: reusing enum {} for {}", peripheral, name, proposed);
        return Ok(name.clone());
      }
    }

    let name = unique_name(&sanitize(proposed), &self.names);
    self.names.insert(name.clone());
    self.seen.insert((peripheral.to_owned(), key), name.clone());

    out.insert(
      name.clone(),
      EnumDecl {
        namespace: None,
        description: values.name.clone(),
        underlying: underlying_for_width(width).to_owned(),
        members,
        flags: Default::default(),
      },
    );

    Ok(name)
  }
}

/// Order-independent identity of an enum body.
fn content_key(members: &[(String, EnumMemberDecl)]) -> String {
  let mut pairs: Vec<String> = members
    .iter()
    .map(|(name, m)| match m.value {
      Some(v) => format!("{}={}", name, v),
      None => format!("{}=", name),
    })
    .collect();
  pairs.sort();
  pairs.join(",")
}

#[cfg(test)]
mod tests {
  use super::{member_name, members, remove_common_prefix, truncate, unique_name, EnumNamer};
  use crate::config::SvdConfig;
  use crate::svd::{EnumeratedValueSpec, EnumeratedValuesSpec};
  use std::collections::{BTreeMap, HashSet};

  fn value(name: &str, description: Option<&str>, v: Option<u64>) -> EnumeratedValueSpec {
    EnumeratedValueSpec {
      name: name.to_owned(),
      description: description.map(str::to_owned),
      value: v,
      is_default: false,
    }
  }

  fn values(list: Vec<EnumeratedValueSpec>) -> EnumeratedValuesSpec {
    EnumeratedValuesSpec {
      name: None,
      usage: None,
      derived_from: None,
      values: list,
    }
  }

  #[test]
  fn builds_names_from_descriptions() {
    assert_eq!(
      "disable_clock_divider",
      member_name("value1", Some("Disable the clock-divider"))
    );
    assert_eq!("timer_off", member_name("VALUE2", Some("Timer - off")));
    assert_eq!("the", member_name("value3", Some("The")));
    assert_eq!("KEEP", member_name("KEEP", Some("Kept as written")));
    assert_eq!("value4", member_name("value4", None));
  }

  #[test]
  fn strips_common_prefixes() {
    let mut names = vec!["MODE_IN".to_owned(), "MODE_OUT".to_owned()];
    remove_common_prefix(&mut names);
    assert_eq!(vec!["IN", "OUT"], names);

    let mut short = vec!["OFF".to_owned(), "ON".to_owned()];
    remove_common_prefix(&mut short);
    assert_eq!(vec!["OFF", "ON"], short);

    let mut exact = vec!["CH".to_owned(), "CH1".to_owned()];
    remove_common_prefix(&mut exact);
    assert_eq!(vec!["CH", "1"], exact);
  }

  #[test]
  fn truncates_long_names() {
    let long = "a".repeat(51);
    let cut = truncate(&long);
    assert_eq!(50, cut.len());
    assert!(cut.ends_with("_cont"));
    assert_eq!("a".repeat(50), truncate(&"a".repeat(50)));
  }

  #[test]
  fn makes_names_unique() {
    let mut taken = HashSet::new();
    taken.insert("A".to_owned());
    taken.insert("A_x".to_owned());
    assert_eq!("A_x_x", unique_name("A", &taken));
    assert_eq!("_1", unique_name("1", &taken));
  }

  #[test]
  fn default_member_goes_last() {
    let mut other = value("OTHER", None, None);
    other.is_default = true;
    let list = members(&[other, value("LOW", None, Some(0)), value("HIGH", None, Some(3))]).unwrap();

    let names: Vec<&str> = list.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(vec!["LOW", "HIGH", "OTHER"], names);
    assert_eq!(None, list[2].1.value);
  }

  #[test]
  fn reuses_identical_enums_within_a_peripheral() {
    let config = SvdConfig {
      prune_enums: true,
      ..Default::default()
    };
    let mut namer = EnumNamer::new(&config);
    let mut out = BTreeMap::new();
    let onoff = values(vec![value("OFF", None, Some(0)), value("ON", None, Some(1))]);

    let a = namer.declare("GPIO", "GPIO_CR_EN", &onoff, 2, &mut out).unwrap();
    let b = namer.declare("GPIO", "GPIO_CR_EN2", &onoff, 2, &mut out).unwrap();
    let c = namer.declare("UART", "UART_CR_EN", &onoff, 2, &mut out).unwrap();

    assert_eq!("GPIO_CR_EN", a);
    assert_eq!(a, b);
    assert_eq!("UART_CR_EN", c);
    assert_eq!(2, out.len());
    assert_eq!("uint8", out["GPIO_CR_EN"].underlying);
  }

  #[test]
  fn keeps_separate_enums_without_pruning() {
    let mut namer = EnumNamer::new(&SvdConfig::default());
    let mut out = BTreeMap::new();
    let onoff = values(vec![value("OFF", None, Some(0)), value("ON", None, Some(1))]);

    let a = namer.declare("GPIO", "EN", &onoff, 9, &mut out).unwrap();
    let b = namer.declare("GPIO", "EN", &onoff, 9, &mut out).unwrap();

    assert_eq!("EN", a);
    assert_eq!("EN_x", b);
    assert_eq!("uint16", out["EN_x"].underlying);
  }
}
