use log::debug;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::{EnumFlags, StructFlags};
use crate::emit;
use crate::error::{StructgenError, StructgenResult};
use crate::ir::{AlternateDecl, BitFieldDecl, Config, FieldDecl, InstanceDecl};
use crate::layout::PaddingManager;
use crate::primitive::PrimitiveType;

/// A sub-range of bits within a field's storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitField {
  pub name: String,

  /// Position of the least-significant bit.
  pub index: u32,

  pub width: u32,
  pub read: bool,
  pub write: bool,

  /// Enum the packed value is read and written as, if any.
  pub enum_type: Option<String>,

  pub description: Option<String>,
}
impl BitField {
  pub fn new(decl: &BitFieldDecl) -> Self {
    Self {
      name: decl.name.clone(),
      index: decl.index,
      width: decl.width,
      read: decl.read,
      write: decl.write,
      enum_type: decl.type_name.clone(),
      description: decl.description.clone(),
    }
  }
}

/// Another named view over a field's storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternate {
  pub name: String,
  pub description: Option<String>,
  pub bit_fields: Vec<BitField>,
}
impl Alternate {
  pub fn new(decl: &AlternateDecl) -> Self {
    Self {
      name: decl.name.clone(),
      description: decl.description.clone(),
      bit_fields: decl.fields.iter().map(BitField::new).collect(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRole {
  /// Synthetic, inserted to satisfy a declared offset.
  Padding,
  Member {
    is_const: bool,
    is_volatile: bool,
    bit_fields: Vec<BitField>,
    alternates: Vec<Alternate>,
  },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
  pub name: String,
  pub type_name: String,
  pub array_length: Option<usize>,
  pub description: Option<String>,
  pub role: FieldRole,
}
impl Field {
  pub fn new(decl: &FieldDecl) -> Self {
    let role = if decl.padding {
      FieldRole::Padding
    } else {
      FieldRole::Member {
        is_const: decl.is_const,
        is_volatile: decl.volatile,
        bit_fields: decl.fields.iter().map(BitField::new).collect(),
        alternates: decl.alternates.iter().map(Alternate::new).collect(),
      }
    };

    Self {
      name: decl.name.clone(),
      type_name: decl.type_name.clone(),
      array_length: decl.array_length,
      description: decl.description.clone(),
      role,
    }
  }

  /// Number of elements; scalars count as one.
  pub fn count(&self) -> usize {
    self.array_length.unwrap_or(1)
  }

  pub fn is_padding(&self) -> bool {
    self.role == FieldRole::Padding
  }

  pub fn is_const(&self) -> bool {
    match self.role {
      FieldRole::Padding => true,
      FieldRole::Member { is_const, .. } => is_const,
    }
  }

  pub fn is_volatile(&self) -> bool {
    match self.role {
      FieldRole::Padding => false,
      FieldRole::Member { is_volatile, .. } => is_volatile,
    }
  }

  pub fn bit_fields(&self) -> &[BitField] {
    match self.role {
      FieldRole::Padding => &[],
      FieldRole::Member { ref bit_fields, .. } => bit_fields,
    }
  }

  pub fn alternates(&self) -> &[Alternate] {
    match self.role {
      FieldRole::Padding => &[],
      FieldRole::Member { ref alternates, .. } => alternates,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
  pub name: String,
  pub address: u64,
  pub description: Option<String>,
  pub volatile: bool,
}
impl Instance {
  pub fn new(decl: &InstanceDecl) -> Self {
    Self {
      name: decl.name.clone(),
      address: decl.address,
      description: decl.description.clone(),
      volatile: decl.volatile,
    }
  }
}

/// A fixed-size record. Field order is wire order.
#[derive(Debug, Clone)]
pub struct StructType {
  pub name: String,
  pub namespace: Vec<String>,
  pub description: Option<String>,
  pub fields: Vec<Field>,

  /// Running size in bytes; final once every field has been added.
  pub size: usize,

  pub identifier: Option<u64>,
  pub flags: StructFlags,
  pub instances: Vec<Instance>,
  padding: PaddingManager,
}
impl StructType {
  pub fn field(&self, name: &str) -> Option<&Field> {
    self.fields.iter().find(|f| f.name == name)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
  pub name: String,
  pub value: i64,
  pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EnumType {
  pub name: String,
  pub namespace: Vec<String>,
  pub description: Option<String>,
  pub underlying: PrimitiveType,

  /// Members in declaration order.
  pub members: Vec<EnumMember>,

  pub identifier: Option<u64>,
  pub flags: EnumFlags,
  next_value: i64,
}
impl EnumType {
  /// Appends a member. Members without an explicit value take the counter; the counter never
  /// moves backwards.
  pub fn add_member(
    &mut self,
    name: &str,
    value: Option<i64>,
    description: Option<String>,
  ) -> StructgenResult<i64> {
    if self.members.iter().any(|m| m.name == name) {
      return Err(StructgenError::invalid(
        name,
        &format!("enum {} (member declared twice)", self.name),
      ));
    }

    let value = value.unwrap_or(self.next_value);
    if !self.fits(value) {
      return Err(StructgenError::invalid(
        &value.to_string(),
        &format!("enum {}.{} (out of range for {})", self.name, name, self.underlying.name),
      ));
    }

    self.next_value = value.max(self.next_value) + 1;
    self.members.push(EnumMember {
      name: name.to_owned(),
      value,
      description,
    });

    Ok(value)
  }

  pub fn value(&self, member: &str) -> Option<i64> {
    self.members.iter().find(|m| m.name == member).map(|m| m.value)
  }

  fn fits(&self, value: i64) -> bool {
    let bits = self.underlying.bits();
    match (self.underlying.signed, bits) {
      (_, 64) => true,
      (true, b) => {
        let half = 1i64 << (b - 1);
        value >= -half && value < half
      }
      (false, b) => value >= 0 && value < (1i64 << b),
    }
  }
}

/// What a type name resolves to.
#[derive(Debug, Clone, Copy)]
pub enum TypeKind<'a> {
  Primitive(PrimitiveType),
  Enum(&'a EnumType),
  Struct(&'a StructType),
}

/// Owns every struct and enum declared for one generation run.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
  structs: BTreeMap<String, StructType>,
  enums: BTreeMap<String, EnumType>,
  id_underlying: PrimitiveType,
  next_struct_id: u64,
  next_enum_id: u64,
}
impl Default for TypeRegistry {
  fn default() -> Self {
    Self::with_id_underlying(crate::primitive::PRIMITIVES[2])
  }
}
impl TypeRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_id_underlying(id_underlying: PrimitiveType) -> Self {
    Self {
      structs: BTreeMap::new(),
      enums: BTreeMap::new(),
      id_underlying,
      next_struct_id: 1,
      next_enum_id: 1,
    }
  }

  /// Builds a registry from a loaded configuration. Enums are registered first, then every
  /// struct entry is created, then structs are populated so that nested structs are complete
  /// before anything containing them.
  pub fn from_config(config: &Config) -> StructgenResult<Self> {
    let id_underlying = match config.id_underlying {
      Some(ref name) => PrimitiveType::from_name(name)
        .filter(PrimitiveType::is_integer)
        .ok_or_else(|| StructgenError::unknown_type(name, "id_underlying"))?,
      None => crate::primitive::PRIMITIVES[2],
    };

    let mut registry = Self::with_id_underlying(id_underlying);

    for (name, decl) in config.enums.iter() {
      let namespace = decl
        .namespace
        .clone()
        .unwrap_or_else(|| config.namespace.clone());
      let flags = EnumFlags::resolve(config, decl);

      let entry = registry.register_enum(name, namespace, &decl.underlying, flags)?;
      entry.description = decl.description.clone();
      for (member, member_decl) in decl.members.iter() {
        entry.add_member(member, member_decl.value, member_decl.description.clone())?;
      }
    }

    for (name, decl) in config.structs.iter() {
      let namespace = decl
        .namespace
        .clone()
        .unwrap_or_else(|| config.namespace.clone());
      let flags = StructFlags::resolve(config, decl);

      let entry = registry.register_struct(name, namespace, flags)?;
      entry.description = decl.description.clone();
      entry.instances = decl.instances.iter().map(Instance::new).collect();
    }

    let mut done = HashSet::new();
    for name in config.structs.keys() {
      registry.populate(name, config, &mut Vec::new(), &mut done)?;
    }

    debug!(
      "registry holds {} structs and {} enums",
      registry.structs.len(),
      registry.enums.len()
    );

    Ok(registry)
  }

  /// Creates an empty struct entry.
  pub fn register_struct(
    &mut self,
    name: &str,
    namespace: Vec<String>,
    flags: StructFlags,
  ) -> StructgenResult<&mut StructType> {
    self.check_name_free(name)?;

    let identifier = if flags.identifier {
      self.next_struct_id += 1;
      Some(self.next_struct_id - 1)
    } else {
      None
    };

    Ok(
      self
        .structs
        .entry(name.to_owned())
        .or_insert_with(|| StructType {
          name: name.to_owned(),
          namespace,
          description: None,
          fields: Vec::new(),
          size: 0,
          identifier,
          flags,
          instances: Vec::new(),
          padding: PaddingManager::new(),
        }),
    )
  }

  /// Creates an empty enum entry over an integer primitive.
  pub fn register_enum(
    &mut self,
    name: &str,
    namespace: Vec<String>,
    underlying: &str,
    flags: EnumFlags,
  ) -> StructgenResult<&mut EnumType> {
    self.check_name_free(name)?;

    let underlying = PrimitiveType::from_name(underlying)
      .filter(PrimitiveType::is_integer)
      .ok_or_else(|| StructgenError::unknown_type(underlying, &format!("enum {}", name)))?;

    let identifier = if flags.identifier {
      self.next_enum_id += 1;
      Some(self.next_enum_id - 1)
    } else {
      None
    };

    Ok(
      self
        .enums
        .entry(name.to_owned())
        .or_insert_with(|| EnumType {
          name: name.to_owned(),
          namespace,
          description: None,
          underlying,
          members: Vec::new(),
          identifier,
          flags,
          next_value: 0,
        }),
    )
  }

  /// Appends a field to a struct, inserting whatever padding its expected offset requires first.
  pub fn add_field(&mut self, struct_name: &str, decl: &FieldDecl) -> StructgenResult<()> {
    if !self.structs.contains_key(struct_name) {
      return Err(StructgenError::unknown_type(struct_name, "field registration"));
    }

    let context = format!("{}.{}", struct_name, decl.name);
    let mut resolving = vec![struct_name.to_owned()];
    let element_size = self.size_inner(&decl.type_name, &context, &mut resolving)?;

    let field = Field::new(decl);
    let field_size = element_size * field.count();

    if let Some(expected) = decl.expected_size {
      if expected != field_size {
        return Err(StructgenError::SizeMismatch {
          name: context,
          expected,
          actual: field_size,
        });
      }
    }

    self.validate_bit_fields(&context, &field)?;

    let entry = self
      .structs
      .get_mut(struct_name)
      .ok_or_else(|| StructgenError::unknown_type(struct_name, "field registration"))?;

    for padding in entry
      .padding
      .fill(struct_name, &decl.name, entry.size, decl.expected_offset)?
    {
      entry.size += primitive_size(&padding.type_name, &context)? * padding.count();
      entry.fields.push(padding);
    }

    entry.size += field_size;
    entry.fields.push(field);

    Ok(())
  }

  /// Size of a type in bytes, resolved recursively through nested structs and arrays.
  pub fn size(&self, name: &str) -> StructgenResult<usize> {
    self.size_inner(name, "size lookup", &mut Vec::new())
  }

  pub fn resolve(&self, name: &str) -> StructgenResult<TypeKind> {
    if let Some(primitive) = PrimitiveType::from_name(name) {
      return Ok(TypeKind::Primitive(primitive));
    }

    if let Some(e) = self.enums.get(name) {
      return Ok(TypeKind::Enum(e));
    }

    match self.structs.get(name) {
      Some(s) => Ok(TypeKind::Struct(s)),
      None => Err(StructgenError::unknown_type(name, "type lookup")),
    }
  }

  pub fn get_struct(&self, name: &str) -> Option<&StructType> {
    self.structs.get(name)
  }

  pub fn get_enum(&self, name: &str) -> Option<&EnumType> {
    self.enums.get(name)
  }

  pub fn structs(&self) -> impl Iterator<Item = &StructType> {
    self.structs.values()
  }

  pub fn enums(&self) -> impl Iterator<Item = &EnumType> {
    self.enums.values()
  }

  pub fn id_underlying(&self) -> PrimitiveType {
    self.id_underlying
  }

  /// The integer a bit-field storage type is packed into: the primitive itself or an enum's
  /// underlying type.
  pub fn storage_primitive(&self, type_name: &str, context: &str) -> StructgenResult<PrimitiveType> {
    match self.resolve(type_name)? {
      TypeKind::Primitive(p) if p.is_integer() => Ok(p),
      TypeKind::Enum(e) => Ok(e.underlying),
      _ => Err(StructgenError::InvalidBitFieldStorage {
        name: context.to_owned(),
        storage: type_name.to_owned(),
      }),
    }
  }

  fn populate(
    &mut self,
    name: &str,
    config: &Config,
    resolving: &mut Vec<String>,
    done: &mut HashSet<String>,
  ) -> StructgenResult<()> {
    if done.contains(name) {
      return Ok(());
    }

    if resolving.iter().any(|r| r == name) {
      return Err(StructgenError::CyclicType {
        name: name.to_owned(),
        path: format!("{} -> {}", resolving.join(" -> "), name),
      });
    }

    let decl = config
      .structs
      .get(name)
      .ok_or_else(|| StructgenError::unknown_type(name, "struct population"))?;

    resolving.push(name.to_owned());

    for field in decl.fields.iter() {
      if config.structs.contains_key(&field.type_name) {
        self.populate(&field.type_name, config, resolving, done)?;
      }
    }

    for field in decl.fields.iter() {
      self.add_field(name, field)?;
    }

    if let Some(expected) = decl.expected_size {
      let actual = self.size(name)?;
      if actual != expected {
        return Err(StructgenError::SizeMismatch {
          name: name.to_owned(),
          expected,
          actual,
        });
      }
    }

    resolving.pop();
    done.insert(name.to_owned());

    debug!("struct {} laid out", name);

    Ok(())
  }

  fn size_inner(
    &self,
    name: &str,
    context: &str,
    resolving: &mut Vec<String>,
  ) -> StructgenResult<usize> {
    if let Some(primitive) = PrimitiveType::from_name(name) {
      return Ok(primitive.size);
    }

    if let Some(e) = self.enums.get(name) {
      return Ok(e.underlying.size);
    }

    let s = self
      .structs
      .get(name)
      .ok_or_else(|| StructgenError::unknown_type(name, context))?;

    if resolving.iter().any(|r| r == name) {
      return Err(StructgenError::CyclicType {
        name: name.to_owned(),
        path: format!("{} -> {}", resolving.join(" -> "), name),
      });
    }

    resolving.push(name.to_owned());

    let mut total = 0;
    for field in s.fields.iter() {
      let field_context = format!("{}.{}", name, field.name);
      total += self.size_inner(&field.type_name, &field_context, resolving)? * field.count();
    }

    resolving.pop();

    Ok(total)
  }

  fn validate_bit_fields(&self, context: &str, field: &Field) -> StructgenResult<()> {
    let views: Vec<&[BitField]> = std::iter::once(field.bit_fields())
      .chain(field.alternates().iter().map(|a| a.bit_fields.as_slice()))
      .collect();

    if views.iter().all(|v| v.is_empty()) {
      return Ok(());
    }

    let storage = self.storage_primitive(&field.type_name, context)?;

    for view in views.iter() {
      check_accessor_names(context, view)?;
    }

    for bit_field in views.into_iter().flatten() {
      let name = format!("{}.{}", context, bit_field.name);

      if !bit_field.read && !bit_field.write {
        return Err(StructgenError::BitFieldUnusable(name));
      }

      if bit_field.width == 0 {
        return Err(StructgenError::invalid("0", &format!("width of bit-field {}", name)));
      }

      let overflows = bit_field
        .index
        .checked_add(bit_field.width)
        .map_or(true, |end| end > storage.bits());
      if overflows {
        return Err(StructgenError::BitFieldOverflow {
          name,
          index: bit_field.index,
          width: bit_field.width,
          storage_bits: storage.bits(),
        });
      }

      if let Some(ref enum_type) = bit_field.enum_type {
        if self.enums.get(enum_type).is_none() {
          return Err(StructgenError::unknown_type(enum_type, &name));
        }
      }
    }

    Ok(())
  }

  fn check_name_free(&self, name: &str) -> StructgenResult<()> {
    if PrimitiveType::from_name(name).is_some()
      || self.structs.contains_key(name)
      || self.enums.contains_key(name)
    {
      return Err(StructgenError::DuplicateType(name.to_owned()));
    }

    Ok(())
  }
}

/// Bit-fields of one view become parameters of a single `set_all` method, so their lowercased
/// identifiers must be distinct. A leading `__` is kept free for the accessors' own locals.
fn check_accessor_names(context: &str, view: &[BitField]) -> StructgenResult<()> {
  let mut seen: HashMap<String, &str> = HashMap::with_capacity(view.len());

  for bit_field in view {
    let param = emit::ident(&bit_field.name.to_lowercase());

    if param.starts_with("__") {
      return Err(StructgenError::invalid(
        &bit_field.name,
        &format!("bit-field name in {} (a leading `__` is reserved)", context),
      ));
    }

    if let Some(first) = seen.insert(param, &bit_field.name) {
      return Err(StructgenError::BitFieldNameCollision {
        first: format!("{}.{}", context, first),
        second: format!("{}.{}", context, bit_field.name),
      });
    }
  }

  Ok(())
}

fn primitive_size(name: &str, context: &str) -> StructgenResult<usize> {
  PrimitiveType::from_name(name)
    .map(|p| p.size)
    .ok_or_else(|| StructgenError::unknown_type(name, context))
}

#[cfg(test)]
mod tests {
  use super::{TypeKind, TypeRegistry};
  use crate::config::{EnumFlags, StructFlags};
  use crate::error::StructgenError;
  use crate::ir::{BitFieldDecl, Config, FieldDecl};

  fn field(name: &str, type_name: &str) -> FieldDecl {
    FieldDecl {
      name: name.to_owned(),
      type_name: type_name.to_owned(),
      ..Default::default()
    }
  }

  fn bit_field(name: &str, index: u32, width: u32) -> BitFieldDecl {
    BitFieldDecl {
      name: name.to_owned(),
      index,
      width,
      read: true,
      write: true,
      type_name: None,
      description: None,
    }
  }

  fn config(json: &str) -> Config {
    serde_json::from_str(json).unwrap()
  }

  #[test]
  fn auto_values_never_move_backwards() {
    let mut registry = TypeRegistry::new();
    let e = registry
      .register_enum("Letters", vec![], "uint8", EnumFlags::default())
      .unwrap();

    assert_eq!(0, e.add_member("x", None, None).unwrap());
    assert_eq!(5, e.add_member("y", Some(5), None).unwrap());
    assert_eq!(6, e.add_member("z", None, None).unwrap());
    assert_eq!(2, e.add_member("w", Some(2), None).unwrap());
    assert_eq!(7, e.add_member("v", None, None).unwrap());
  }

  #[test]
  fn rejects_enum_values_outside_underlying() {
    let mut registry = TypeRegistry::new();
    let e = registry
      .register_enum("Small", vec![], "int8", EnumFlags::default())
      .unwrap();

    assert!(e.add_member("low", Some(-128), None).is_ok());
    assert!(e.add_member("high", Some(128), None).is_err());
  }

  #[test]
  fn pads_up_to_expected_offsets() {
    let mut registry = TypeRegistry::new();
    registry
      .register_struct("Frame", vec![], StructFlags::default())
      .unwrap();

    registry.add_field("Frame", &field("tag", "uint8")).unwrap();

    let mut value = field("value", "uint32");
    value.expected_offset = Some(4);
    registry.add_field("Frame", &value).unwrap();

    let mut tail = field("tail", "uint16");
    tail.expected_offset = Some(17);
    registry.add_field("Frame", &tail).unwrap();

    let frame = registry.get_struct("Frame").unwrap();
    let names: Vec<&str> = frame.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
      vec![
        "tag",
        "reserved_padding0",
        "value",
        "reserved_padding1",
        "reserved_padding2",
        "tail"
      ],
      names
    );

    let mut offset = 0;
    for f in frame.fields.iter() {
      if f.name == "value" {
        assert_eq!(4, offset);
      }
      if f.name == "tail" {
        assert_eq!(17, offset);
      }
      offset += registry.size(&f.type_name).unwrap() * f.count();
    }

    assert_eq!(19, frame.size);
    assert_eq!(19, registry.size("Frame").unwrap());
  }

  #[test]
  fn size_is_sum_of_fields() {
    let registry = TypeRegistry::from_config(&config(
      r##"{
        "enums": { "Kind": { "underlying": "uint16", "enum": { "a": null, "b": null } } },
        "structs": {
          "Outer": {
            "fields": [
              { "name": "kind", "type": "Kind" },
              { "name": "inner", "type": "Inner", "array_length": 3 },
              { "name": "ratio", "type": "double", "expected_offset": 20 }
            ]
          },
          "Inner": {
            "fields": [
              { "name": "a", "type": "uint8" },
              { "name": "b", "type": "int32_t" }
            ],
            "expected_size": 5
          }
        }
      }"##,
    ))
    .unwrap();

    assert_eq!(5, registry.size("Inner").unwrap());

    let outer = registry.get_struct("Outer").unwrap();
    let sum: usize = outer
      .fields
      .iter()
      .map(|f| registry.size(&f.type_name).unwrap() * f.count())
      .sum();

    assert_eq!(28, sum);
    assert_eq!(sum, registry.size("Outer").unwrap());
    assert_eq!(sum, outer.size);
    assert!(matches!(registry.resolve("Kind").unwrap(), TypeKind::Enum(_)));
  }

  #[test]
  fn reports_unknown_types() {
    let result = TypeRegistry::from_config(&config(
      r##"{ "structs": { "S": { "fields": [ { "name": "x", "type": "Missing" } ] } } }"##,
    ));

    match result {
      Err(StructgenError::UnknownType { name, context }) => {
        assert_eq!("Missing", name);
        assert_eq!("S.x", context);
      }
      other => panic!("expected unknown type, got {:?}", other),
    }
  }

  #[test]
  fn reports_cycles() {
    let result = TypeRegistry::from_config(&config(
      r##"{
        "structs": {
          "A": { "fields": [ { "name": "b", "type": "B" } ] },
          "B": { "fields": [ { "name": "a", "type": "A", "array_length": 2 } ] }
        }
      }"##,
    ));
    assert!(matches!(result, Err(StructgenError::CyclicType { .. })));

    let mut registry = TypeRegistry::new();
    registry
      .register_struct("Selfish", vec![], StructFlags::default())
      .unwrap();
    assert!(matches!(
      registry.add_field("Selfish", &field("me", "Selfish")),
      Err(StructgenError::CyclicType { .. })
    ));
  }

  #[test]
  fn checks_field_and_struct_sizes() {
    let mut registry = TypeRegistry::new();
    registry
      .register_struct("S", vec![], StructFlags::default())
      .unwrap();

    let mut wrong = field("x", "uint32");
    wrong.array_length = Some(2);
    wrong.expected_size = Some(4);
    assert!(matches!(
      registry.add_field("S", &wrong),
      Err(StructgenError::SizeMismatch {
        expected: 4,
        actual: 8,
        ..
      })
    ));

    let result = TypeRegistry::from_config(&config(
      r##"{ "structs": { "T": { "fields": [ { "name": "x", "type": "uint8" } ], "expected_size": 2 } } }"##,
    ));
    assert!(matches!(result, Err(StructgenError::SizeMismatch { .. })));
  }

  #[test]
  fn validates_bit_fields() {
    let mut registry = TypeRegistry::new();
    registry
      .register_struct("Regs", vec![], StructFlags::default())
      .unwrap();

    let mut overflow = field("ctrl", "uint8");
    overflow.fields = vec![bit_field("a", 0, 3), bit_field("b", 6, 3)];
    assert!(matches!(
      registry.add_field("Regs", &overflow),
      Err(StructgenError::BitFieldOverflow {
        index: 6,
        width: 3,
        storage_bits: 8,
        ..
      })
    ));

    let mut unusable = field("status", "uint16");
    let mut dead = bit_field("dead", 0, 1);
    dead.read = false;
    dead.write = false;
    unusable.fields = vec![dead];
    assert!(matches!(
      registry.add_field("Regs", &unusable),
      Err(StructgenError::BitFieldUnusable(_))
    ));

    let mut floating = field("gain", "float");
    floating.fields = vec![bit_field("sign", 31, 1)];
    assert!(matches!(
      registry.add_field("Regs", &floating),
      Err(StructgenError::InvalidBitFieldStorage { .. })
    ));

    assert!(registry.get_struct("Regs").unwrap().fields.is_empty());
  }

  #[test]
  fn bit_field_end_past_u32_overflows() {
    let result = TypeRegistry::from_config(&config(
      r##"{
        "structs": {
          "S": {
            "fields": [
              { "name": "a", "type": "uint8", "fields": [ { "name": "b", "index": 4294967295, "width": 1 } ] }
            ]
          }
        }
      }"##,
    ));

    assert!(matches!(
      result,
      Err(StructgenError::BitFieldOverflow {
        index: u32::MAX,
        width: 1,
        storage_bits: 8,
        ..
      })
    ));
  }

  #[test]
  fn bit_field_names_must_differ_as_parameters() {
    let mut registry = TypeRegistry::new();
    registry
      .register_struct("Cfg", vec![], StructFlags::default())
      .unwrap();

    let mut cased = field("reg", "uint8");
    cased.fields = vec![bit_field("Mode", 0, 2), bit_field("MODE", 2, 2)];
    assert!(matches!(
      registry.add_field("Cfg", &cased),
      Err(StructgenError::BitFieldNameCollision { first, second })
        if first == "Cfg.reg.Mode" && second == "Cfg.reg.MODE"
    ));

    let mut reserved = field("reg", "uint8");
    reserved.fields = vec![bit_field("__raw", 0, 2)];
    assert!(matches!(
      registry.add_field("Cfg", &reserved),
      Err(StructgenError::InvalidValue { .. })
    ));

    let mut plain = field("reg", "uint8");
    plain.fields = vec![bit_field("raw", 0, 4), bit_field("storage", 4, 4)];
    assert!(registry.add_field("Cfg", &plain).is_ok());
  }

  #[test]
  fn assigns_identifiers_in_registration_order() {
    let mut registry = TypeRegistry::new();
    let flags = StructFlags {
      identifier: true,
      ..Default::default()
    };

    assert_eq!(
      Some(1),
      registry.register_struct("A", vec![], flags).unwrap().identifier
    );
    assert_eq!(
      None,
      registry
        .register_struct("B", vec![], StructFlags::default())
        .unwrap()
        .identifier
    );
    assert_eq!(
      Some(2),
      registry.register_struct("C", vec![], flags).unwrap().identifier
    );
    assert!(matches!(
      registry.register_struct("uint8_t", vec![], flags),
      Err(StructgenError::DuplicateType(_))
    ));
  }
}
