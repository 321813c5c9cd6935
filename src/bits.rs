//! Bit-field accessor arithmetic and the per-storage accessor plans the emitter renders.

use crate::error::StructgenResult;
use crate::primitive::PrimitiveType;
use crate::registry::{BitField, Field, TypeKind, TypeRegistry};

/// Shift-and-mask arithmetic for one bit-field, evaluated over a 64-bit widening of its storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitAccessor {
  pub index: u32,
  pub width: u32,
}
impl BitAccessor {
  pub fn new(index: u32, width: u32) -> Self {
    Self { index, width }
  }

  /// `(1 << width) - 1`, saturating at a full 64-bit mask.
  pub fn mask(&self) -> u64 {
    if self.width >= 64 {
      u64::MAX
    } else {
      (1u64 << self.width) - 1
    }
  }

  pub fn shifted_mask(&self) -> u64 {
    self.mask() << self.index
  }

  pub fn get(&self, storage: u64) -> u64 {
    (storage >> self.index) & self.mask()
  }

  /// Clears the field, then ORs in `value` truncated to the field width.
  pub fn set(&self, storage: u64, value: u64) -> u64 {
    (storage & !self.shifted_mask()) | ((value & self.mask()) << self.index)
  }

  pub fn set_bit(&self, storage: u64) -> u64 {
    storage | (1u64 << self.index)
  }

  pub fn clear(&self, storage: u64) -> u64 {
    storage & !(1u64 << self.index)
  }

  pub fn toggle(&self, storage: u64) -> u64 {
    storage ^ (1u64 << self.index)
  }

  pub fn is_single_bit(&self) -> bool {
    self.width == 1
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitFieldPlan {
  pub name: String,
  pub accessor: BitAccessor,
  pub read: bool,
  pub write: bool,
  pub enum_type: Option<String>,
  pub description: Option<String>,
}
impl BitFieldPlan {
  fn new(bit_field: &BitField) -> Self {
    Self {
      name: bit_field.name.clone(),
      accessor: BitAccessor::new(bit_field.index, bit_field.width),
      read: bit_field.read,
      write: bit_field.write,
      enum_type: bit_field.enum_type.clone(),
      description: bit_field.description.clone(),
    }
  }
}

/// Everything needed to render the accessors for one view of one storage field. A field with
/// alternates yields one plan per view, all aliasing the same storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessorPlan {
  /// Name accessor methods are prefixed with: the field itself or one of its alternates.
  pub view: String,

  /// The struct field actually holding the bits.
  pub storage_field: String,

  /// Integer the bits live in.
  pub storage: PrimitiveType,

  /// Set when the storage field is enum-typed and must be unwrapped to its integer.
  pub storage_enum: Option<String>,

  /// Accessors take an element index when the storage is an array.
  pub array_length: Option<usize>,

  pub volatile: bool,
  pub bit_fields: Vec<BitFieldPlan>,
}
impl AccessorPlan {
  /// Plans the accessors for a field. Fields without bit-fields on any view produce no plans.
  pub fn for_field(
    registry: &TypeRegistry,
    struct_name: &str,
    field: &Field,
  ) -> StructgenResult<Vec<AccessorPlan>> {
    let has_bits =
      !field.bit_fields().is_empty() || field.alternates().iter().any(|a| !a.bit_fields.is_empty());
    if !has_bits {
      return Ok(Vec::new());
    }

    let context = format!("{}.{}", struct_name, field.name);
    let storage = registry.storage_primitive(&field.type_name, &context)?;
    let storage_enum = match registry.resolve(&field.type_name)? {
      TypeKind::Enum(e) => Some(e.name.clone()),
      _ => None,
    };

    let views = std::iter::once((field.name.as_str(), field.bit_fields())).chain(
      field
        .alternates()
        .iter()
        .map(|a| (a.name.as_str(), a.bit_fields.as_slice())),
    );

    Ok(
      views
        .filter(|(_, bit_fields)| !bit_fields.is_empty())
        .map(|(view, bit_fields)| AccessorPlan {
          view: view.to_owned(),
          storage_field: field.name.clone(),
          storage,
          storage_enum: storage_enum.clone(),
          array_length: field.array_length,
          volatile: field.is_volatile(),
          bit_fields: bit_fields.iter().map(BitFieldPlan::new).collect(),
        })
        .collect(),
    )
  }

  pub fn readable(&self) -> impl Iterator<Item = &BitFieldPlan> {
    self.bit_fields.iter().filter(|b| b.read)
  }

  pub fn writable(&self) -> impl Iterator<Item = &BitFieldPlan> {
    self.bit_fields.iter().filter(|b| b.write)
  }

  /// A combined getter is only worth emitting when it replaces more than one read.
  pub fn has_get_all(&self) -> bool {
    self.readable().count() > 1
  }

  pub fn has_set_all(&self) -> bool {
    self.writable().count() > 1
  }
}
