use log::debug;

use crate::bits::AccessorPlan;
use crate::error::{StructgenError, StructgenResult};
use crate::primitive::PrimitiveType;
use crate::registry::{StructType, TypeKind, TypeRegistry};

/// How one field's bytes move when the byte order is reversed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapKind {
  /// Carried through verbatim.
  Padding,

  /// One byte wide; byte order does not apply. Enums narrow/widen through their raw byte.
  Byte { enum_type: Option<String> },

  /// Multi-byte enum, swapped through its underlying integer.
  Enum {
    name: String,
    underlying: PrimitiveType,
  },

  Integer(PrimitiveType),

  /// Bit-cast to the same-width unsigned integer, swapped, and cast back.
  Float(PrimitiveType),

  /// Delegates to the nested struct's own swapped codec at the current offset.
  Struct { name: String, plan: Box<CodecPlan> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapStep {
  pub field: String,
  pub type_name: String,
  pub kind: SwapKind,

  /// Array length, or one.
  pub count: usize,

  pub element_size: usize,

  /// Byte offset of the first element within the struct.
  pub offset: usize,
}
impl SwapStep {
  pub fn size(&self) -> usize {
    self.element_size * self.count
  }
}

/// The per-field swap strategy for one struct, in wire order. The emitter renders this plan as
/// `encode_swapped`/`decode_swapped`; `swap` evaluates it directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecPlan {
  pub struct_name: String,
  pub steps: Vec<SwapStep>,
  pub size: usize,
}
impl CodecPlan {
  pub fn new(registry: &TypeRegistry, struct_name: &str) -> StructgenResult<Self> {
    let s = registry
      .get_struct(struct_name)
      .ok_or_else(|| StructgenError::unknown_type(struct_name, "codec generation"))?;

    let mut steps = Vec::with_capacity(s.fields.len());
    let mut offset = 0;

    for field in s.fields.iter() {
      let element_size = registry.size(&field.type_name)?;

      let kind = match registry.resolve(&field.type_name)? {
        TypeKind::Primitive(_) if field.is_padding() => SwapKind::Padding,
        TypeKind::Primitive(p) if p.size == 1 => SwapKind::Byte { enum_type: None },
        TypeKind::Primitive(p) if p.is_float => SwapKind::Float(p),
        TypeKind::Primitive(p) => SwapKind::Integer(p),
        TypeKind::Enum(e) if e.underlying.size == 1 => SwapKind::Byte {
          enum_type: Some(e.name.clone()),
        },
        TypeKind::Enum(e) => SwapKind::Enum {
          name: e.name.clone(),
          underlying: e.underlying,
        },
        TypeKind::Struct(nested) => SwapKind::Struct {
          name: nested.name.clone(),
          plan: Box::new(CodecPlan::new(registry, &nested.name)?),
        },
      };

      let step = SwapStep {
        field: field.name.clone(),
        type_name: field.type_name.clone(),
        kind,
        count: field.count(),
        element_size,
        offset,
      };

      offset += step.size();
      steps.push(step);
    }

    let size = registry.size(struct_name)?;
    if offset != size {
      return Err(StructgenError::SizeMismatch {
        name: struct_name.to_owned(),
        expected: size,
        actual: offset,
      });
    }

    Ok(Self {
      struct_name: struct_name.to_owned(),
      steps,
      size,
    })
  }

  /// Copies `src` into `dst` with every multi-byte field's byte order reversed. Returns the
  /// number of bytes processed, which is always the struct size.
  pub fn swap(&self, src: &[u8], dst: &mut [u8]) -> StructgenResult<usize> {
    self.check_length(src.len())?;
    self.check_length(dst.len())?;
    Ok(self.swap_unchecked(src, dst))
  }

  /// Native byte order: the wire image is the in-memory image.
  pub fn copy_native(&self, src: &[u8], dst: &mut [u8]) -> StructgenResult<usize> {
    self.check_length(src.len())?;
    self.check_length(dst.len())?;
    dst[..self.size].copy_from_slice(&src[..self.size]);
    Ok(self.size)
  }

  fn check_length(&self, len: usize) -> StructgenResult<()> {
    if len < self.size {
      return Err(StructgenError::SizeMismatch {
        name: format!("{} buffer", self.struct_name),
        expected: self.size,
        actual: len,
      });
    }
    Ok(())
  }

  fn swap_unchecked(&self, src: &[u8], dst: &mut [u8]) -> usize {
    let mut idx = 0;

    for step in self.steps.iter() {
      for _ in 0..step.count {
        let end = idx + step.element_size;

        match step.kind {
          SwapKind::Padding | SwapKind::Byte { .. } => {
            dst[idx..end].copy_from_slice(&src[idx..end]);
          }
          SwapKind::Enum { underlying: p, .. } | SwapKind::Integer(p) => {
            swap_integer(p.size, &src[idx..end], &mut dst[idx..end]);
          }
          SwapKind::Float(p) => swap_float(p.size, &src[idx..end], &mut dst[idx..end]),
          SwapKind::Struct { ref plan, .. } => {
            let processed = plan.swap_unchecked(&src[idx..end], &mut dst[idx..end]);
            debug_assert_eq!(processed, step.element_size);
          }
        }

        idx = end;
      }
    }

    idx
  }
}

fn swap_integer(size: usize, src: &[u8], dst: &mut [u8]) {
  match size {
    2 => {
      let mut word = [0u8; 2];
      word.copy_from_slice(src);
      dst.copy_from_slice(&u16::from_ne_bytes(word).swap_bytes().to_ne_bytes());
    }
    4 => {
      let mut word = [0u8; 4];
      word.copy_from_slice(src);
      dst.copy_from_slice(&u32::from_ne_bytes(word).swap_bytes().to_ne_bytes());
    }
    8 => {
      let mut word = [0u8; 8];
      word.copy_from_slice(src);
      dst.copy_from_slice(&u64::from_ne_bytes(word).swap_bytes().to_ne_bytes());
    }
    _ => dst.copy_from_slice(src),
  }
}

fn swap_float(size: usize, src: &[u8], dst: &mut [u8]) {
  if size == 4 {
    let mut word = [0u8; 4];
    word.copy_from_slice(src);
    let value = f32::from_bits(u32::from_ne_bytes(word).swap_bytes());
    dst.copy_from_slice(&value.to_bits().to_ne_bytes());
  } else {
    let mut word = [0u8; 8];
    word.copy_from_slice(src);
    let value = f64::from_bits(u64::from_ne_bytes(word).swap_bytes());
    dst.copy_from_slice(&value.to_bits().to_ne_bytes());
  }
}

/// Everything generated for one struct: the swap plan and the bit-field accessor plans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCodec {
  pub plan: CodecPlan,
  pub accessors: Vec<AccessorPlan>,
}

/// Produces codec plans against a frozen registry. Holds only a shared reference, so one
/// generator can serve every worker.
#[derive(Debug, Clone, Copy)]
pub struct CodecGenerator<'a> {
  registry: &'a TypeRegistry,
}
impl<'a> CodecGenerator<'a> {
  pub fn new(registry: &'a TypeRegistry) -> Self {
    Self { registry }
  }

  pub fn registry(&self) -> &'a TypeRegistry {
    self.registry
  }

  pub fn generate(&self, s: &StructType) -> StructgenResult<GeneratedCodec> {
    let plan = CodecPlan::new(self.registry, &s.name)?;

    let mut accessors = Vec::new();
    for field in s.fields.iter() {
      accessors.extend(AccessorPlan::for_field(self.registry, &s.name, field)?);
    }

    debug!(
      "{}: {} swap steps, {} accessor views",
      s.name,
      plan.steps.len(),
      accessors.len()
    );

    Ok(GeneratedCodec { plan, accessors })
  }
}

#[cfg(test)]
mod tests {
  use super::{CodecGenerator, CodecPlan, SwapKind};
  use crate::error::StructgenError;
  use crate::ir::Config;
  use crate::registry::TypeRegistry;

  fn registry() -> TypeRegistry {
    let config: Config = serde_json::from_str(
      r##"{
        "enums": {
          "Wide": { "underlying": "uint16", "enum": { "a": 1, "b": 258 } },
          "Narrow": { "underlying": "uint8", "enum": { "c": null } }
        },
        "structs": {
          "Pair": {
            "fields": [
              { "name": "lo", "type": "uint16" },
              { "name": "hi", "type": "int16" }
            ]
          },
          "Record": {
            "fields": [
              { "name": "tag", "type": "uint8" },
              { "name": "narrow", "type": "Narrow" },
              { "name": "word", "type": "uint32", "expected_offset": 4 },
              { "name": "wide", "type": "Wide", "array_length": 2 },
              { "name": "gain", "type": "float" },
              { "name": "pairs", "type": "Pair", "array_length": 2 },
              { "name": "total", "type": "double", "expected_offset": 28 },
              {
                "name": "flags",
                "type": "uint8",
                "fields": [
                  { "name": "a", "index": 0, "width": 3 },
                  { "name": "b", "index": 3, "width": 2 }
                ]
              }
            ]
          }
        }
      }"##,
    )
    .unwrap();

    TypeRegistry::from_config(&config).unwrap()
  }

  fn pattern(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i as u8).wrapping_mul(37).wrapping_add(11)).collect()
  }

  #[test]
  fn selects_strategy_per_field_kind() {
    let registry = registry();
    let plan = CodecPlan::new(&registry, "Record").unwrap();

    let kinds: Vec<(&str, &SwapKind)> = plan
      .steps
      .iter()
      .map(|s| (s.field.as_str(), &s.kind))
      .collect();

    assert!(matches!(kinds[0], ("tag", SwapKind::Byte { enum_type: None })));
    assert!(matches!(kinds[1], ("narrow", SwapKind::Byte { enum_type: Some(_) })));
    assert!(matches!(kinds[2], ("reserved_padding0", SwapKind::Padding)));
    assert!(matches!(kinds[3], ("word", SwapKind::Integer(_))));
    assert!(matches!(kinds[4], ("wide", SwapKind::Enum { .. })));
    assert!(matches!(kinds[5], ("gain", SwapKind::Float(_))));
    assert!(matches!(kinds[6], ("pairs", SwapKind::Struct { .. })));
    assert!(matches!(kinds[7], ("reserved_padding1", SwapKind::Padding)));
    assert!(matches!(kinds[8], ("total", SwapKind::Float(_))));

    assert_eq!(37, plan.size);
    assert_eq!(28, plan.steps[8].offset);
  }

  #[test]
  fn swapped_round_trip() {
    let registry = registry();
    let plan = CodecPlan::new(&registry, "Record").unwrap();
    let original = pattern(plan.size);

    let mut wire = vec![0u8; plan.size];
    assert_eq!(plan.size, plan.swap(&original, &mut wire).unwrap());

    let mut decoded = vec![0u8; plan.size];
    assert_eq!(plan.size, plan.swap(&wire, &mut decoded).unwrap());
    assert_eq!(original, decoded);

    let mut native = vec![0u8; plan.size];
    assert_eq!(plan.size, plan.copy_native(&original, &mut native).unwrap());
    assert_eq!(original, native);
  }

  #[test]
  fn swaps_each_field_in_place() {
    let registry = registry();
    let plan = CodecPlan::new(&registry, "Record").unwrap();
    let original = pattern(plan.size);
    let mut wire = vec![0u8; plan.size];
    plan.swap(&original, &mut wire).unwrap();

    // bytes and padding pass through
    assert_eq!(original[0..4], wire[0..4]);

    let reversed = |range: std::ops::Range<usize>| {
      let mut bytes = original[range].to_vec();
      bytes.reverse();
      bytes
    };

    assert_eq!(reversed(4..8), wire[4..8].to_vec());
    assert_eq!(reversed(8..10), wire[8..10].to_vec());
    assert_eq!(reversed(10..12), wire[10..12].to_vec());
    assert_eq!(reversed(12..16), wire[12..16].to_vec());

    // nested structs swap per member, not as a whole
    for member in (16..24).step_by(2) {
      assert_eq!(reversed(member..member + 2), wire[member..member + 2].to_vec());
    }

    assert_eq!(reversed(28..36), wire[28..36].to_vec());
    assert_eq!(original[36], wire[36]);
  }

  #[test]
  fn rejects_short_buffers() {
    let registry = registry();
    let plan = CodecPlan::new(&registry, "Pair").unwrap();
    let mut dst = [0u8; 4];

    assert!(matches!(
      plan.swap(&[0u8; 3], &mut dst),
      Err(StructgenError::SizeMismatch {
        expected: 4,
        actual: 3,
        ..
      })
    ));
  }

  #[test]
  fn generator_collects_accessors() {
    let registry = registry();
    let generated = CodecGenerator::new(&registry)
      .generate(registry.get_struct("Record").unwrap())
      .unwrap();

    assert_eq!(1, generated.accessors.len());
    assert_eq!("flags", generated.accessors[0].view);
    assert_eq!(generated.plan.size, registry.size("Record").unwrap());
  }
}
