//! Fixed-width primitive types that every declaration bottoms out in.

/// A primitive integer or floating-point type with a known byte width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrimitiveType {
  /// Canonical declarative name (`uint8`, `float`, ...).
  pub name: &'static str,

  /// Name of the equivalent Rust type in generated code.
  pub rust_name: &'static str,

  /// Width in bytes: 1, 2, 4 or 8.
  pub size: usize,

  /// Whether the type is an IEEE-754 float rather than an integer.
  pub is_float: bool,

  pub signed: bool,
}

macro_rules! primitive {
  ($name:expr, $rust:expr, $size:expr, $float:expr, $signed:expr) => {
    PrimitiveType {
      name: $name,
      rust_name: $rust,
      size: $size,
      is_float: $float,
      signed: $signed,
    }
  };
}

pub const PRIMITIVES: [PrimitiveType; 10] = [
  primitive!("uint8", "u8", 1, false, false),
  primitive!("int8", "i8", 1, false, true),
  primitive!("uint16", "u16", 2, false, false),
  primitive!("int16", "i16", 2, false, true),
  primitive!("uint32", "u32", 4, false, false),
  primitive!("int32", "i32", 4, false, true),
  primitive!("uint64", "u64", 8, false, false),
  primitive!("int64", "i64", 8, false, true),
  primitive!("float", "f32", 4, true, true),
  primitive!("double", "f64", 8, true, true),
];

impl PrimitiveType {
  /// Looks up a primitive by declarative name. C-style `_t` suffixes and Rust type names are
  /// accepted as aliases.
  pub fn from_name(name: &str) -> Option<PrimitiveType> {
    let trimmed = name.strip_suffix("_t").unwrap_or(name);
    PRIMITIVES
      .iter()
      .find(|p| p.name == trimmed || p.rust_name == trimmed)
      .copied()
  }

  /// The smallest unsigned integer that holds `bits` bits.
  pub fn unsigned_for_bits(bits: u32) -> Option<PrimitiveType> {
    match bits {
      0 => None,
      1..=8 => PrimitiveType::from_name("uint8"),
      9..=16 => PrimitiveType::from_name("uint16"),
      17..=32 => PrimitiveType::from_name("uint32"),
      33..=64 => PrimitiveType::from_name("uint64"),
      _ => None,
    }
  }

  /// The unsigned integer of the same width. Byte swapping only operates on integers, so floats
  /// are reinterpreted through this type.
  pub fn integral(&self) -> PrimitiveType {
    match self.size {
      1 => PRIMITIVES[0],
      2 => PRIMITIVES[2],
      4 => PRIMITIVES[4],
      _ => PRIMITIVES[6],
    }
  }

  pub fn bits(&self) -> u32 {
    self.size as u32 * 8
  }

  pub fn is_integer(&self) -> bool {
    !self.is_float
  }
}
