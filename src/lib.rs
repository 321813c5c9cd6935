//! Compiles declarations of fixed-layout binary records into Rust source with byte-exact,
//! endianness-aware codecs, and lowers CMSIS-SVD device descriptions into the same declarations.

use svd_parser::Access;

pub mod bits;
pub mod codec;
pub mod config;
pub mod emit;
mod error;
pub mod generate;
pub mod group;
pub mod ir;
pub mod layout;
pub mod primitive;
pub mod registry;
pub mod svd;

pub use bits::{AccessorPlan, BitAccessor};
pub use codec::{CodecGenerator, CodecPlan, GeneratedCodec};
pub use config::{EnumFlags, StructFlags, SvdConfig};
pub use error::{StructgenError, StructgenResult};
pub use generate::{generate, GenerationReport};
pub use group::{PeripheralGroup, SvdOutput};
pub use ir::Config;
pub use primitive::PrimitiveType;
pub use registry::{EnumType, StructType, TypeRegistry};
pub use svd::{ingest, SvdModel};

/// Access rights of a register or field.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AccessSpec {
  ReadOnly,
  ReadWrite,
  ReadWriteOnce,
  WriteOnce,
  WriteOnly,
}
impl AccessSpec {
  pub fn new(access: &Access) -> AccessSpec {
    match access {
      Access::ReadOnly => AccessSpec::ReadOnly,
      Access::ReadWrite => AccessSpec::ReadWrite,
      Access::ReadWriteOnce => AccessSpec::ReadWriteOnce,
      Access::WriteOnce => AccessSpec::WriteOnce,
      Access::WriteOnly => AccessSpec::WriteOnly,
    }
  }

  pub fn can_read(&self) -> bool {
    matches!(
      self,
      AccessSpec::ReadOnly | AccessSpec::ReadWrite | AccessSpec::ReadWriteOnce
    )
  }

  pub fn can_write(&self) -> bool {
    !matches!(self, AccessSpec::ReadOnly)
  }
}
