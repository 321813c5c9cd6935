//! Rust source rendering for registered structs and enums.
//!
//! Every declaration becomes one self-contained module file. The generated tree looks like:
//!
//! ```text
//! <output>/mod.rs          Endianness, byte helpers, `pub mod structs; pub mod enums;`
//! <output>/structs/mod.rs  `pub mod <name>; pub use <name>::<Name>;` per struct
//! <output>/enums/mod.rs    the same, per enum
//! ```
//!
//! Struct files import their dependencies through those re-exports, so nothing depends on where
//! the output tree is mounted in the consuming crate.

use serde_json::json;
use std::collections::BTreeSet;
use std::fmt::Write;

use crate::bits::{AccessorPlan, BitFieldPlan};
use crate::codec::{CodecGenerator, SwapKind, SwapStep};
use crate::error::StructgenResult;
use crate::registry::{EnumType, Field, StructType, TypeKind, TypeRegistry};

const HEADER: &str = "// Generated by structgen. Do not edit; regenerate from the declaration instead.";

/// Makes a declared name usable as a Rust identifier.
pub fn ident(name: &str) -> String {
  let mut result: String = name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
    .collect();

  if result.is_empty() || result.starts_with(|c: char| c.is_ascii_digit()) {
    result.insert(0, '_');
  }

  tweak_keywords(result)
}

/// File and module name for a declaration.
pub fn module_name(name: &str) -> String {
  tweak_keywords(ident(name).to_lowercase())
}

/// Appends an underscore to Rust keywords.
fn tweak_keywords(s: String) -> String {
  match s.as_str() {
    "as" | "break" | "const" | "continue" | "crate" | "else" | "enum" | "extern" | "false"
    | "fn" | "for" | "if" | "impl" | "in" | "let" | "loop" | "match" | "mod" | "move" | "mut"
    | "pub" | "ref" | "return" | "self" | "Self" | "static" | "struct" | "super" | "trait"
    | "true" | "type" | "unsafe" | "use" | "where" | "while" | "async" | "await" | "dyn"
    | "abstract" | "become" | "box" | "do" | "final" | "macro" | "override" | "priv"
    | "typeof" | "unsized" | "virtual" | "yield" | "try" => s + "_",
    _ => s,
  }
}

/// Formats an integer as a hex constant with underscores every four digits.
pub fn hex_const(val: u64) -> String {
  if val > 9 {
    let mut x = String::new();
    for (i, c) in format!("{:x}", val).chars().rev().enumerate() {
      if i % 4 == 0 && i != 0 {
        x.push('_');
      }
      x.push(c);
    }
    "0x".to_string() + &x.chars().rev().collect::<String>()
  } else {
    format!("{}", val)
  }
}

fn doc(out: &mut String, indent: &str, text: &Option<String>) -> StructgenResult<()> {
  if let Some(text) = text {
    for line in text.lines() {
      writeln!(out, "{}/// {}", indent, line.trim())?;
    }
  }
  Ok(())
}

fn rust_type(registry: &TypeRegistry, type_name: &str) -> StructgenResult<String> {
  Ok(match registry.resolve(type_name)? {
    TypeKind::Primitive(p) => p.rust_name.to_owned(),
    TypeKind::Enum(e) => ident(&e.name),
    TypeKind::Struct(s) => ident(&s.name),
  })
}

fn field_type(registry: &TypeRegistry, field: &Field) -> StructgenResult<String> {
  let element = rust_type(registry, &field.type_name)?;
  Ok(match field.array_length {
    Some(n) => format!("[{}; {}]", element, n),
    None => element,
  })
}

/// Renders the root `mod.rs` of a generated tree.
pub fn render_root() -> String {
  format!(
    r#"{header}

#![allow(dead_code)]

pub mod enums;
pub mod structs;

/// Byte order of an encoded buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endianness {{
  Little,
  Big,
}}

impl Endianness {{
  #[cfg(target_endian = "little")]
  pub const NATIVE: Endianness = Endianness::Little;
  #[cfg(target_endian = "big")]
  pub const NATIVE: Endianness = Endianness::Big;

  pub fn is_native(self) -> bool {{
    self == Self::NATIVE
  }}
}}

/// Copies `N` bytes starting at `idx` out of `buffer`.
pub fn bytes<const N: usize>(buffer: &[u8], idx: usize) -> [u8; N] {{
  let mut out = [0u8; N];
  out.copy_from_slice(&buffer[idx..idx + N]);
  out
}}

/// Volatile load of a field of a packed struct. One access when `src` is aligned for `T`,
/// byte by byte otherwise.
///
/// # Safety
///
/// `src` must be valid for reads of `size_of::<T>()` bytes.
pub unsafe fn read_volatile_unaligned<T: Copy>(src: *const T) -> T {{
  if (src as usize) % core::mem::align_of::<T>() == 0 {{
    return core::ptr::read_volatile(src);
  }}

  let mut value = core::mem::MaybeUninit::<T>::uninit();
  let dst = value.as_mut_ptr().cast::<u8>();
  let src = src.cast::<u8>();
  for i in 0..core::mem::size_of::<T>() {{
    dst.add(i).write(core::ptr::read_volatile(src.add(i)));
  }}
  value.assume_init()
}}

/// Volatile store counterpart of [`read_volatile_unaligned`].
///
/// # Safety
///
/// `dst` must be valid for writes of `size_of::<T>()` bytes.
pub unsafe fn write_volatile_unaligned<T: Copy>(dst: *mut T, value: T) {{
  if (dst as usize) % core::mem::align_of::<T>() == 0 {{
    core::ptr::write_volatile(dst, value);
    return;
  }}

  let src = (&value as *const T).cast::<u8>();
  let dst = dst.cast::<u8>();
  for i in 0..core::mem::size_of::<T>() {{
    core::ptr::write_volatile(dst.add(i), src.add(i).read());
  }}
}}
"#,
    header = HEADER
  )
}

/// Renders a `structs/mod.rs` or `enums/mod.rs` listing the given declarations.
pub fn render_index<'a, I>(names: I) -> StructgenResult<String>
where
  I: IntoIterator<Item = &'a str>,
{
  let mut out = String::new();
  writeln!(out, "{}", HEADER)?;
  writeln!(out)?;

  for name in names {
    writeln!(out, "pub mod {};", module_name(name))?;
    writeln!(out, "pub use {}::{};", module_name(name), ident(name))?;
  }

  Ok(out)
}

/// Renders one struct declaration, including its swapped codec and bit-field accessors.
pub fn render_struct(generator: &CodecGenerator, s: &StructType) -> StructgenResult<String> {
  let registry = generator.registry();
  let generated = generator.generate(s)?;
  let name = ident(&s.name);
  let mut out = String::new();

  writeln!(out, "{}", HEADER)?;
  if !s.namespace.is_empty() {
    writeln!(out, "// Namespace: {}", s.namespace.join("::"))?;
  }
  writeln!(out)?;
  writeln!(
    out,
    "#![allow(non_camel_case_types, non_snake_case, non_upper_case_globals, clippy::all)]"
  )?;
  writeln!(out)?;

  render_struct_imports(&mut out, registry, s)?;

  doc(&mut out, "", &s.description)?;
  writeln!(out, "#[repr(C, packed)]")?;
  writeln!(out, "#[derive(Clone, Copy, Debug)]")?;
  writeln!(out, "pub struct {} {{", name)?;
  for field in s.fields.iter() {
    doc(&mut out, "  ", &field.description)?;
    let visibility = if field.is_const() { "" } else { "pub " };
    writeln!(
      out,
      "  {}{}: {},",
      visibility,
      ident(&field.name),
      field_type(registry, field)?
    )?;
  }
  writeln!(out, "}}")?;
  writeln!(out)?;

  writeln!(out, "/// Byte image of a [`{}`].", name)?;
  writeln!(out, "pub type {}Buffer = [u8; {}::SIZE];", name, name)?;
  writeln!(out)?;

  writeln!(out, "impl Default for {} {{", name)?;
  writeln!(out, "  fn default() -> Self {{")?;
  writeln!(out, "    Self::from_bytes(&[0; Self::SIZE])")?;
  writeln!(out, "  }}")?;
  writeln!(out, "}}")?;
  writeln!(out)?;

  writeln!(out, "impl {} {{", name)?;
  render_struct_constants(&mut out, registry, s)?;
  render_raw_access(&mut out, &name)?;

  if s.flags.codec {
    render_swapped_codec(&mut out, registry, &generated.plan.steps)?;
  }

  if s.flags.stream {
    render_stream(&mut out, s.flags.codec)?;
  }

  if s.flags.methods {
    render_field_access(&mut out, registry, s)?;
  }

  for accessor in generated.accessors.iter() {
    render_accessors(&mut out, registry, accessor)?;
  }

  writeln!(out, "}}")?;

  if s.flags.methods {
    render_ordering(&mut out, &name)?;
  }

  if s.flags.unit_test {
    render_struct_test(&mut out, &name, s.flags.codec)?;
  }

  Ok(out)
}

fn render_struct_imports(
  out: &mut String,
  registry: &TypeRegistry,
  s: &StructType,
) -> StructgenResult<()> {
  let mut enums = BTreeSet::new();
  let mut structs = BTreeSet::new();

  let mut note = |type_name: &str| -> StructgenResult<()> {
    match registry.resolve(type_name)? {
      TypeKind::Enum(e) => {
        enums.insert(ident(&e.name));
      }
      TypeKind::Struct(nested) => {
        structs.insert(ident(&nested.name));
      }
      TypeKind::Primitive(_) => (),
    }
    Ok(())
  };

  for field in s.fields.iter() {
    note(&field.type_name)?;

    let bit_fields = field
      .bit_fields()
      .iter()
      .chain(field.alternates().iter().flat_map(|a| a.bit_fields.iter()));
    for bit_field in bit_fields {
      if let Some(ref enum_type) = bit_field.enum_type {
        note(enum_type)?;
      }
    }
  }

  writeln!(out, "#[allow(unused_imports)]")?;
  writeln!(
    out,
    "use super::super::{{bytes, read_volatile_unaligned, write_volatile_unaligned, Endianness}};"
  )?;
  for e in enums.iter() {
    writeln!(out, "use super::super::enums::{};", e)?;
  }
  for nested in structs.iter() {
    writeln!(out, "use super::{};", nested)?;
  }
  writeln!(out)?;

  Ok(())
}

fn render_struct_constants(
  out: &mut String,
  registry: &TypeRegistry,
  s: &StructType,
) -> StructgenResult<()> {
  writeln!(out, "  /// Size in bytes of the encoded struct.")?;
  writeln!(out, "  pub const SIZE: usize = {};", s.size)?;

  if let Some(id) = s.identifier {
    writeln!(
      out,
      "  pub const ID: {} = {};",
      registry.id_underlying().rust_name,
      id
    )?;
  }

  for field in s.fields.iter().filter(|f| !f.is_padding()) {
    if let Some(n) = field.array_length {
      writeln!(
        out,
        "  pub const {}_LENGTH: usize = {};",
        ident(&field.name).to_uppercase(),
        n
      )?;
    }
  }

  for instance in s.instances.iter() {
    doc(out, "  ", &instance.description)?;
    writeln!(
      out,
      "  pub const {}_ADDRESS: usize = {};",
      ident(&instance.name).to_uppercase(),
      hex_const(instance.address)
    )?;
  }

  if s.flags.json {
    writeln!(out, "  pub const JSON: &'static str = {:?};", struct_json(registry, s)?)?;
  }

  for instance in s.instances.iter() {
    writeln!(out)?;
    writeln!(
      out,
      "  /// Memory-mapped `{}` instance. Access through this pointer is{} volatile.",
      instance.name,
      if instance.volatile { "" } else { " not" }
    )?;
    writeln!(out, "  pub fn {}() -> *mut Self {{", module_name(&instance.name))?;
    writeln!(
      out,
      "    Self::{}_ADDRESS as *mut Self",
      ident(&instance.name).to_uppercase()
    )?;
    writeln!(out, "  }}")?;
  }

  Ok(())
}

fn render_raw_access(out: &mut String, name: &str) -> StructgenResult<()> {
  write!(
    out,
    r#"
  /// Reinterprets a byte image. Every field is plain integer data, so any image is valid.
  pub fn from_bytes(buffer: &{name}Buffer) -> Self {{
    unsafe {{ core::ptr::read_unaligned(buffer.as_ptr() as *const Self) }}
  }}

  pub fn raw(&mut self) -> &mut {name}Buffer {{
    unsafe {{ &mut *(self as *mut Self as *mut {name}Buffer) }}
  }}

  pub fn raw_ro(&self) -> &{name}Buffer {{
    unsafe {{ &*(self as *const Self as *const {name}Buffer) }}
  }}

  pub fn encode_native(&self, buffer: &mut [u8]) -> usize {{
    buffer[..Self::SIZE].copy_from_slice(self.raw_ro());
    Self::SIZE
  }}

  pub fn decode_native(&mut self, buffer: &[u8]) -> usize {{
    self.raw().copy_from_slice(&buffer[..Self::SIZE]);
    Self::SIZE
  }}
"#,
    name = name
  )?;
  Ok(())
}

/// Expression that writes the element bound to `value` into `buffer` at `idx`.
fn encode_element(step: &SwapStep) -> String {
  let size = step.element_size;
  match step.kind {
    SwapKind::Padding => format!(
      "buffer[idx..idx + {}].copy_from_slice(&value.to_ne_bytes());",
      size
    ),
    SwapKind::Byte { enum_type: None } => "buffer[idx] = value.to_ne_bytes()[0];".to_owned(),
    SwapKind::Byte { enum_type: Some(_) } => {
      "buffer[idx] = value.0.to_ne_bytes()[0];".to_owned()
    }
    SwapKind::Integer(_) => format!(
      "buffer[idx..idx + {}].copy_from_slice(&value.swap_bytes().to_ne_bytes());",
      size
    ),
    SwapKind::Enum { .. } => format!(
      "buffer[idx..idx + {}].copy_from_slice(&value.0.swap_bytes().to_ne_bytes());",
      size
    ),
    SwapKind::Float(_) => format!(
      "buffer[idx..idx + {}].copy_from_slice(&value.to_bits().swap_bytes().to_ne_bytes());",
      size
    ),
    SwapKind::Struct { .. } => "value.encode_swapped(&mut buffer[idx..]);".to_owned(),
  }
}

/// Expression producing one decoded element read from `buffer` at `idx`. Structs decode in
/// place and have no expression form.
fn decode_element(registry: &TypeRegistry, step: &SwapStep) -> StructgenResult<Option<String>> {
  let element = rust_type(registry, &step.type_name)?;
  Ok(match step.kind {
    SwapKind::Padding => Some(format!("{}::from_ne_bytes(bytes(buffer, idx))", element)),
    SwapKind::Byte { enum_type: None } => {
      Some(format!("{}::from_ne_bytes([buffer[idx]])", element))
    }
    SwapKind::Byte {
      enum_type: Some(ref e),
    } => {
      let underlying = enum_underlying(registry, e)?;
      Some(format!(
        "{}({}::from_ne_bytes([buffer[idx]]))",
        element, underlying
      ))
    }
    SwapKind::Integer(_) => Some(format!(
      "{}::from_ne_bytes(bytes(buffer, idx)).swap_bytes()",
      element
    )),
    SwapKind::Enum { underlying, .. } => Some(format!(
      "{}({}::from_ne_bytes(bytes(buffer, idx)).swap_bytes())",
      element, underlying.rust_name
    )),
    SwapKind::Float(p) => Some(format!(
      "{}::from_bits({}::from_ne_bytes(bytes(buffer, idx)).swap_bytes())",
      p.rust_name,
      p.integral().rust_name
    )),
    SwapKind::Struct { .. } => None,
  })
}

fn enum_underlying(registry: &TypeRegistry, name: &str) -> StructgenResult<&'static str> {
  match registry.resolve(name)? {
    TypeKind::Enum(e) => Ok(e.underlying.rust_name),
    TypeKind::Primitive(p) => Ok(p.rust_name),
    TypeKind::Struct(_) => Err(crate::error::StructgenError::invalid(
      name,
      "single-byte enum storage",
    )),
  }
}

fn render_swapped_codec(
  out: &mut String,
  registry: &TypeRegistry,
  steps: &[SwapStep],
) -> StructgenResult<()> {
  writeln!(out)?;
  writeln!(out, "  /// Encodes with every multi-byte field in the opposite byte order.")?;
  writeln!(out, "  pub fn encode_swapped(&self, buffer: &mut [u8]) -> usize {{")?;
  writeln!(out, "    let mut idx = 0;")?;
  for step in steps {
    let field = ident(&step.field);
    let body = encode_element(step);
    let advance = format!("idx += {};", step.element_size);

    writeln!(out)?;
    if step.count > 1 {
      writeln!(out, "    let values = self.{};", field)?;
      writeln!(out, "    for value in values.iter() {{")?;
      writeln!(out, "      {}", body)?;
      writeln!(out, "      {}", advance)?;
      writeln!(out, "    }}")?;
    } else {
      writeln!(out, "    let value = self.{};", field)?;
      writeln!(out, "    {}", body)?;
      writeln!(out, "    {}", advance)?;
    }
  }
  writeln!(out)?;
  writeln!(out, "    idx")?;
  writeln!(out, "  }}")?;

  writeln!(out)?;
  writeln!(out, "  /// Decodes a buffer whose multi-byte fields are in the opposite byte order.")?;
  writeln!(out, "  pub fn decode_swapped(&mut self, buffer: &[u8]) -> usize {{")?;
  writeln!(out, "    let mut idx = 0;")?;
  for step in steps {
    let field = ident(&step.field);
    let size = step.element_size;

    writeln!(out)?;
    match decode_element(registry, step)? {
      Some(expr) if step.count > 1 => {
        writeln!(out, "    let mut values = self.{};", field)?;
        writeln!(out, "    for value in values.iter_mut() {{")?;
        writeln!(out, "      *value = {};", expr)?;
        writeln!(out, "      idx += {};", size)?;
        writeln!(out, "    }}")?;
        writeln!(out, "    self.{} = values;", field)?;
      }
      Some(expr) => {
        writeln!(out, "    self.{} = {};", field, expr)?;
        writeln!(out, "    idx += {};", size)?;
      }
      None if step.count > 1 => {
        writeln!(out, "    let mut values = self.{};", field)?;
        writeln!(out, "    for value in values.iter_mut() {{")?;
        writeln!(out, "      idx += value.decode_swapped(&buffer[idx..]);")?;
        writeln!(out, "    }}")?;
        writeln!(out, "    self.{} = values;", field)?;
      }
      None => {
        writeln!(out, "    let mut value = self.{};", field)?;
        writeln!(out, "    idx += value.decode_swapped(&buffer[idx..]);")?;
        writeln!(out, "    self.{} = value;", field)?;
      }
    }
  }
  writeln!(out)?;
  writeln!(out, "    idx")?;
  writeln!(out, "  }}")?;

  write!(
    out,
    r#"
  pub fn encode(&self, buffer: &mut [u8], endianness: Endianness) -> usize {{
    if endianness.is_native() {{
      self.encode_native(buffer)
    }} else {{
      self.encode_swapped(buffer)
    }}
  }}

  pub fn decode(&mut self, buffer: &[u8], endianness: Endianness) -> usize {{
    if endianness.is_native() {{
      self.decode_native(buffer)
    }} else {{
      self.decode_swapped(buffer)
    }}
  }}

  /// Reverses the byte order of every multi-byte field in place.
  pub fn swap(&mut self) {{
    let mut buffer = [0u8; Self::SIZE];
    self.encode_swapped(&mut buffer);
    self.decode_native(&buffer);
  }}
"#
  )?;

  Ok(())
}

fn render_stream(out: &mut String, codec: bool) -> StructgenResult<()> {
  if codec {
    write!(
      out,
      r#"
  pub fn read_from<R: std::io::Read>(
    &mut self,
    reader: &mut R,
    endianness: Endianness,
  ) -> std::io::Result<usize> {{
    let mut buffer = [0u8; Self::SIZE];
    reader.read_exact(&mut buffer)?;
    Ok(self.decode(&buffer, endianness))
  }}

  pub fn write_to<W: std::io::Write>(
    &self,
    writer: &mut W,
    endianness: Endianness,
  ) -> std::io::Result<usize> {{
    let mut buffer = [0u8; Self::SIZE];
    let written = self.encode(&mut buffer, endianness);
    writer.write_all(&buffer)?;
    Ok(written)
  }}
"#
    )?;
  } else {
    write!(
      out,
      r#"
  pub fn read_from<R: std::io::Read>(&mut self, reader: &mut R) -> std::io::Result<usize> {{
    let mut buffer = [0u8; Self::SIZE];
    reader.read_exact(&mut buffer)?;
    Ok(self.decode_native(&buffer))
  }}

  pub fn write_to<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<usize> {{
    writer.write_all(self.raw_ro())?;
    Ok(Self::SIZE)
  }}
"#
    )?;
  }
  Ok(())
}

/// Getters for `const` fields and volatile load/store for `volatile` ones.
fn render_field_access(
  out: &mut String,
  registry: &TypeRegistry,
  s: &StructType,
) -> StructgenResult<()> {
  for field in s.fields.iter().filter(|f| !f.is_padding()) {
    let name = ident(&field.name);
    let ty = field_type(registry, field)?;

    if field.is_const() {
      writeln!(out)?;
      writeln!(out, "  pub fn {}(&self) -> {} {{", name, ty)?;
      writeln!(out, "    self.{}", name)?;
      writeln!(out, "  }}")?;
    }

    if field.is_volatile() {
      writeln!(out)?;
      writeln!(out, "  pub fn read_{}(&self) -> {} {{", name, ty)?;
      writeln!(
        out,
        "    unsafe {{ read_volatile_unaligned(core::ptr::addr_of!(self.{})) }}",
        name
      )?;
      writeln!(out, "  }}")?;

      if !field.is_const() {
        writeln!(out)?;
        writeln!(out, "  pub fn write_{}(&mut self, value: {}) {{", name, ty)?;
        writeln!(
          out,
          "    unsafe {{ write_volatile_unaligned(core::ptr::addr_of_mut!(self.{}), value) }}",
          name
        )?;
        writeln!(out, "  }}")?;
      }
    }
  }

  Ok(())
}

/// Load, element place, and store snippets for an accessor's storage field. Generated locals
/// carry a `__` prefix so they never shadow a bit-field parameter.
struct Storage {
  load: String,
  element: String,
  store: String,
  index_param: &'static str,
}
impl Storage {
  fn new(plan: &AccessorPlan) -> Self {
    let field = ident(&plan.storage_field);

    let (load, store) = if plan.volatile {
      (
        format!(
          "unsafe {{ read_volatile_unaligned(core::ptr::addr_of!(self.{})) }}",
          field
        ),
        format!(
          "unsafe {{ write_volatile_unaligned(core::ptr::addr_of_mut!(self.{}), __storage) }}",
          field
        ),
      )
    } else {
      (format!("self.{}", field), format!("self.{} = __storage", field))
    };

    let mut element = if plan.array_length.is_some() {
      "__storage[__index]".to_owned()
    } else {
      "__storage".to_owned()
    };
    if plan.storage_enum.is_some() {
      element.push_str(".0");
    }

    let index_param = if plan.array_length.is_some() {
      ", __index: usize"
    } else {
      ""
    };

    Self {
      load,
      element,
      store,
      index_param,
    }
  }
}

fn bit_value_type(
  registry: &TypeRegistry,
  plan: &AccessorPlan,
  bit: &BitFieldPlan,
) -> StructgenResult<String> {
  match bit.enum_type {
    Some(ref e) => rust_type(registry, e),
    None => Ok(plan.storage.rust_name.to_owned()),
  }
}

/// Expression extracting `bit` from the 64-bit widened storage value `__raw`.
fn extract(
  registry: &TypeRegistry,
  plan: &AccessorPlan,
  bit: &BitFieldPlan,
) -> StructgenResult<String> {
  let shifted = format!(
    "((__raw >> {}) & {})",
    bit.accessor.index,
    hex_const(bit.accessor.mask())
  );

  Ok(match bit.enum_type {
    Some(ref e) => format!(
      "{}({} as {})",
      rust_type(registry, e)?,
      shifted,
      enum_underlying(registry, e)?
    ),
    None => format!("{} as {}", shifted, plan.storage.rust_name),
  })
}

/// Statement inserting `value` for `bit` into the 64-bit widened storage value `__raw`.
fn insert(bit: &BitFieldPlan, value: &str) -> String {
  let widened = if bit.enum_type.is_some() {
    format!("({}.0 as u64)", value)
  } else {
    format!("({} as u64)", value)
  };

  format!(
    "__raw = (__raw & !{}) | (({} & {}) << {});",
    hex_const(bit.accessor.shifted_mask()),
    widened,
    hex_const(bit.accessor.mask()),
    bit.accessor.index
  )
}

fn render_accessors(
  out: &mut String,
  registry: &TypeRegistry,
  plan: &AccessorPlan,
) -> StructgenResult<()> {
  let storage = Storage::new(plan);
  let width = plan.storage.rust_name;
  let view = ident(&plan.view);

  for bit in plan.bit_fields.iter() {
    let base = format!("{}_{}", view, ident(&bit.name));
    let value_type = bit_value_type(registry, plan, bit)?;

    if bit.read {
      writeln!(out)?;
      doc(out, "  ", &bit.description)?;
      writeln!(
        out,
        "  pub fn get_{}(&self{}) -> {} {{",
        base, storage.index_param, value_type
      )?;
      writeln!(out, "    let __storage = {};", storage.load)?;
      writeln!(out, "    let __raw = {} as u64;", storage.element)?;
      writeln!(out, "    {}", extract(registry, plan, bit)?)?;
      writeln!(out, "  }}")?;
    }

    if !bit.write {
      continue;
    }

    let mut setters: Vec<(String, String, String)> = Vec::new();
    if bit.accessor.is_single_bit() {
      let mask = hex_const(1u64 << bit.accessor.index);
      setters.push((format!("set_{}", base), String::new(), format!("__raw |= {};", mask)));
      setters.push((format!("clear_{}", base), String::new(), format!("__raw &= !{};", mask)));
      setters.push((format!("toggle_{}", base), String::new(), format!("__raw ^= {};", mask)));
    } else {
      setters.push((
        format!("set_{}", base),
        format!(", value: {}", value_type),
        insert(bit, "value"),
      ));
    }

    for (method, params, update) in setters {
      writeln!(out)?;
      writeln!(
        out,
        "  pub fn {}(&mut self{}{}) {{",
        method, storage.index_param, params
      )?;
      writeln!(out, "    let mut __storage = {};", storage.load)?;
      writeln!(out, "    let mut __raw = {} as u64;", storage.element)?;
      writeln!(out, "    {}", update)?;
      writeln!(out, "    {} = __raw as {};", storage.element, width)?;
      writeln!(out, "    {};", storage.store)?;
      writeln!(out, "  }}")?;
    }
  }

  if plan.has_get_all() {
    let readable: Vec<&BitFieldPlan> = plan.readable().collect();
    let types = readable
      .iter()
      .map(|b| bit_value_type(registry, plan, b))
      .collect::<StructgenResult<Vec<String>>>()?;

    writeln!(out)?;
    writeln!(out, "  /// Reads every readable `{}` bit-field from one load.", plan.view)?;
    writeln!(
      out,
      "  pub fn get_all_{}(&self{}) -> ({},) {{",
      view,
      storage.index_param,
      types.join(", ")
    )?;
    writeln!(out, "    let __storage = {};", storage.load)?;
    writeln!(out, "    let __raw = {} as u64;", storage.element)?;
    writeln!(out, "    (")?;
    for bit in readable.iter() {
      writeln!(out, "      {},", extract(registry, plan, bit)?)?;
    }
    writeln!(out, "    )")?;
    writeln!(out, "  }}")?;
  }

  if plan.has_set_all() {
    let writable: Vec<&BitFieldPlan> = plan.writable().collect();
    let mut params = String::new();
    for bit in writable.iter() {
      write!(
        params,
        ", {}: {}",
        ident(&bit.name.to_lowercase()),
        bit_value_type(registry, plan, bit)?
      )?;
    }

    writeln!(out)?;
    writeln!(out, "  /// Writes every writable `{}` bit-field with one store.", plan.view)?;
    writeln!(
      out,
      "  pub fn set_all_{}(&mut self{}{}) {{",
      view, storage.index_param, params
    )?;
    writeln!(out, "    let mut __storage = {};", storage.load)?;
    writeln!(out, "    let mut __raw = {} as u64;", storage.element)?;
    for bit in writable.iter() {
      writeln!(out, "    {}", insert(bit, &ident(&bit.name.to_lowercase())))?;
    }
    writeln!(out, "    {} = __raw as {};", storage.element, width)?;
    writeln!(out, "    {};", storage.store)?;
    writeln!(out, "  }}")?;
  }

  Ok(())
}

fn render_ordering(out: &mut String, name: &str) -> StructgenResult<()> {
  write!(
    out,
    r#"
impl PartialEq for {name} {{
  fn eq(&self, other: &Self) -> bool {{
    self.raw_ro() == other.raw_ro()
  }}
}}

impl Eq for {name} {{}}

impl PartialOrd for {name} {{
  fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {{
    Some(self.cmp(other))
  }}
}}

impl Ord for {name} {{
  fn cmp(&self, other: &Self) -> core::cmp::Ordering {{
    self.raw_ro().cmp(other.raw_ro())
  }}
}}
"#,
    name = name
  )?;
  Ok(())
}

fn render_struct_test(out: &mut String, name: &str, codec: bool) -> StructgenResult<()> {
  write!(
    out,
    r#"
#[cfg(test)]
mod tests {{
  use super::*;

  fn pattern() -> {name}Buffer {{
    let mut buffer = [0u8; {name}::SIZE];
    for (i, byte) in buffer.iter_mut().enumerate() {{
      *byte = (i as u8).wrapping_mul(37).wrapping_add(11);
    }}
    buffer
  }}

  #[test]
  fn native_round_trip() {{
    let original = {name}::from_bytes(&pattern());
    let mut buffer = [0u8; {name}::SIZE];
    assert_eq!({name}::SIZE, original.encode_native(&mut buffer));

    let mut decoded = {name}::default();
    assert_eq!({name}::SIZE, decoded.decode_native(&buffer));
    assert_eq!(original.raw_ro(), decoded.raw_ro());
  }}
"#,
    name = name
  )?;

  if codec {
    write!(
      out,
      r#"
  #[test]
  fn swapped_round_trip() {{
    let original = {name}::from_bytes(&pattern());
    let mut buffer = [0u8; {name}::SIZE];
    assert_eq!({name}::SIZE, original.encode_swapped(&mut buffer));

    let mut decoded = {name}::default();
    assert_eq!({name}::SIZE, decoded.decode_swapped(&buffer));
    assert_eq!(original.raw_ro(), decoded.raw_ro());
  }}
"#,
      name = name
    )?;
  }

  writeln!(out, "}}")?;
  Ok(())
}

fn struct_json(registry: &TypeRegistry, s: &StructType) -> StructgenResult<String> {
  let mut offset = 0;
  let mut fields = Vec::with_capacity(s.fields.len());

  for field in s.fields.iter() {
    let size = registry.size(&field.type_name)? * field.count();
    let bit_fields: Vec<serde_json::Value> = field
      .bit_fields()
      .iter()
      .map(|b| {
        json!({
          "name": b.name,
          "index": b.index,
          "width": b.width,
          "read": b.read,
          "write": b.write,
          "type": b.enum_type,
        })
      })
      .collect();

    fields.push(json!({
      "name": field.name,
      "type": field.type_name,
      "offset": offset,
      "size": size,
      "array_length": field.array_length,
      "padding": field.is_padding(),
      "const": field.is_const(),
      "volatile": field.is_volatile(),
      "fields": bit_fields,
      "alternates": field.alternates().iter().map(|a| a.name.clone()).collect::<Vec<String>>(),
    }));

    offset += size;
  }

  Ok(serde_json::to_string(&json!({
    "name": s.name,
    "namespace": s.namespace,
    "description": s.description,
    "size": s.size,
    "identifier": s.identifier,
    "fields": fields,
  }))?)
}

/// Members stay in declaration order.
fn enum_json(e: &EnumType) -> StructgenResult<String> {
  let members: serde_json::Map<String, serde_json::Value> = e
    .members
    .iter()
    .map(|m| (m.name.clone(), json!(m.value)))
    .collect();

  Ok(serde_json::to_string(&json!({
    "name": e.name,
    "namespace": e.namespace,
    "underlying": e.underlying.name,
    "enum": members,
  }))?)
}

/// Renders one enum declaration.
pub fn render_enum(registry: &TypeRegistry, e: &EnumType) -> StructgenResult<String> {
  let name = ident(&e.name);
  let underlying = e.underlying.rust_name;
  let mut out = String::new();

  writeln!(out, "{}", HEADER)?;
  if !e.namespace.is_empty() {
    writeln!(out, "// Namespace: {}", e.namespace.join("::"))?;
  }
  writeln!(out)?;
  writeln!(
    out,
    "#![allow(non_camel_case_types, non_snake_case, non_upper_case_globals, unreachable_patterns)]"
  )?;
  writeln!(out)?;

  doc(&mut out, "", &e.description)?;
  writeln!(out, "#[repr(transparent)]")?;
  writeln!(
    out,
    "#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]"
  )?;
  writeln!(out, "pub struct {}(pub {});", name, underlying)?;
  writeln!(out)?;

  writeln!(out, "impl {} {{", name)?;
  for member in e.members.iter() {
    doc(&mut out, "  ", &member.description)?;
    writeln!(
      out,
      "  pub const {}: {} = {}({});",
      ident(&member.name),
      name,
      name,
      member.value
    )?;
  }

  if let Some(id) = e.identifier {
    writeln!(out)?;
    writeln!(
      out,
      "  pub const ID: {} = {};",
      registry.id_underlying().rust_name,
      id
    )?;
  }

  if e.flags.json {
    writeln!(out)?;
    writeln!(out, "  pub const JSON: &'static str = {:?};", enum_json(e)?)?;
  }

  if e.flags.use_map {
    writeln!(out)?;
    writeln!(
      out,
      "  const NAMES: [({}, &'static str); {}] = [",
      underlying,
      e.members.len()
    )?;
    for member in e.members.iter() {
      writeln!(out, "    ({}, {:?}),", member.value, member.name)?;
    }
    writeln!(out, "  ];")?;

    write!(
      out,
      r#"
  pub fn as_str(&self) -> Option<&'static str> {{
    Self::NAMES
      .iter()
      .find(|(value, _)| *value == self.0)
      .map(|(_, name)| *name)
  }}

  pub fn from_name(name: &str) -> Option<Self> {{
    Self::NAMES
      .iter()
      .find(|(_, candidate)| *candidate == name)
      .map(|(value, _)| Self(*value))
  }}
"#
    )?;
  } else {
    writeln!(out)?;
    writeln!(out, "  pub fn as_str(&self) -> Option<&'static str> {{")?;
    writeln!(out, "    match self.0 {{")?;
    for member in e.members.iter() {
      writeln!(out, "      {} => Some({:?}),", member.value, member.name)?;
    }
    writeln!(out, "      _ => None,")?;
    writeln!(out, "    }}")?;
    writeln!(out, "  }}")?;

    writeln!(out)?;
    writeln!(out, "  pub fn from_name(name: &str) -> Option<Self> {{")?;
    writeln!(out, "    match name {{")?;
    for member in e.members.iter() {
      writeln!(
        out,
        "      {:?} => Some(Self::{}),",
        member.name,
        ident(&member.name)
      )?;
    }
    writeln!(out, "      _ => None,")?;
    writeln!(out, "    }}")?;
    writeln!(out, "  }}")?;
  }
  writeln!(out, "}}")?;

  write!(
    out,
    r#"
impl core::fmt::Display for {name} {{
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {{
    match self.as_str() {{
      Some(member) => f.write_str(member),
      None => f.write_str("UNKNOWN {raw_name}"),
    }}
  }}
}}

impl core::str::FromStr for {name} {{
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {{
    Self::from_name(s).ok_or(())
  }}
}}
"#,
    name = name,
    raw_name = e.name
  )?;

  if e.flags.unit_test {
    writeln!(out)?;
    writeln!(out, "#[cfg(test)]")?;
    writeln!(out, "mod tests {{")?;
    writeln!(out, "  use super::*;")?;
    writeln!(out)?;
    writeln!(out, "  #[test]")?;
    writeln!(out, "  fn names_round_trip() {{")?;
    for member in e.members.iter() {
      writeln!(
        out,
        "    assert_eq!(Some({}), {}::from_name({:?}).map(|v| v.0));",
        member.value, name, member.name
      )?;
      writeln!(
        out,
        "    assert_eq!(Ok({}::{}), {:?}.parse::<{}>());",
        name,
        ident(&member.name),
        member.name,
        name
      )?;
    }
    writeln!(out, "    assert!(\"\".parse::<{}>().is_err());", name)?;
    writeln!(out, "  }}")?;
    writeln!(out, "}}")?;
  }

  Ok(out)
}
