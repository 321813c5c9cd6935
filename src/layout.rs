use log::debug;

use crate::error::{StructgenError, StructgenResult};
use crate::registry::{Field, FieldRole};

/// Synthesizes the padding fields that close the gap between a struct's running size and the
/// offset a field declares. Owned per struct so padding names are numbered per struct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaddingManager {
  next_index: usize,
}
impl PaddingManager {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns the padding fields to insert before `field_name` so that a struct currently `size`
  /// bytes long reaches `expected_offset`. Word-sized padding comes first, then the remaining
  /// bytes.
  pub fn fill(
    &mut self,
    struct_name: &str,
    field_name: &str,
    size: usize,
    expected_offset: Option<usize>,
  ) -> StructgenResult<Vec<Field>> {
    let expected = match expected_offset {
      Some(e) => e,
      None => return Ok(Vec::new()),
    };

    if expected < size {
      return Err(StructgenError::OffsetRegression {
        name: format!("{}.{}", struct_name, field_name),
        expected,
        current: size,
      });
    }

    let gap = expected - size;
    let mut padding = Vec::new();

    let (words, bytes) = (gap / 4, gap % 4);
    if words > 0 {
      padding.push(self.padding_field("uint32", words));
    }
    if bytes > 0 {
      padding.push(self.padding_field("uint8", bytes));
    }

    if gap > 0 {
      debug!(
        "{}: {} bytes of padding before '{}'",
        struct_name, gap, field_name
      );
    }

    Ok(padding)
  }

  fn padding_field(&mut self, type_name: &str, count: usize) -> Field {
    let name = format!("reserved_padding{}", self.next_index);
    self.next_index += 1;

    Field {
      name,
      type_name: type_name.to_owned(),
      array_length: if count > 1 { Some(count) } else { None },
      description: None,
      role: FieldRole::Padding,
    }
  }
}
