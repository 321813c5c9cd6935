/// Deep, layout-only comparison used to merge identical peripherals and clusters. Descriptions,
/// reset values and instance addresses never take part.
pub trait StructuralEq {
  fn structurally_eq(&self, other: &Self) -> bool;
}

impl<T: StructuralEq> StructuralEq for [T] {
  fn structurally_eq(&self, other: &Self) -> bool {
    self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.structurally_eq(b))
  }
}

impl<T: StructuralEq> StructuralEq for Vec<T> {
  fn structurally_eq(&self, other: &Self) -> bool {
    self.as_slice().structurally_eq(other.as_slice())
  }
}
