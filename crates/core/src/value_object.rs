//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// A value object has no identity of its own; two instances with the same
/// attributes are interchangeable. A recipe line (`material`, `qty_required`)
/// is the typical example: it only exists inside its bill of materials and
/// is replaced, never edited in place.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
