//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. Two
/// `Amount`s of 500 are the same amount; two ledger entries of 500 are not the
/// same entry.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
