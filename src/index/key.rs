// SPDX-License-Identifier: Apache-2.0
//! Compound-key encoding for index entries (§4.2).
//!
//! A `CompoundKey` is the concatenation of each declared field's encoding,
//! in index-declaration order, terminated by the owning node's id. Encoding
//! is designed so plain byte-lexicographic order on the resulting `Vec<u8>`
//! matches the declared field order/direction — the B+ tree never needs to
//! know anything about `Value` or descending fields, only `Ord` on bytes.
//!
//! Fixed-width fields (`Null`, `Bool`, `Int`, `Number`, and edge-target
//! `NodeId`s) are self-delimiting by construction: their tag determines
//! their length. Variable-width `String` fields are escaped (`0x00` →
//! `0x00 0xFF`) and terminated with `0x00 0x00` so that, e.g., the two-field
//! keys `("ab", "x")` and `("a", "bx")` never collide when concatenated.
//! Descending fields are encoded by bitwise-negating their own byte range:
//! for byte sequences of a given length, negation reverses lexicographic
//! order, so ascending B+ tree traversal yields descending field order
//! without the tree itself needing a notion of direction.

use crate::btree::PrefixOrd;
use crate::ids::NodeId;
use crate::value::Value;

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_NUMBER: u8 = 0x03;
const TAG_STRING: u8 = 0x04;

/// One component of a [`CompoundKey`] under construction: a property value
/// (with direction) or an edge's target node id.
#[derive(Debug, Clone)]
pub enum KeyComponent {
    /// A property field. `desc` reverses its encoded byte order.
    Value {
        /// The field's value.
        value: Value,
        /// `true` for descending order.
        desc: bool,
    },
    /// An edge-target field, used at the prefix of cross-entity indexes.
    Edge(NodeId),
}

impl KeyComponent {
    /// Shorthand for an ascending property component.
    #[must_use]
    pub fn asc(value: Value) -> Self {
        Self::Value { value, desc: false }
    }

    /// Shorthand for a descending property component.
    #[must_use]
    pub fn desc(value: Value) -> Self {
        Self::Value { value, desc: true }
    }
}

fn encode_value(value: &Value) -> Vec<u8> {
    match value {
        Value::Null => vec![TAG_NULL],
        Value::Bool(b) => vec![TAG_BOOL, u8::from(*b)],
        Value::Int(i) => {
            let mut bytes = Vec::with_capacity(9);
            bytes.push(TAG_INT);
            let sortable = (*i as u64) ^ (1u64 << 63);
            bytes.extend_from_slice(&sortable.to_be_bytes());
            bytes
        }
        Value::Number(n) => {
            let mut bytes = Vec::with_capacity(9);
            bytes.push(TAG_NUMBER);
            let bits = n.to_bits();
            let sortable = if *n >= 0.0 { bits | (1u64 << 63) } else { !bits };
            bytes.extend_from_slice(&sortable.to_be_bytes());
            bytes
        }
        Value::String(s) => {
            let mut bytes = Vec::with_capacity(s.len() + 3);
            bytes.push(TAG_STRING);
            for &b in s.as_bytes() {
                if b == 0x00 {
                    bytes.push(0x00);
                    bytes.push(0xFF);
                } else {
                    bytes.push(b);
                }
            }
            bytes.push(0x00);
            bytes.push(0x00);
            bytes
        }
    }
}

fn encode_component(component: &KeyComponent) -> Vec<u8> {
    match component {
        KeyComponent::Value { value, desc } => {
            let mut bytes = encode_value(value);
            if *desc {
                for byte in &mut bytes {
                    *byte = !*byte;
                }
            }
            bytes
        }
        KeyComponent::Edge(target) => target.value().to_be_bytes().to_vec(),
    }
}

fn encode_components(components: &[KeyComponent]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for component in components {
        bytes.extend(encode_component(component));
    }
    bytes
}

/// An index entry key: encoded field components followed by the owning
/// node's id. Byte-lexicographic order on the wrapped bytes matches the
/// declared field order and direction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompoundKey(Vec<u8>);

impl CompoundKey {
    /// Builds the full entry key for `node_id`, from `components` in
    /// declaration order.
    #[must_use]
    pub fn new(components: &[KeyComponent], node_id: NodeId) -> Self {
        let mut bytes = encode_components(components);
        bytes.extend_from_slice(&node_id.value().to_be_bytes());
        Self(bytes)
    }

    /// Builds a scan prefix from a leading subset of `components` (no
    /// trailing node id), used to bound a `range`/`prefix_scan` lookup.
    #[must_use]
    pub fn prefix(components: &[KeyComponent]) -> Self {
        Self(encode_components(components))
    }

    /// Returns a key that is strictly greater than any full key sharing this
    /// prefix, usable as the exclusive upper bound of a `range` scan.
    #[must_use]
    pub fn prefix_upper_bound(components: &[KeyComponent]) -> Self {
        let mut bytes = encode_components(components);
        bytes.push(0xFF);
        Self(bytes)
    }
}

impl PrefixOrd for CompoundKey {
    fn has_prefix(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn key(components: &[KeyComponent], id: u64) -> CompoundKey {
        CompoundKey::new(components, NodeId(id))
    }

    #[test]
    fn ascending_string_field_orders_lexicographically() {
        let a = key(&[KeyComponent::asc(Value::String("alice".into()))], 1);
        let b = key(&[KeyComponent::asc(Value::String("bob".into()))], 2);
        assert!(a < b);
    }

    #[test]
    fn descending_field_reverses_order() {
        let a = key(&[KeyComponent::desc(Value::Int(1))], 1);
        let b = key(&[KeyComponent::desc(Value::Int(2))], 2);
        assert!(a > b, "descending field: smaller value sorts later");
    }

    #[test]
    fn null_sorts_before_non_null_in_key_position() {
        let a = key(&[KeyComponent::asc(Value::Null)], 1);
        let b = key(&[KeyComponent::asc(Value::Int(i64::MIN))], 2);
        assert!(a < b);
    }

    #[test]
    fn adjacent_string_fields_do_not_collide() {
        let ab_x = key(
            &[
                KeyComponent::asc(Value::String("ab".into())),
                KeyComponent::asc(Value::String("x".into())),
            ],
            1,
        );
        let a_bx = key(
            &[
                KeyComponent::asc(Value::String("a".into())),
                KeyComponent::asc(Value::String("bx".into())),
            ],
            2,
        );
        assert_ne!(ab_x, a_bx);
    }

    #[test]
    fn negative_and_positive_ints_order_correctly() {
        let neg = key(&[KeyComponent::asc(Value::Int(-5))], 1);
        let pos = key(&[KeyComponent::asc(Value::Int(5))], 2);
        assert!(neg < pos);
    }

    #[test]
    fn edge_prefix_is_a_true_byte_prefix_of_full_keys_under_it() {
        let target = NodeId(42);
        let prefix = CompoundKey::prefix(&[KeyComponent::Edge(target)]);
        let full = CompoundKey::new(
            &[KeyComponent::Edge(target), KeyComponent::desc(Value::Int(7))],
            NodeId(99),
        );
        assert!(full.has_prefix(&prefix));

        let other = CompoundKey::prefix(&[KeyComponent::Edge(NodeId(43))]);
        assert!(!full.has_prefix(&other));
    }

    #[test]
    fn prefix_upper_bound_excludes_full_keys_sharing_prefix() {
        let target = NodeId(42);
        let lo = CompoundKey::prefix(&[KeyComponent::Edge(target)]);
        let hi = CompoundKey::prefix_upper_bound(&[KeyComponent::Edge(target)]);
        let inside = CompoundKey::new(&[KeyComponent::Edge(target)], NodeId(1));
        let outside = CompoundKey::new(&[KeyComponent::Edge(NodeId(43))], NodeId(1));
        assert!(inside >= lo && inside < hi);
        assert!(outside >= hi);
    }
}
