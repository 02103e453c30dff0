// SPDX-License-Identifier: Apache-2.0
//! Schema registration, interning, and lookup (§3, §4.2 index field
//! declarations, §6 JSON ingestion).
//!
//! A [`Schema`] is immutable once built: all names are interned up front via
//! [`SchemaBuilder`], and every subsequent lookup is by integer id rather
//! than string compare (§5 "String interning").

use rustc_hash::FxHashMap;

use crate::error::SchemaError;
use crate::ids::{EdgeId, IndexId, PropertyId, RollupId, TypeId};
use crate::value::ValueKind;

/// One field of a declared [`IndexDef`]: either a property (with sort
/// direction) or an edge (used only at the prefix of a cross-entity index,
/// §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexField {
    /// Sort/filter on a property of the index's owning type.
    Property {
        /// The property.
        property: PropertyId,
        /// `true` for descending order.
        desc: bool,
    },
    /// Prefix on the target of an edge declared on the index's owning type.
    Edge {
        /// The edge.
        edge: EdgeId,
    },
}

/// A rollup definition (§4.3): a derived field computed at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollupDef {
    /// Number of targets of `edge`.
    Count {
        /// Source edge.
        edge: EdgeId,
    },
    /// Value of `field` on the first target of `edge`, or null.
    Traverse {
        /// Source edge.
        edge: EdgeId,
        /// Field read from the first target.
        field: PropertyId,
    },
    /// Minimum value of `index`'s leading field among nodes of this type.
    First {
        /// Source index.
        index: IndexId,
    },
    /// Maximum value of `index`'s leading field among nodes of this type.
    Last {
        /// Source index.
        index: IndexId,
    },
}

#[derive(Debug, Clone)]
struct PropertyRecord {
    owner: TypeId,
    name: String,
    kind: ValueKind,
}

#[derive(Debug, Clone)]
struct EdgeRecord {
    owner: TypeId,
    name: String,
    target: TypeId,
    reverse: EdgeId,
}

#[derive(Debug, Clone)]
struct IndexRecord {
    owner: TypeId,
    fields: Vec<IndexField>,
}

#[derive(Debug, Clone)]
struct RollupRecord {
    owner: TypeId,
    name: String,
    def: RollupDef,
}

#[derive(Debug, Clone, Default)]
struct TypeRecord {
    name: String,
    properties: Vec<PropertyId>,
    property_lookup: FxHashMap<String, PropertyId>,
    edges: Vec<EdgeId>,
    edge_lookup: FxHashMap<String, EdgeId>,
    indexes: Vec<IndexId>,
    rollups: Vec<RollupId>,
    rollup_lookup: FxHashMap<String, RollupId>,
}

/// An immutable, interned graph schema (§3).
///
/// Every lookup here is `O(1)` via the small integer ids handed out during
/// registration; name-based lookup is offered for external callers (query
/// parsing, JSON ingestion) and is the only place string comparison happens.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: Vec<TypeRecord>,
    type_lookup: FxHashMap<String, TypeId>,
    properties: Vec<PropertyRecord>,
    edges: Vec<EdgeRecord>,
    indexes: Vec<IndexRecord>,
    rollups: Vec<RollupRecord>,
}

impl Schema {
    /// Starts building a schema from scratch.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Resolves a type name to its id.
    #[must_use]
    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.type_lookup.get(name).copied()
    }

    /// Returns the declared name of `type_id`.
    #[must_use]
    pub fn type_name(&self, type_id: TypeId) -> Option<&str> {
        self.types.get(type_id.0 as usize).map(|t| t.name.as_str())
    }

    /// Resolves a property name on `type_id`.
    #[must_use]
    pub fn property_id(&self, type_id: TypeId, name: &str) -> Option<PropertyId> {
        self.types
            .get(type_id.0 as usize)
            .and_then(|t| t.property_lookup.get(name))
            .copied()
    }

    /// Returns the declared kind of `property_id`.
    #[must_use]
    pub fn property_kind(&self, property_id: PropertyId) -> Option<ValueKind> {
        self.properties.get(property_id.0 as usize).map(|p| p.kind)
    }

    /// Returns the name of `property_id`.
    #[must_use]
    pub fn property_name(&self, property_id: PropertyId) -> Option<&str> {
        self.properties.get(property_id.0 as usize).map(|p| p.name.as_str())
    }

    /// Resolves an edge name on `type_id`.
    #[must_use]
    pub fn edge_id(&self, type_id: TypeId, name: &str) -> Option<EdgeId> {
        self.types
            .get(type_id.0 as usize)
            .and_then(|t| t.edge_lookup.get(name))
            .copied()
    }

    /// Returns the name of `edge_id`.
    #[must_use]
    pub fn edge_name(&self, edge_id: EdgeId) -> Option<&str> {
        self.edges.get(edge_id.0 as usize).map(|e| e.name.as_str())
    }

    /// Returns the type that declares `edge_id`.
    #[must_use]
    pub fn edge_owner(&self, edge_id: EdgeId) -> Option<TypeId> {
        self.edges.get(edge_id.0 as usize).map(|e| e.owner)
    }

    /// Returns the target type of `edge_id`.
    #[must_use]
    pub fn edge_target(&self, edge_id: EdgeId) -> Option<TypeId> {
        self.edges.get(edge_id.0 as usize).map(|e| e.target)
    }

    /// Returns the paired reverse edge of `edge_id` (§3: every edge pairs
    /// with exactly one reverse, forming one logical bidirectional edge).
    #[must_use]
    pub fn reverse_edge(&self, edge_id: EdgeId) -> Option<EdgeId> {
        self.edges.get(edge_id.0 as usize).map(|e| e.reverse)
    }

    /// Returns every edge declared directly on `type_id` (not including
    /// reverse edges registered onto it from other types' declarations,
    /// which are themselves ordinary entries in this same list).
    #[must_use]
    pub fn edges_of(&self, type_id: TypeId) -> &[EdgeId] {
        self.types.get(type_id.0 as usize).map_or(&[], |t| &t.edges)
    }

    /// Returns every property declared on `type_id`.
    #[must_use]
    pub fn properties_of(&self, type_id: TypeId) -> &[PropertyId] {
        self.types.get(type_id.0 as usize).map_or(&[], |t| &t.properties)
    }

    /// Returns every index declared on `type_id`.
    #[must_use]
    pub fn indexes_of(&self, type_id: TypeId) -> &[IndexId] {
        self.types.get(type_id.0 as usize).map_or(&[], |t| &t.indexes)
    }

    /// Returns the field list of `index_id`.
    #[must_use]
    pub fn index_fields(&self, index_id: IndexId) -> &[IndexField] {
        self.indexes.get(index_id.0 as usize).map_or(&[], |i| i.fields.as_slice())
    }

    /// Returns the type that declares `index_id`.
    #[must_use]
    pub fn index_owner(&self, index_id: IndexId) -> Option<TypeId> {
        self.indexes.get(index_id.0 as usize).map(|i| i.owner)
    }

    /// Total number of indexes declared anywhere in the schema, i.e. the
    /// number of tables [`crate::index::IndexManager::new`] should allocate.
    #[must_use]
    pub fn index_count(&self) -> usize {
        self.indexes.len()
    }

    /// Returns every rollup declared on `type_id`.
    #[must_use]
    pub fn rollups_of(&self, type_id: TypeId) -> &[RollupId] {
        self.types.get(type_id.0 as usize).map_or(&[], |t| &t.rollups)
    }

    /// Returns the definition of `rollup_id`.
    #[must_use]
    pub fn rollup_def(&self, rollup_id: RollupId) -> Option<RollupDef> {
        self.rollups.get(rollup_id.0 as usize).map(|r| r.def)
    }

    /// Returns the declared name of `rollup_id`.
    #[must_use]
    pub fn rollup_name(&self, rollup_id: RollupId) -> Option<&str> {
        self.rollups.get(rollup_id.0 as usize).map(|r| r.name.as_str())
    }

    /// Returns every rollup anywhere in the schema that reads from `edge_id`
    /// via a [`RollupDef::Traverse`] (used to seed the rollup cache's
    /// inverted dependency index, §4.3).
    pub(crate) fn traverse_rollups_for_edge(
        &self,
        edge_id: EdgeId,
    ) -> impl Iterator<Item = (TypeId, RollupId)> + '_ {
        self.rollups.iter().enumerate().filter_map(move |(i, r)| match r.def {
            RollupDef::Traverse { edge, .. } if edge == edge_id => {
                Some((r.owner, RollupId(i as u32)))
            }
            _ => None,
        })
    }

    /// Returns every `(owner_type, edge)` pair anywhere in the schema that
    /// backs a [`RollupDef::Traverse`] rollup, regardless of which edge.
    /// Used to sweep for dependents after a property write, since the
    /// dependency cache is keyed by `(owner_type, edge, target)` and the
    /// write only knows the target (§4.3 "On target property change").
    pub(crate) fn traverse_edges(&self) -> impl Iterator<Item = (TypeId, EdgeId)> + '_ {
        self.rollups.iter().filter_map(|r| match r.def {
            RollupDef::Traverse { edge, .. } => Some((r.owner, edge)),
            _ => None,
        })
    }

    /// Parses a schema from the JSON shape described in §6 (object with a
    /// `types` array). Requires the `json` feature.
    #[cfg(feature = "json")]
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        crate::schema_json::parse(text)
    }
}

/// Incrementally constructs a [`Schema`], interning names and assigning ids
/// in registration order.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    types: Vec<TypeRecord>,
    type_lookup: FxHashMap<String, TypeId>,
    properties: Vec<PropertyRecord>,
    edges: Vec<EdgeRecord>,
    indexes: Vec<IndexRecord>,
    rollups: Vec<RollupRecord>,
}

impl SchemaBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn type_record(&self, type_id: TypeId) -> Result<&TypeRecord, SchemaError> {
        self.types
            .get(type_id.0 as usize)
            .ok_or_else(|| SchemaError::UnknownType(format!("#{}", type_id.0)))
    }

    /// Registers a new type, returning its id. Errors if `name` is already
    /// used by another type.
    pub fn add_type(&mut self, name: impl Into<String>) -> Result<TypeId, SchemaError> {
        let name = name.into();
        if self.type_lookup.contains_key(&name) {
            return Err(SchemaError::DuplicateName(name));
        }
        let id = TypeId(self.types.len() as u32);
        self.type_lookup.insert(name.clone(), id);
        self.types.push(TypeRecord {
            name,
            ..TypeRecord::default()
        });
        Ok(id)
    }

    /// Registers a property on `type_id`. Errors if `name` collides with an
    /// existing property or edge on that type.
    pub fn add_property(
        &mut self,
        type_id: TypeId,
        name: impl Into<String>,
        kind: ValueKind,
    ) -> Result<PropertyId, SchemaError> {
        self.type_record(type_id)?;
        let name = name.into();
        let taken = {
            let t = &self.types[type_id.0 as usize];
            t.property_lookup.contains_key(&name) || t.edge_lookup.contains_key(&name)
        };
        if taken {
            return Err(SchemaError::DuplicateName(name));
        }
        let id = PropertyId(self.properties.len() as u32);
        self.properties.push(PropertyRecord {
            owner: type_id,
            name: name.clone(),
            kind,
        });
        let t = &mut self.types[type_id.0 as usize];
        t.properties.push(id);
        t.property_lookup.insert(name, id);
        Ok(id)
    }

    /// Registers a directed edge `type_id.name -> target` together with its
    /// reverse `target.reverse_name -> type_id`, forming one logical
    /// bidirectional edge (§3). Returns `(forward, reverse)` ids.
    ///
    /// For a self-edge (`target == type_id`), `name` and `reverse_name` must
    /// still differ, since both are registered into the same type's edge
    /// namespace.
    pub fn add_edge(
        &mut self,
        type_id: TypeId,
        name: impl Into<String>,
        target: TypeId,
        reverse_name: impl Into<String>,
    ) -> Result<(EdgeId, EdgeId), SchemaError> {
        self.type_record(type_id)?;
        self.type_record(target)?;
        let name = name.into();
        let reverse_name = reverse_name.into();

        if type_id == target && name == reverse_name {
            return Err(SchemaError::DuplicateName(name));
        }
        {
            let t = &self.types[type_id.0 as usize];
            if t.property_lookup.contains_key(&name) || t.edge_lookup.contains_key(&name) {
                return Err(SchemaError::DuplicateName(name));
            }
        }
        {
            let t = &self.types[target.0 as usize];
            if t.property_lookup.contains_key(&reverse_name) || t.edge_lookup.contains_key(&reverse_name)
            {
                return Err(SchemaError::DuplicateName(reverse_name));
            }
        }

        let forward_id = EdgeId(self.edges.len() as u32);
        let reverse_id = EdgeId(self.edges.len() as u32 + 1);

        self.edges.push(EdgeRecord {
            owner: type_id,
            name: name.clone(),
            target,
            reverse: reverse_id,
        });
        self.edges.push(EdgeRecord {
            owner: target,
            name: reverse_name.clone(),
            target: type_id,
            reverse: forward_id,
        });

        let forward_type = &mut self.types[type_id.0 as usize];
        forward_type.edges.push(forward_id);
        forward_type.edge_lookup.insert(name, forward_id);

        let reverse_type = &mut self.types[target.0 as usize];
        reverse_type.edges.push(reverse_id);
        reverse_type.edge_lookup.insert(reverse_name, reverse_id);

        Ok((forward_id, reverse_id))
    }

    /// Registers an index on `type_id` over `fields`, in declaration order
    /// (§4.2). Edge fields are resolved against edges already declared on
    /// `type_id`; property fields against its properties.
    pub fn add_index(
        &mut self,
        type_id: TypeId,
        fields: Vec<IndexField>,
    ) -> Result<IndexId, SchemaError> {
        self.type_record(type_id)?;
        if fields.is_empty() {
            return Err(SchemaError::InvalidIndex {
                type_name: self.types[type_id.0 as usize].name.clone(),
                reason: "index must declare at least one field".to_owned(),
            });
        }
        for field in &fields {
            match *field {
                IndexField::Property { property, .. } => {
                    if self.properties[property.0 as usize].owner != type_id {
                        return Err(SchemaError::InvalidIndex {
                            type_name: self.types[type_id.0 as usize].name.clone(),
                            reason: format!("property #{} is not declared on this type", property.0),
                        });
                    }
                }
                IndexField::Edge { edge } => {
                    if self.edges[edge.0 as usize].owner != type_id {
                        return Err(SchemaError::InvalidIndex {
                            type_name: self.types[type_id.0 as usize].name.clone(),
                            reason: format!("edge #{} is not declared on this type", edge.0),
                        });
                    }
                }
            }
        }
        let id = IndexId(self.indexes.len() as u32);
        self.indexes.push(IndexRecord { owner: type_id, fields });
        self.types[type_id.0 as usize].indexes.push(id);
        Ok(id)
    }

    /// Registers a rollup named `name` on `type_id`.
    pub fn add_rollup(
        &mut self,
        type_id: TypeId,
        name: impl Into<String>,
        def: RollupDef,
    ) -> Result<RollupId, SchemaError> {
        self.type_record(type_id)?;
        let name = name.into();
        if self.types[type_id.0 as usize].rollup_lookup.contains_key(&name) {
            return Err(SchemaError::DuplicateName(name));
        }
        let owner_mismatch = match def {
            RollupDef::Count { edge } | RollupDef::Traverse { edge, .. } => {
                self.edges[edge.0 as usize].owner != type_id
            }
            RollupDef::First { index } | RollupDef::Last { index } => {
                self.indexes[index.0 as usize].owner != type_id
            }
        };
        if owner_mismatch {
            return Err(SchemaError::InvalidIndex {
                type_name: self.types[type_id.0 as usize].name.clone(),
                reason: format!("rollup {name} references a field not declared on this type"),
            });
        }
        let id = RollupId(self.rollups.len() as u32);
        self.rollups.push(RollupRecord {
            owner: type_id,
            name: name.clone(),
            def,
        });
        let t = &mut self.types[type_id.0 as usize];
        t.rollups.push(id);
        t.rollup_lookup.insert(name, id);
        Ok(id)
    }

    /// Finalizes the schema, checking that every edge's reverse pairing
    /// round-trips (an internal consistency check: `add_edge` always
    /// establishes this, so failure here indicates a builder bug rather
    /// than a caller error).
    pub fn finish(self) -> Result<Schema, SchemaError> {
        for (i, edge) in self.edges.iter().enumerate() {
            let this_id = EdgeId(i as u32);
            let Some(reverse) = self.edges.get(edge.reverse.0 as usize) else {
                return Err(SchemaError::MissingReverseEdge {
                    type_name: self.types[edge.owner.0 as usize].name.clone(),
                    edge: edge.name.clone(),
                    target: self.types[edge.target.0 as usize].name.clone(),
                });
            };
            if reverse.reverse != this_id || reverse.owner != edge.target {
                return Err(SchemaError::MissingReverseEdge {
                    type_name: self.types[edge.owner.0 as usize].name.clone(),
                    edge: edge.name.clone(),
                    target: self.types[edge.target.0 as usize].name.clone(),
                });
            }
        }
        Ok(Schema {
            types: self.types,
            type_lookup: self.type_lookup,
            properties: self.properties,
            edges: self.edges,
            indexes: self.indexes,
            rollups: self.rollups,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn user_post_schema() -> Schema {
        let mut b = Schema::builder();
        let user = b.add_type("User").unwrap();
        let post = b.add_type("Post").unwrap();
        let name = b.add_property(user, "name", ValueKind::String).unwrap();
        b.add_property(post, "title", ValueKind::String).unwrap();
        b.add_edge(user, "posts", post, "author").unwrap();
        b.add_index(user, vec![IndexField::Property { property: name, desc: false }])
            .unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn edge_declaration_creates_paired_reverse() {
        let schema = user_post_schema();
        let user = schema.type_id("User").unwrap();
        let post = schema.type_id("Post").unwrap();
        let posts = schema.edge_id(user, "posts").unwrap();
        let author = schema.edge_id(post, "author").unwrap();
        assert_eq!(schema.reverse_edge(posts), Some(author));
        assert_eq!(schema.reverse_edge(author), Some(posts));
        assert_eq!(schema.edge_target(posts), Some(post));
        assert_eq!(schema.edge_target(author), Some(user));
    }

    #[test]
    fn duplicate_type_name_rejected() {
        let mut b = Schema::builder();
        b.add_type("User").unwrap();
        assert_eq!(
            b.add_type("User"),
            Err(SchemaError::DuplicateName("User".to_owned()))
        );
    }

    #[test]
    fn property_name_colliding_with_edge_rejected() {
        let mut b = Schema::builder();
        let user = b.add_type("User").unwrap();
        let post = b.add_type("Post").unwrap();
        b.add_edge(user, "posts", post, "author").unwrap();
        let err = b.add_property(user, "posts", ValueKind::Int).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateName("posts".to_owned()));
    }

    #[test]
    fn self_edge_requires_distinct_names() {
        let mut b = Schema::builder();
        let variable = b.add_type("Variable").unwrap();
        let err = b.add_edge(variable, "children", variable, "children").unwrap_err();
        assert_eq!(err, SchemaError::DuplicateName("children".to_owned()));

        b.add_edge(variable, "children", variable, "parent").unwrap();
    }

    #[test]
    fn index_on_unrelated_property_rejected() {
        let mut b = Schema::builder();
        let user = b.add_type("User").unwrap();
        let post = b.add_type("Post").unwrap();
        let title = b.add_property(post, "title", ValueKind::String).unwrap();
        let err = b
            .add_index(user, vec![IndexField::Property { property: title, desc: false }])
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidIndex { .. }));
    }
}
