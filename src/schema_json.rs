// SPDX-License-Identifier: Apache-2.0
//! JSON ingestion for [`crate::schema::Schema`] (§6).
//!
//! Parses the object shape `{ "types": [ ... ] }` described in §6: each type
//! has `name`, `properties`, `edges`, `indexes`, and optional `rollups`.
//! Kept in its own module (rather than folded into `schema.rs`) since it is
//! the one place in the crate that reasons about untyped JSON values instead
//! of the schema's own typed records — deliberately isolating that surface
//! the way the teacher keeps wire/text parsing out of its core data types.

use serde_json::Value as Json;

use crate::error::SchemaError;
use crate::ids::{EdgeId, IndexId, PropertyId, TypeId};
use crate::schema::{IndexField, RollupDef, Schema, SchemaBuilder};
use crate::value::ValueKind;

fn invalid(msg: impl Into<String>) -> SchemaError {
    SchemaError::InvalidDefinition(msg.into())
}

fn as_object<'a>(value: &'a Json, what: &str) -> Result<&'a serde_json::Map<String, Json>, SchemaError> {
    value.as_object().ok_or_else(|| invalid(format!("{what} must be a JSON object")))
}

fn as_array<'a>(value: &'a Json, what: &str) -> Result<&'a Vec<Json>, SchemaError> {
    value.as_array().ok_or_else(|| invalid(format!("{what} must be a JSON array")))
}

fn field_str<'a>(obj: &'a serde_json::Map<String, Json>, key: &str) -> Result<&'a str, SchemaError> {
    obj.get(key)
        .and_then(Json::as_str)
        .ok_or_else(|| invalid(format!("missing or non-string field \"{key}\"")))
}

fn parse_kind(raw: &str) -> Result<ValueKind, SchemaError> {
    match raw {
        "string" => Ok(ValueKind::String),
        "int" => Ok(ValueKind::Int),
        "number" => Ok(ValueKind::Number),
        "bool" => Ok(ValueKind::Bool),
        other => Err(invalid(format!("unknown property type \"{other}\""))),
    }
}

/// Parses `text` into a [`Schema`].
///
/// Two passes are required because edges, indexes, and rollups may
/// reference any type, not just ones declared earlier in the array: the
/// first pass registers every type and its properties, the second resolves
/// edges (which need both endpoints to already exist), and the third
/// resolves indexes and rollups (which need edges to already exist).
pub fn parse(text: &str) -> Result<Schema, SchemaError> {
    let root: Json = serde_json::from_str(text).map_err(|e| invalid(e.to_string()))?;
    let root = as_object(&root, "schema")?;
    let types = as_array(root.get("types").ok_or_else(|| invalid("missing \"types\" array"))?, "types")?;

    let mut builder = Schema::builder();
    let mut type_ids = Vec::with_capacity(types.len());
    for entry in types {
        let obj = as_object(entry, "type entry")?;
        let name = field_str(obj, "name")?;
        type_ids.push(builder.add_type(name)?);
    }

    let mut property_ids: Vec<std::collections::HashMap<String, PropertyId>> =
        vec![std::collections::HashMap::new(); types.len()];
    for (i, entry) in types.iter().enumerate() {
        let obj = as_object(entry, "type entry")?;
        let Some(props) = obj.get("properties") else { continue };
        for prop in as_array(props, "properties")? {
            let prop_obj = as_object(prop, "property entry")?;
            let name = field_str(prop_obj, "name")?;
            let kind = parse_kind(field_str(prop_obj, "type")?)?;
            let id = builder.add_property(type_ids[i], name, kind)?;
            property_ids[i].insert(name.to_owned(), id);
        }
    }

    let mut edge_ids: Vec<std::collections::HashMap<String, EdgeId>> =
        vec![std::collections::HashMap::new(); types.len()];
    for (i, entry) in types.iter().enumerate() {
        let obj = as_object(entry, "type entry")?;
        let Some(edges) = obj.get("edges") else { continue };
        for edge in as_array(edges, "edges")? {
            let edge_obj = as_object(edge, "edge entry")?;
            let name = field_str(edge_obj, "name")?;
            if edge_ids[i].contains_key(name) {
                // Already created as the reverse side of an earlier entry.
                continue;
            }
            let target_name = field_str(edge_obj, "target")?;
            let target_idx = types
                .iter()
                .position(|t| as_object(t, "type entry").ok().and_then(|o| o.get("name")).and_then(Json::as_str) == Some(target_name))
                .ok_or_else(|| SchemaError::UnknownType(target_name.to_owned()))?;
            let reverse_name = field_str(edge_obj, "reverse")?;
            let (forward, reverse) =
                builder.add_edge(type_ids[i], name, type_ids[target_idx], reverse_name)?;
            edge_ids[i].insert(name.to_owned(), forward);
            edge_ids[target_idx].insert(reverse_name.to_owned(), reverse);
        }
    }

    let mut index_ids: Vec<std::collections::HashMap<usize, IndexId>> =
        vec![std::collections::HashMap::new(); types.len()];
    for (i, entry) in types.iter().enumerate() {
        let obj = as_object(entry, "type entry")?;
        let Some(indexes) = obj.get("indexes") else { continue };
        for (idx_pos, index) in as_array(indexes, "indexes")?.iter().enumerate() {
            let index_obj = as_object(index, "index entry")?;
            let fields_json = as_array(
                index_obj.get("fields").ok_or_else(|| invalid("index entry missing \"fields\""))?,
                "index fields",
            )?;
            let mut fields = Vec::with_capacity(fields_json.len());
            for field in fields_json {
                let field_obj = as_object(field, "index field")?;
                let name = field_str(field_obj, "name")?;
                if let Some(&property) = property_ids[i].get(name) {
                    let desc = field_obj.get("direction").and_then(Json::as_str) == Some("desc");
                    fields.push(IndexField::Property { property, desc });
                } else if let Some(&edge) = edge_ids[i].get(name) {
                    fields.push(IndexField::Edge { edge });
                } else {
                    return Err(SchemaError::InvalidIndex {
                        type_name: builder_type_name(&type_ids, &types, i)?,
                        reason: format!("field \"{name}\" is neither a property nor an edge on this type"),
                    });
                }
            }
            let id = builder.add_index(type_ids[i], fields)?;
            index_ids[i].insert(idx_pos, id);
        }
    }

    for (i, entry) in types.iter().enumerate() {
        let obj = as_object(entry, "type entry")?;
        let Some(rollups) = obj.get("rollups") else { continue };
        for rollup in as_array(rollups, "rollups")? {
            let rollup_obj = as_object(rollup, "rollup entry")?;
            let name = field_str(rollup_obj, "name")?;
            let kind = field_str(rollup_obj, "kind")?;
            let def = match kind {
                "count" => RollupDef::Count {
                    edge: resolve_edge(&edge_ids[i], rollup_obj)?,
                },
                "traverse" => RollupDef::Traverse {
                    edge: resolve_edge(&edge_ids[i], rollup_obj)?,
                    field: resolve_field(&property_ids, &edge_ids, types, rollup_obj)?,
                },
                "first" | "last" => {
                    let index_pos = rollup_obj
                        .get("index")
                        .and_then(Json::as_u64)
                        .ok_or_else(|| invalid("rollup of kind first/last requires an integer \"index\""))?
                        as usize;
                    let index = *index_ids[i]
                        .get(&index_pos)
                        .ok_or_else(|| invalid(format!("rollup references unknown index {index_pos}")))?;
                    if kind == "first" {
                        RollupDef::First { index }
                    } else {
                        RollupDef::Last { index }
                    }
                }
                other => return Err(invalid(format!("unknown rollup kind \"{other}\""))),
            };
            builder.add_rollup(type_ids[i], name, def)?;
        }
    }

    builder.finish()
}

fn builder_type_name(type_ids: &[TypeId], types: &[Json], i: usize) -> Result<String, SchemaError> {
    let _ = type_ids;
    let obj = as_object(&types[i], "type entry")?;
    Ok(field_str(obj, "name")?.to_owned())
}

fn resolve_edge(
    edges: &std::collections::HashMap<String, EdgeId>,
    obj: &serde_json::Map<String, Json>,
) -> Result<EdgeId, SchemaError> {
    let name = field_str(obj, "edge")?;
    edges.get(name).copied().ok_or_else(|| invalid(format!("rollup references unknown edge \"{name}\"")))
}

fn resolve_field(
    property_ids: &[std::collections::HashMap<String, PropertyId>],
    edge_ids: &[std::collections::HashMap<String, EdgeId>],
    types: &[Json],
    obj: &serde_json::Map<String, Json>,
) -> Result<PropertyId, SchemaError> {
    let _ = edge_ids;
    let edge_name = field_str(obj, "edge")?;
    let field_name = field_str(obj, "field")?;
    let target_type_name = types.iter().find_map(|t| {
        let type_obj = as_object(t, "type entry").ok()?;
        let edges = type_obj.get("edges")?.as_array()?;
        edges.iter().find_map(|e| {
            let e = e.as_object()?;
            if e.get("name")?.as_str()? == edge_name {
                e.get("target")?.as_str().map(ToOwned::to_owned)
            } else {
                None
            }
        })
    });
    let Some(target_type_name) = target_type_name else {
        return Err(invalid(format!("rollup references unknown edge \"{edge_name}\"")));
    };
    let target_idx = types
        .iter()
        .position(|t| as_object(t, "type entry").ok().and_then(|o| o.get("name")).and_then(Json::as_str) == Some(target_type_name.as_str()))
        .ok_or_else(|| SchemaError::UnknownType(target_type_name.clone()))?;
    property_ids[target_idx]
        .get(field_name)
        .copied()
        .ok_or_else(|| invalid(format!("field \"{field_name}\" is not declared on \"{target_type_name}\"")))
}
