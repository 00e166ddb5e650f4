//! Bidirectional translation between instances and store documents.
//!
//! Documents carry a flat body laid out per [`metagraph_store::fields`]:
//! header fields under `instance/`, audit fields under `audit/`, one
//! `props/{name}` field per property, the classification list embedded
//! whole, and relationship endpoints embedded as proxy-form entities with
//! their GUIDs mirrored flat for querying. Both directions are total for
//! well-formed input and round-trip exactly.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use metagraph_store::{fields, Document};
use metagraph_types::{
    Classification, DocRef, Entity, InstanceHeader, InstanceKind, InstanceStatus, Properties,
    Provenance, Relationship,
};

use crate::error::{RepositoryError, RepositoryResult};

/// Compute the bitemporal valid time of an instance: the latest of the
/// instance's own update time and any classification change, falling back
/// to create time, falling back to now. Point-in-time queries follow the
/// metadata's own notion of when a fact became true, not write ordering.
pub fn valid_time(header: &InstanceHeader, classifications: &[Classification]) -> DateTime<Utc> {
    let own = header.audit.update_time;
    let classification = classifications.iter().filter_map(Classification::last_change).max();
    own.into_iter()
        .chain(classification)
        .max()
        .or(header.audit.create_time)
        .unwrap_or_else(Utc::now)
}

pub fn entity_to_document(entity: &Entity) -> RepositoryResult<Document> {
    let mut body = Map::new();
    write_header(&mut body, &entity.header)?;
    body.insert(fields::PROXY_ONLY.to_string(), Value::Bool(entity.proxy_only));
    write_properties(&mut body, &entity.properties)?;
    body.insert(
        fields::CLASSIFICATIONS.to_string(),
        serde_json::to_value(&entity.classifications).map_err(to_serialization)?,
    );
    Ok(Document {
        reference: entity.reference(),
        kind: InstanceKind::Entity,
        version: entity.header.version,
        valid_time: valid_time(&entity.header, &entity.classifications),
        body: Value::Object(body),
    })
}

pub fn entity_from_document(document: &Document) -> RepositoryResult<Entity> {
    let body = object(document)?;
    if document.kind != InstanceKind::Entity {
        return Err(RepositoryError::NotFound(format!(
            "{} is not an entity",
            document.reference
        )));
    }
    let header = read_header(body)?;
    let classifications = match body.get(fields::CLASSIFICATIONS) {
        Some(value) => serde_json::from_value(value.clone()).map_err(to_serialization)?,
        None => Vec::new(),
    };
    Ok(Entity {
        header,
        properties: read_properties(body)?,
        classifications,
        proxy_only: body
            .get(fields::PROXY_ONLY)
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

pub fn relationship_to_document(relationship: &Relationship) -> RepositoryResult<Document> {
    let mut body = Map::new();
    write_header(&mut body, &relationship.header)?;
    write_properties(&mut body, &relationship.properties)?;
    body.insert(
        fields::END_ONE.to_string(),
        serde_json::to_value(&relationship.end_one).map_err(to_serialization)?,
    );
    body.insert(
        fields::END_TWO.to_string(),
        serde_json::to_value(&relationship.end_two).map_err(to_serialization)?,
    );
    body.insert(
        fields::END_ONE_GUID.to_string(),
        Value::String(relationship.end_one.header.guid.clone()),
    );
    body.insert(
        fields::END_TWO_GUID.to_string(),
        Value::String(relationship.end_two.header.guid.clone()),
    );
    Ok(Document {
        reference: relationship.reference(),
        kind: InstanceKind::Relationship,
        version: relationship.header.version,
        valid_time: valid_time(&relationship.header, &[]),
        body: Value::Object(body),
    })
}

pub fn relationship_from_document(document: &Document) -> RepositoryResult<Relationship> {
    let body = object(document)?;
    if document.kind != InstanceKind::Relationship {
        return Err(RepositoryError::NotFound(format!(
            "{} is not a relationship",
            document.reference
        )));
    }
    let header = read_header(body)?;
    let end_one = read_endpoint(body, fields::END_ONE)?;
    let end_two = read_endpoint(body, fields::END_TWO)?;
    Ok(Relationship {
        header,
        properties: read_properties(body)?,
        end_one,
        end_two,
    })
}

/// Deterministic reference for an instance kind and GUID; computable
/// without a lookup.
pub fn reference_for(kind: InstanceKind, guid: &str) -> DocRef {
    DocRef::for_kind(kind, guid)
}

// ===== BODY LAYOUT =====

fn write_header(body: &mut Map<String, Value>, header: &InstanceHeader) -> RepositoryResult<()> {
    body.insert(fields::GUID.to_string(), Value::String(header.guid.clone()));
    body.insert(fields::TYPE.to_string(), Value::String(header.type_name.clone()));
    body.insert(fields::VERSION.to_string(), Value::from(header.version));
    body.insert(fields::STATUS.to_string(), Value::String(header.status.as_str().to_string()));
    if let Some(prior) = header.status_on_delete {
        body.insert(
            fields::STATUS_ON_DELETE.to_string(),
            Value::String(prior.as_str().to_string()),
        );
    }
    body.insert(fields::HOME.to_string(), Value::String(header.home_collection.clone()));
    if let Some(name) = &header.home_collection_name {
        body.insert(fields::HOME_NAME.to_string(), Value::String(name.clone()));
    }
    body.insert(
        fields::PROVENANCE.to_string(),
        serde_json::to_value(header.provenance).map_err(to_serialization)?,
    );
    if let Some(previous) = &header.re_identified_from {
        body.insert(fields::RE_IDENTIFIED_FROM.to_string(), Value::String(previous.clone()));
    }
    if let Some(previous) = &header.re_typed_from {
        body.insert(fields::RE_TYPED_FROM.to_string(), Value::String(previous.clone()));
    }

    body.insert(fields::CREATED_BY.to_string(), Value::String(header.audit.created_by.clone()));
    if let Some(at) = header.audit.create_time {
        body.insert(fields::CREATE_TIME.to_string(), time_value(at)?);
    }
    if let Some(user) = &header.audit.updated_by {
        body.insert(fields::UPDATED_BY.to_string(), Value::String(user.clone()));
    }
    if let Some(at) = header.audit.update_time {
        body.insert(fields::UPDATE_TIME.to_string(), time_value(at)?);
    }
    body.insert(
        fields::MAINTAINED_BY.to_string(),
        serde_json::to_value(&header.audit.maintained_by).map_err(to_serialization)?,
    );
    Ok(())
}

fn read_header(body: &Map<String, Value>) -> RepositoryResult<InstanceHeader> {
    Ok(InstanceHeader {
        guid: required_string(body, fields::GUID)?,
        type_name: required_string(body, fields::TYPE)?,
        version: body
            .get(fields::VERSION)
            .and_then(Value::as_u64)
            .ok_or_else(|| missing(fields::VERSION))?,
        status: read_status(body, fields::STATUS)?
            .ok_or_else(|| missing(fields::STATUS))?,
        status_on_delete: read_status(body, fields::STATUS_ON_DELETE)?,
        home_collection: required_string(body, fields::HOME)?,
        home_collection_name: optional_string(body, fields::HOME_NAME),
        provenance: match body.get(fields::PROVENANCE) {
            Some(value) => serde_json::from_value(value.clone()).map_err(to_serialization)?,
            None => Provenance::Local,
        },
        audit: metagraph_types::AuditInfo {
            created_by: required_string(body, fields::CREATED_BY)?,
            create_time: read_time(body, fields::CREATE_TIME)?,
            updated_by: optional_string(body, fields::UPDATED_BY),
            update_time: read_time(body, fields::UPDATE_TIME)?,
            maintained_by: match body.get(fields::MAINTAINED_BY) {
                Some(value) => serde_json::from_value(value.clone()).map_err(to_serialization)?,
                None => Vec::new(),
            },
        },
        re_identified_from: optional_string(body, fields::RE_IDENTIFIED_FROM),
        re_typed_from: optional_string(body, fields::RE_TYPED_FROM),
    })
}

fn write_properties(body: &mut Map<String, Value>, properties: &Properties) -> RepositoryResult<()> {
    for (name, value) in properties {
        body.insert(
            fields::property(name),
            serde_json::to_value(value).map_err(to_serialization)?,
        );
    }
    Ok(())
}

fn read_properties(body: &Map<String, Value>) -> RepositoryResult<Properties> {
    let mut properties = Properties::new();
    for (field, value) in body {
        if let Some(name) = fields::property_name(field) {
            let value = serde_json::from_value(value.clone()).map_err(to_serialization)?;
            properties.insert(name.to_string(), value);
        }
    }
    Ok(properties)
}

fn read_endpoint(body: &Map<String, Value>, field: &str) -> RepositoryResult<Entity> {
    let value = body.get(field).ok_or_else(|| missing(field))?;
    serde_json::from_value(value.clone()).map_err(to_serialization)
}

// ===== FIELD HELPERS =====

fn object(document: &Document) -> RepositoryResult<&Map<String, Value>> {
    document.body.as_object().ok_or_else(|| {
        RepositoryError::Serialization(format!(
            "document body of {} is not an object",
            document.reference
        ))
    })
}

fn required_string(body: &Map<String, Value>, field: &str) -> RepositoryResult<String> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| missing(field))
}

fn optional_string(body: &Map<String, Value>, field: &str) -> Option<String> {
    body.get(field).and_then(Value::as_str).map(str::to_string)
}

fn read_status(
    body: &Map<String, Value>,
    field: &str,
) -> RepositoryResult<Option<InstanceStatus>> {
    let Some(value) = body.get(field).and_then(Value::as_str) else {
        return Ok(None);
    };
    parse_status(value).map(Some).ok_or_else(|| {
        RepositoryError::Serialization(format!("unknown status {value:?} in field {field}"))
    })
}

fn parse_status(value: &str) -> Option<InstanceStatus> {
    match value {
        "Proposed" => Some(InstanceStatus::Proposed),
        "Draft" => Some(InstanceStatus::Draft),
        "Prepared" => Some(InstanceStatus::Prepared),
        "Active" => Some(InstanceStatus::Active),
        "Deleted" => Some(InstanceStatus::Deleted),
        _ => None,
    }
}

fn time_value(at: DateTime<Utc>) -> RepositoryResult<Value> {
    serde_json::to_value(at).map_err(to_serialization)
}

fn read_time(body: &Map<String, Value>, field: &str) -> RepositoryResult<Option<DateTime<Utc>>> {
    match body.get(field) {
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(to_serialization),
        None => Ok(None),
    }
}

fn to_serialization(err: serde_json::Error) -> RepositoryError {
    RepositoryError::Serialization(err.to_string())
}

fn missing(field: &str) -> RepositoryError {
    RepositoryError::Serialization(format!("missing required field {field}"))
}
