//! Document body field names.
//!
//! Documents carry a flat JSON object body; these constants pin the field
//! schema shared by the mapper (which writes bodies) and query predicates
//! (which the store evaluates against them):
//!
//! - `instance/guid` - instance GUID
//! - `instance/type` - type name
//! - `instance/version` - version counter
//! - `instance/status` - lifecycle status
//! - `instance/statusOnDelete` - status remembered by a soft delete
//! - `instance/home` - home metadata collection id
//! - `instance/homeName` - home metadata collection name
//! - `instance/provenance` - Local or External
//! - `instance/proxyOnly` - entity proxy flag
//! - `audit/*` - audit trail fields
//! - `props/{name}` - one field per instance property
//! - `classifications` - embedded classification list
//! - `rel/endOne`, `rel/endTwo` - embedded endpoint proxies
//! - `rel/endOneGuid`, `rel/endTwoGuid` - flat endpoint GUIDs for querying

pub const GUID: &str = "instance/guid";
pub const TYPE: &str = "instance/type";
pub const VERSION: &str = "instance/version";
pub const STATUS: &str = "instance/status";
pub const STATUS_ON_DELETE: &str = "instance/statusOnDelete";
pub const HOME: &str = "instance/home";
pub const HOME_NAME: &str = "instance/homeName";
pub const PROVENANCE: &str = "instance/provenance";
pub const PROXY_ONLY: &str = "instance/proxyOnly";
pub const RE_IDENTIFIED_FROM: &str = "instance/reIdentifiedFrom";
pub const RE_TYPED_FROM: &str = "instance/reTypedFrom";

pub const CREATED_BY: &str = "audit/createdBy";
pub const CREATE_TIME: &str = "audit/createTime";
pub const UPDATED_BY: &str = "audit/updatedBy";
pub const UPDATE_TIME: &str = "audit/updateTime";
pub const MAINTAINED_BY: &str = "audit/maintainedBy";

pub const CLASSIFICATIONS: &str = "classifications";

pub const END_ONE: &str = "rel/endOne";
pub const END_TWO: &str = "rel/endTwo";
pub const END_ONE_GUID: &str = "rel/endOneGuid";
pub const END_TWO_GUID: &str = "rel/endTwoGuid";

/// Prefix for property fields.
pub const PROPS_PREFIX: &str = "props/";

/// Body field name for the named instance property.
#[inline]
pub fn property(name: &str) -> String {
    format!("{PROPS_PREFIX}{name}")
}

/// The property name encoded in a body field, if it is a property field.
#[inline]
pub fn property_name(field: &str) -> Option<&str> {
    field.strip_prefix(PROPS_PREFIX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_property_field_round_trip() {
        let field = property("qualifiedName");
        assert_eq!(field, "props/qualifiedName");
        assert_eq!(property_name(&field), Some("qualifiedName"));
        assert_eq!(property_name("instance/type"), None);
    }
}
