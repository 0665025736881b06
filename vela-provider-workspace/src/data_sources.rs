//! Data source handlers
//!
//! Each data source builds a query from its filters, sweeps the list
//! endpoint and flattens the items. The state ID is a random UUID.

pub mod app_server_groups;
pub mod app_servers;
pub mod desktop_pool_associated_desktops;

use serde_json::{Map, Value as JsonValue};
use vela_core::resource::{Resource, State};

use crate::utils::{attrs_to_json, json_to_attrs};

/// The query's own attributes plus the computed ones, under a fresh UUID
pub(crate) fn data_source_state(
    resource: &Resource,
    region: &str,
    computed: Map<String, JsonValue>,
) -> State {
    let mut attributes = match attrs_to_json(&resource.attributes) {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    };
    attributes.extend(computed);
    attributes.insert("region".to_string(), JsonValue::String(region.to_string()));
    State::existing(
        resource.id.clone(),
        json_to_attrs(&JsonValue::Object(attributes)),
    )
    .with_identifier(uuid::Uuid::new_v4().to_string())
}

/// Query string value of an optional filter attribute
pub(crate) fn filter(attributes: &JsonValue, key: &str) -> Option<String> {
    match attributes.get(key)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Null => None,
        other => Some(other.to_string()),
    }
}
