//! workspace_desktop_power_action resource
//!
//! A one-shot operation. Create runs the power action; nothing about it can
//! be read back from the service, so the stored state is authoritative.

use std::time::Duration;

use log::{info, warn};
use serde_json::{Value as JsonValue, json};
use vela_core::provider::{ProviderError, ProviderResult};
use vela_core::resource::{Resource, ResourceId, State, Value};

use crate::client::api_error;
use crate::jobs::wait_for_workspace_job;
use crate::provider::HandlerContext;
use crate::retry::retry_on_conflict;
use crate::utils::{attrs_to_json, remove_nil, search_i64, search_str, search_value, value_ignore_empty};

const CREATE_TIMEOUT: Duration = Duration::from_secs(20 * 60);

const ACTION_PATH: &str = "v2/{project_id}/desktops/action";

pub(crate) fn build_action_body(d: &JsonValue) -> JsonValue {
    remove_nil(json!({
        "desktop_ids": search_value("desktop_ids", d),
        "op_type": search_value("op_type", d),
        "type": value_ignore_empty(search_value("type", d)),
    }))
}

pub async fn create(ctx: &HandlerContext<'_>, resource: &Resource) -> ProviderResult<State> {
    let d = attrs_to_json(&resource.attributes);
    let body = build_action_body(&d);
    let max_retries = u32::try_from(search_i64("max_retries", &d, 0)).unwrap_or(0);
    let op_type = search_str("op_type", &d, "");

    let resp = retry_on_conflict(max_retries, ctx.config.conflict_retry_interval, || async {
        ctx.client.post(ACTION_PATH, &body).await.map_err(|e| {
            api_error(format!("error doing power action ({}) for desktops", op_type), e)
        })
    })
    .await
    .map_err(|e| e.for_resource(resource.id.clone()))?;

    let job_id = search_str("job_id", &resp, "");
    if !job_id.is_empty() {
        wait_for_workspace_job(&ctx.client, ctx.config, &job_id, None, CREATE_TIMEOUT)
            .await
            .map_err(|e| ProviderError {
                message: format!("error waiting for power action ({}) job: {}", op_type, e.message),
                ..e
            })?;
    }
    info!(
        "power action {} finished for {}.{}",
        op_type, resource.id.resource_type, resource.id.name
    );

    let identifier = uuid::Uuid::new_v4().to_string();
    let mut attributes = resource.attributes.clone();
    attributes.insert("region".to_string(), Value::String(ctx.region.clone()));
    Ok(State::existing(resource.id.clone(), attributes).with_identifier(identifier))
}

/// Return the stored state; the service keeps no record of the action
pub fn read(
    _ctx: &HandlerContext<'_>,
    id: &ResourceId,
    identifier: &str,
    prior: Option<&State>,
) -> ProviderResult<State> {
    match prior {
        Some(state) if state.exists => {
            Ok(State::existing(id.clone(), state.attributes.clone()).with_identifier(identifier))
        }
        _ => Ok(State::not_found(id.clone())),
    }
}

pub fn delete(id: &ResourceId, identifier: &str) {
    warn!(
        "{}.{} ({}) is a one-time action resource; deleting it only removes it from state",
        id.resource_type, id.name, identifier
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_body_omits_empty_type() {
        let d = json!({"desktop_ids": ["d-1", "d-2"], "op_type": "os-stop", "type": ""});
        assert_eq!(
            build_action_body(&d),
            json!({"desktop_ids": ["d-1", "d-2"], "op_type": "os-stop"})
        );

        let d = json!({"desktop_ids": ["d-1"], "op_type": "reboot", "type": "HARD"});
        assert_eq!(build_action_body(&d)["type"], "HARD");
    }
}
