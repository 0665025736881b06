//! workspace_desktop_pool resource
//!
//! Pool creation only returns a job ID, so the pool is found by name once it
//! settles. The service returns data volumes unordered; the configured order
//! is kept in `data_volumes_order` and used to restore it on read.

use std::time::Duration;

use log::{debug, warn};
use serde_json::{Map, Value as JsonValue, json};
use vela_core::provider::{ProviderError, ProviderResult};
use vela_core::resource::{Resource, ResourceId, State};

use crate::client::{api_error, check_deleted, convert_expected_error, error_code_of};
use crate::jobs::{wait_for_pool_job, wait_for_workspace_job};
use crate::pagination::list_until_empty;
use crate::provider::HandlerContext;
use crate::resources::{carry_over, has_change, job_id_of, state_from};
use crate::retry::retry_while;
use crate::utils::{
    attrs_to_json, expand_tags, flatten_tags_to_map, json_to_attrs, path_search, pick,
    remove_nil, search_array, search_bool, search_i64, search_str, search_value, value_ignore_empty,
};
use crate::wait::StateWaiter;

const CREATE_TIMEOUT: Duration = Duration::from_secs(20 * 60);
const UPDATE_TIMEOUT: Duration = Duration::from_secs(20 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(20 * 60);

const POOLS_PATH: &str = "v2/{project_id}/desktop-pools";
/// Raised while desktops in the pool are still busy with another operation
const OPERATION_CONFLICT_CODE: &str = "WKS.00010032";
/// Returned with HTTP 400 for a pool that does not exist
const POOL_NOT_FOUND_CODE: &str = "WKS.0001";

const AUTHORIZED_OBJECT_FIELDS: &[&str] = &["object_id", "object_type", "object_name", "user_group"];

fn pool_path(pool_id: &str) -> String {
    format!("{}/{}", POOLS_PATH, pool_id)
}

// =============================================================================
// Request Bodies
// =============================================================================

fn volume_type_and_size(volume: &JsonValue) -> JsonValue {
    json!({
        "type": search_value("type", volume),
        "size": search_value("size", volume),
    })
}

fn build_autoscale_policy(d: &JsonValue) -> JsonValue {
    let Some(policy) = path_search("autoscale_policy[0]", d) else {
        return json!({});
    };
    remove_nil(json!({
        "autoscale_type": value_ignore_empty(search_value("autoscale_type", policy)),
        "max_auto_created": value_ignore_empty(search_value("max_auto_created", policy)),
        "min_idle": value_ignore_empty(search_value("min_idle", policy)),
        "once_auto_created": value_ignore_empty(search_value("once_auto_created", policy)),
    }))
}

fn tags_body(d: &JsonValue) -> JsonValue {
    value_ignore_empty(expand_tags(d.get("tags").unwrap_or(&JsonValue::Null)))
}

pub(crate) fn build_create_body(d: &JsonValue, enterprise_project_id: Option<String>) -> JsonValue {
    let data_volumes: Vec<JsonValue> = search_array("data_volumes", d)
        .iter()
        .map(volume_type_and_size)
        .collect();
    let security_groups: Vec<JsonValue> = search_array("security_groups", d)
        .iter()
        .map(|sg| json!({"id": search_value("id", sg)}))
        .collect();
    let authorized_objects: Vec<JsonValue> = search_array("authorized_objects", d)
        .iter()
        .map(|o| pick(o, AUTHORIZED_OBJECT_FIELDS))
        .collect();

    remove_nil(json!({
        "name": search_value("name", d),
        "type": search_value("type", d),
        "size": search_value("size", d),
        "product_id": search_value("product_id", d),
        "image_type": search_value("image_type", d),
        "image_id": search_value("image_id", d),
        "root_volume": volume_type_and_size(path_search("root_volume[0]", d).unwrap_or(&JsonValue::Null)),
        "subnet_ids": search_value("subnet_ids", d),
        "vpc_id": value_ignore_empty(search_value("vpc_id", d)),
        "security_groups": value_ignore_empty(JsonValue::Array(security_groups)),
        "availability_zone": value_ignore_empty(search_value("availability_zone", d)),
        "data_volumes": value_ignore_empty(JsonValue::Array(data_volumes)),
        "authorized_objects": value_ignore_empty(JsonValue::Array(authorized_objects)),
        "disconnected_retention_period": value_ignore_empty(search_value("disconnected_retention_period", d)),
        "enable_autoscale": search_bool("enable_autoscale", d, false),
        "autoscale_policy": build_autoscale_policy(d),
        "desktop_name_policy_id": value_ignore_empty(search_value("desktop_name_policy_id", d)),
        "ou_name": value_ignore_empty(search_value("ou_name", d)),
        "tags": tags_body(d),
        "enterprise_project_id": enterprise_project_id.filter(|e| !e.is_empty()),
        "description": value_ignore_empty(search_value("description", d)),
    }))
}

/// PUT body for the in-place fields. Text fields are sent even when empty
/// so they can be cleared.
pub(crate) fn build_update_body(d: &JsonValue, name_changed: bool) -> JsonValue {
    let mut body = remove_nil(json!({
        "availability_zone": search_str("availability_zone", d, ""),
        "disconnected_retention_period": value_ignore_empty(search_value("disconnected_retention_period", d)),
        "enable_autoscale": search_bool("enable_autoscale", d, false),
        "ou_name": search_str("ou_name", d, ""),
        "desktop_name_policy_id": search_str("desktop_name_policy_id", d, ""),
        "tags": tags_body(d),
        "description": search_str("description", d, ""),
        "in_maintenance_mode": search_bool("in_maintenance_mode", d, false),
    }));
    if let Some(obj) = body.as_object_mut() {
        obj.insert("autoscale_policy".into(), build_autoscale_policy(d));
        if name_changed {
            obj.insert("name".into(), search_value("name", d));
        }
    }
    body
}

/// `data_volumes` as configured, recorded to restore the order on read
fn data_volumes_order(d: &JsonValue) -> JsonValue {
    JsonValue::Array(
        search_array("data_volumes", d)
            .iter()
            .map(volume_type_and_size)
            .collect(),
    )
}

// =============================================================================
// Data Volumes
// =============================================================================

fn find_volume(volumes: &[JsonValue], size: i64, volume_type: &str) -> Option<usize> {
    volumes.iter().position(|v| {
        search_i64("size", v, 0) == size && search_str("type", v, "") == volume_type
    })
}

/// Reorder remote volumes to follow `order`; unmatched volumes go last
pub(crate) fn order_data_volumes(volumes: &[JsonValue], order: &[JsonValue]) -> Vec<JsonValue> {
    let mut remaining = volumes.to_vec();
    let mut sorted = Vec::with_capacity(volumes.len());
    for origin in order {
        if let Some(index) = find_volume(
            &remaining,
            search_i64("size", origin, 0),
            &search_str("type", origin, ""),
        ) {
            sorted.push(remaining.remove(index));
        }
    }
    sorted.extend(remaining);
    sorted
}

/// Volumes to add (configured but not present) and to remove (present but
/// no longer configured), matched by size and type
pub(crate) fn data_volumes_diff(
    old: &[JsonValue],
    new: &[JsonValue],
) -> (Vec<JsonValue>, Vec<JsonValue>) {
    let mut to_add = new.to_vec();
    let mut to_remove = Vec::new();
    for volume in old {
        match find_volume(
            &to_add,
            search_i64("size", volume, 0),
            &search_str("type", volume, ""),
        ) {
            Some(index) => {
                to_add.remove(index);
            }
            None => to_remove.push(volume.clone()),
        }
    }
    (to_add, to_remove)
}

/// Volume changes to apply, or `None` when `data_volumes` is not configured
/// and the pool volumes are left alone
pub(crate) fn data_volume_changes(
    old: &JsonValue,
    new: &JsonValue,
) -> Option<(Vec<JsonValue>, Vec<JsonValue>)> {
    let configured = new.get("data_volumes").filter(|v| !v.is_null())?;
    let configured = configured.as_array().map(Vec::as_slice).unwrap_or_default();
    Some(data_volumes_diff(search_array("data_volumes", old), configured))
}

fn flatten_data_volumes(volumes: &[JsonValue], order: &[JsonValue]) -> JsonValue {
    if volumes.is_empty() {
        return JsonValue::Null;
    }
    JsonValue::Array(
        order_data_volumes(volumes, order)
            .iter()
            .map(|v| pick(v, &["type", "size", "id"]))
            .collect(),
    )
}

// =============================================================================
// Flatten
// =============================================================================

/// `autoscale_policy` block, or null for an empty policy. Some regions still
/// return `once_auto_created` after the policy is removed.
pub(crate) fn flatten_autoscale_policy(policy: Option<&JsonValue>) -> JsonValue {
    let Some(object) = policy.and_then(|p| p.as_object()) else {
        return JsonValue::Null;
    };
    if object.is_empty() || (object.len() == 1 && object.contains_key("once_auto_created")) {
        return JsonValue::Null;
    }
    json!([pick(
        &JsonValue::Object(object.clone()),
        &["autoscale_type", "max_auto_created", "min_idle", "once_auto_created"]
    )])
}

fn flatten_product(product: Option<&JsonValue>) -> JsonValue {
    let Some(product) = product else {
        return JsonValue::Null;
    };
    json!([{
        "flavor_id": search_value("flavor_id", product),
        "type": search_value("type", product),
        "cpu": search_value("cpu", product),
        "memory": search_value("memory", product),
        "descriptions": search_value("descriptions", product),
        "charging_mode": search_value("charge_mode", product),
    }])
}

fn block_list(items: &[JsonValue], fields: &[&str]) -> JsonValue {
    if items.is_empty() {
        return JsonValue::Null;
    }
    JsonValue::Array(items.iter().map(|i| pick(i, fields)).collect())
}

pub(crate) fn flatten_pool(pool: &JsonValue, order: &[JsonValue]) -> Map<String, JsonValue> {
    let mut attrs = Map::new();
    for key in [
        "name",
        "type",
        "image_id",
        "availability_zone",
        "disconnected_retention_period",
        "enable_autoscale",
        "desktop_name_policy_id",
        "enterprise_project_id",
        "description",
        "in_maintenance_mode",
        "status",
        "created_time",
        "desktop_used",
        "image_name",
        "image_os_type",
        "image_os_version",
        "image_os_platform",
    ] {
        attrs.insert(key.into(), search_value(key, pool));
    }
    attrs.insert("size".into(), search_value("desktop_count", pool));
    attrs.insert("product_id".into(), search_value("product.product_id", pool));
    attrs.insert(
        "root_volume".into(),
        match path_search("root_volume", pool) {
            Some(volume) => json!([pick(volume, &["type", "size", "id"])]),
            None => JsonValue::Null,
        },
    );
    attrs.insert(
        "subnet_ids".into(),
        match path_search("subnet_id", pool) {
            Some(subnet) => json!([subnet]),
            None => JsonValue::Null,
        },
    );
    attrs.insert(
        "security_groups".into(),
        block_list(search_array("security_groups", pool), &["id"]),
    );
    attrs.insert(
        "data_volumes".into(),
        flatten_data_volumes(search_array("data_volumes", pool), order),
    );
    attrs.insert(
        "autoscale_policy".into(),
        flatten_autoscale_policy(path_search("autoscale_policy", pool)),
    );
    attrs.insert("product".into(), flatten_product(path_search("product", pool)));
    attrs.insert(
        "tags".into(),
        flatten_tags_to_map(path_search("tags", pool).unwrap_or(&JsonValue::Null)),
    );
    attrs
}

// =============================================================================
// Remote Calls
// =============================================================================

async fn get_pool(ctx: &HandlerContext<'_>, pool_id: &str) -> ProviderResult<JsonValue> {
    ctx.client
        .get(&pool_path(pool_id))
        .await
        .map_err(|e| convert_expected_error(e, 400, "error_code", &[POOL_NOT_FOUND_CODE]))
}

/// The pool with exactly this name; the `name` filter is a fuzzy match
async fn get_pool_by_name(ctx: &HandlerContext<'_>, name: &str) -> ProviderResult<JsonValue> {
    let path = format!("{}?name={}", POOLS_PATH, urlencoding::encode(name));
    let pools = list_until_empty(&ctx.client, &path, "desktop_pools")
        .await
        .map_err(|e| api_error("error retrieving desktop pools", e))?;
    pools
        .into_iter()
        .find(|p| search_str("name", p, "") == name)
        .ok_or_else(|| ProviderError::not_found(format!("desktop pool ({}) not found", name)))
}

async fn list_pool_desktops(ctx: &HandlerContext<'_>, pool_id: &str) -> ProviderResult<Vec<JsonValue>> {
    let path = format!(
        "v2/{{project_id}}/desktops?pool_id={}",
        urlencoding::encode(pool_id)
    );
    list_until_empty(&ctx.client, &path, "desktops")
        .await
        .map_err(|e| api_error("error retrieving desktops under the desktop pool", e))
}

async fn list_authorized_objects(ctx: &HandlerContext<'_>, pool_id: &str) -> ProviderResult<Vec<JsonValue>> {
    let path = format!("{}/users?limit=100", pool_path(pool_id));
    list_until_empty(&ctx.client, &path, "objects")
        .await
        .map_err(|e| api_error("error retrieving authorized objects", e))
}

async fn put_pool(ctx: &HandlerContext<'_>, pool_id: &str, body: &JsonValue) -> ProviderResult<()> {
    ctx.client
        .put(&pool_path(pool_id), body)
        .await
        .map_err(|e| api_error(format!("error updating desktop pool ({})", pool_id), e))?;
    Ok(())
}

fn is_operation_conflict(err: &ProviderError) -> bool {
    err.is_conflict() && error_code_of(err) == Some(OPERATION_CONFLICT_CODE)
}

/// POST while desktops in the pool are busy, then wait for the returned job
async fn post_pool_job(
    ctx: &HandlerContext<'_>,
    path: &str,
    body: &JsonValue,
    context: &str,
) -> ProviderResult<()> {
    let resp = retry_while(
        UPDATE_TIMEOUT,
        ctx.config.wait_duration(Duration::from_secs(20)),
        is_operation_conflict,
        || async {
            ctx.client
                .post(path, body)
                .await
                .map_err(|e| api_error(context, e))
        },
    )
    .await?;
    let job_id = job_id_of(&resp)?;
    wait_for_pool_job(&ctx.client, ctx.config, &job_id, UPDATE_TIMEOUT).await
}

async fn wait_for_steady(ctx: &HandlerContext<'_>, name: &str) -> ProviderResult<String> {
    let waiter = StateWaiter::new(&["PENDING"], &["COMPLETED"], CREATE_TIMEOUT)
        .with_delay(Duration::from_secs(10))
        .with_poll_interval(Duration::from_secs(15))
        .for_config(ctx.config);
    let pool = waiter
        .wait(|| async {
            let pool = get_pool_by_name(ctx, name).await?;
            match search_str("status", &pool, "").as_str() {
                "STEADY" => Ok((Some(pool), "COMPLETED".to_string())),
                "ERROR" => Err(ProviderError::new("unexpect status (ERROR)")),
                _ => Ok((Some(pool), "PENDING".to_string())),
            }
        })
        .await
        .map_err(|e| {
            ProviderError::new(format!(
                "error waiting for the creation desktop pool ({}) to complete: {}",
                name, e
            ))
            .with_kind(e.kind)
        })?;
    let pool_id = pool.map(|p| search_str("id", &p, "")).unwrap_or_default();
    if pool_id.is_empty() {
        return Err(ProviderError::new("unable to find desktop pool ID from API response"));
    }
    Ok(pool_id)
}

/// Adding volumes requires every desktop in the pool to be running
async fn wait_for_desktops_active(ctx: &HandlerContext<'_>, pool_id: &str) -> ProviderResult<()> {
    let waiter = StateWaiter::new(&["PENDING"], &["COMPLETED"], UPDATE_TIMEOUT)
        .with_delay(Duration::from_secs(5))
        .with_poll_interval(Duration::from_secs(20))
        .for_config(ctx.config);
    waiter
        .wait(|| async {
            let desktops = list_pool_desktops(ctx, pool_id).await?;
            for desktop in &desktops {
                match search_str("status", desktop, "").as_str() {
                    "ACTIVE" => {}
                    "ERROR" => return Err(ProviderError::new("unexpect status: ERROR")),
                    _ => return Ok((None, "PENDING".to_string())),
                }
            }
            Ok((None, "COMPLETED".to_string()))
        })
        .await?;
    Ok(())
}

async fn update_data_volumes(
    ctx: &HandlerContext<'_>,
    pool_id: &str,
    old: &JsonValue,
    new: &JsonValue,
) -> ProviderResult<()> {
    let Some((to_add, to_remove)) = data_volume_changes(old, new) else {
        debug!("data volumes not configured, leaving pool ({}) volumes unchanged", pool_id);
        return Ok(());
    };
    debug!("data volumes to add: {:?}, to remove: {:?}", to_add, to_remove);

    if !to_remove.is_empty() {
        let volumes: Vec<JsonValue> = to_remove
            .iter()
            .map(|v| pick(v, &["id", "type", "size"]))
            .collect();
        post_pool_job(
            ctx,
            &format!("{}/volumes/batch-delete", pool_path(pool_id)),
            &json!({"volumes": volumes}),
            "error removing data volumes of the desktop pool",
        )
        .await?;
    }

    if !to_add.is_empty() {
        wait_for_desktops_active(ctx, pool_id).await?;
        let volumes: Vec<JsonValue> = to_add.iter().map(volume_type_and_size).collect();
        let resp = ctx
            .client
            .post(
                &format!("{}/volumes/batch-add", pool_path(pool_id)),
                &json!({"volumes": volumes}),
            )
            .await
            .map_err(|e| api_error("error adding data volumes of the desktop pool", e))?;
        let job_id = job_id_of(&resp)?;
        wait_for_pool_job(&ctx.client, ctx.config, &job_id, UPDATE_TIMEOUT).await?;
    }
    Ok(())
}

/// Authorized objects present in `a` but not in `b`
fn object_difference(a: &JsonValue, b: &JsonValue) -> Vec<JsonValue> {
    let others: Vec<JsonValue> = search_array("authorized_objects", b)
        .iter()
        .map(|o| pick(o, AUTHORIZED_OBJECT_FIELDS))
        .collect();
    search_array("authorized_objects", a)
        .iter()
        .map(|o| pick(o, AUTHORIZED_OBJECT_FIELDS))
        .filter(|o| !others.contains(o))
        .collect()
}

async fn update_authorized_objects(
    ctx: &HandlerContext<'_>,
    pool_id: &str,
    old: &JsonValue,
    new: &JsonValue,
) -> ProviderResult<()> {
    let path = format!("{}/users", pool_path(pool_id));
    for (action, objects) in [
        ("REMOVE", object_difference(old, new)),
        ("ADD", object_difference(new, old)),
    ] {
        if objects.is_empty() {
            continue;
        }
        ctx.client
            .post(&path, &json!({"action": action, "objects": objects}))
            .await
            .map_err(|e| api_error(format!("error updating authorized objects ({})", action), e))?;
    }
    Ok(())
}

fn desired_state(id: &ResourceId, d: &JsonValue) -> State {
    let mut desired = d.clone();
    if let Some(obj) = desired.as_object_mut() {
        obj.insert("data_volumes_order".into(), data_volumes_order(d));
    }
    State::existing(id.clone(), json_to_attrs(&desired))
}

// =============================================================================
// Lifecycle
// =============================================================================

pub async fn create(ctx: &HandlerContext<'_>, resource: &Resource) -> ProviderResult<State> {
    let d = attrs_to_json(&resource.attributes);
    let body = build_create_body(&d, ctx.config.enterprise_project_for(resource));
    let resp = ctx
        .client
        .post(POOLS_PATH, &body)
        .await
        .map_err(|e| api_error("error creating desktop pool", e))?;
    let job_id = job_id_of(&resp)?;

    let name = search_str("name", &d, "");
    let pool_id = wait_for_steady(ctx, &name).await?;

    // A steady pool may still be creating its desktops
    wait_for_workspace_job(&ctx.client, ctx.config, &job_id, Some(&pool_id), CREATE_TIMEOUT).await?;

    if search_bool("in_maintenance_mode", &d, false) {
        put_pool(ctx, &pool_id, &json!({"in_maintenance_mode": true}))
            .await
            .map_err(|e| ProviderError {
                message: format!("error enabling maintenance mode: {}", e.message),
                ..e
            })?;
    }

    read(ctx, &resource.id, &pool_id, Some(&desired_state(&resource.id, &d))).await
}

pub async fn read(
    ctx: &HandlerContext<'_>,
    id: &ResourceId,
    identifier: &str,
    prior: Option<&State>,
) -> ProviderResult<State> {
    let prior = prior
        .map(|s| attrs_to_json(&s.attributes))
        .unwrap_or(JsonValue::Null);

    let pool = match get_pool(ctx, identifier).await {
        Ok(pool) => pool,
        Err(e) => return check_deleted(id, e),
    };
    let mut attrs = flatten_pool(&pool, search_array("data_volumes_order", &prior));

    // The users API is not online in every region
    let objects = match list_authorized_objects(ctx, identifier).await {
        Ok(objects) => objects,
        Err(e) => {
            warn!(
                "error retrieving associated users under desktop pool ({}): {}",
                identifier, e
            );
            Vec::new()
        }
    };
    attrs.insert(
        "authorized_objects".into(),
        block_list(&objects, AUTHORIZED_OBJECT_FIELDS),
    );

    carry_over(&mut attrs, &prior, &["data_volumes_order", "ou_name"]);
    Ok(state_from(id, identifier, &ctx.region, attrs))
}

pub async fn update(
    ctx: &HandlerContext<'_>,
    id: &ResourceId,
    identifier: &str,
    from: &State,
    to: &Resource,
) -> ProviderResult<State> {
    let old = attrs_to_json(&from.attributes);
    let new = attrs_to_json(&to.attributes);

    if has_change(
        &old,
        &new,
        &[
            "name",
            "availability_zone",
            "disconnected_retention_period",
            "enable_autoscale",
            "autoscale_policy",
            "ou_name",
            "desktop_name_policy_id",
            "tags",
            "description",
            "in_maintenance_mode",
        ],
    ) {
        let body = build_update_body(&new, has_change(&old, &new, &["name"]));
        put_pool(ctx, identifier, &body).await?;
    }

    if has_change(&old, &new, &["data_volumes"]) {
        update_data_volumes(ctx, identifier, &old, &new).await?;
    }

    if has_change(&old, &new, &["product_id"]) {
        let body = json!({
            "product_id": search_str("product_id", &new, ""),
            "mode": "STOP_DESKTOP",
        });
        post_pool_job(
            ctx,
            &format!("{}/resize", pool_path(identifier)),
            &body,
            &format!("error updating product ID of the desktop pool ({})", identifier),
        )
        .await?;
    }

    if has_change(&old, &new, &["authorized_objects"]) {
        update_authorized_objects(ctx, identifier, &old, &new).await?;
    }

    read(ctx, id, identifier, Some(&desired_state(id, &new))).await
}

pub async fn delete(
    ctx: &HandlerContext<'_>,
    id: &ResourceId,
    identifier: &str,
    _prior: &State,
) -> ProviderResult<()> {
    let pool = match get_pool(ctx, identifier).await {
        Ok(pool) => pool,
        Err(e) => return check_deleted(id, e).map(|_| ()),
    };

    // Automatic creation must be off before the desktops can go
    if search_bool("enable_autoscale", &pool, false) {
        put_pool(ctx, identifier, &json!({"enable_autoscale": false}))
            .await
            .map_err(|e| ProviderError {
                message: format!("error disabling the automatic creation function: {}", e.message),
                ..e
            })?;
    }

    let desktops = list_pool_desktops(ctx, identifier).await?;
    let desktop_ids: Vec<JsonValue> = desktops
        .iter()
        .filter_map(|desktop| path_search("desktop_id", desktop).cloned())
        .collect();
    if !desktop_ids.is_empty() {
        let resp = ctx
            .client
            .post(
                "v2/{project_id}/desktops/batch-delete",
                &json!({"desktop_ids": desktop_ids}),
            )
            .await
            .map_err(|e| {
                api_error(
                    format!("error deleting desktops under desktop pool ({})", identifier),
                    e,
                )
            })?;
        let job_id = search_str("job_id", &resp, "");
        wait_for_workspace_job(&ctx.client, ctx.config, &job_id, None, DELETE_TIMEOUT).await?;
    }

    ctx.client
        .delete(&pool_path(identifier))
        .await
        .map_err(|e| api_error(format!("error deleting desktop pool ({})", identifier), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volumes(specs: &[(&str, i64, &str)]) -> Vec<JsonValue> {
        specs
            .iter()
            .map(|(t, s, id)| json!({"type": t, "size": s, "id": id}))
            .collect()
    }

    #[test]
    fn volumes_follow_configured_order() {
        let remote = volumes(&[("SSD", 20, "a"), ("SAS", 50, "b"), ("SSD", 10, "c")]);
        let order = vec![json!({"type": "SAS", "size": 50}), json!({"type": "SSD", "size": 20})];
        let sorted = order_data_volumes(&remote, &order);
        let ids: Vec<&str> = sorted.iter().map(|v| v["id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["b", "a", "c"]);
    }

    #[test]
    fn duplicate_volumes_match_once() {
        let remote = volumes(&[("SSD", 20, "a"), ("SSD", 20, "b")]);
        let order = vec![json!({"type": "SSD", "size": 20})];
        let sorted = order_data_volumes(&remote, &order);
        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted[0]["id"], "a");
        assert_eq!(order_data_volumes(&remote, &[]), remote);
    }

    #[test]
    fn diff_matches_by_size_and_type() {
        let old = volumes(&[("SSD", 20, "a"), ("SAS", 50, "b")]);
        let new = vec![json!({"type": "SAS", "size": 50}), json!({"type": "SSD", "size": 40})];
        let (to_add, to_remove) = data_volumes_diff(&old, &new);
        assert_eq!(to_add, vec![json!({"type": "SSD", "size": 40})]);
        assert_eq!(to_remove.len(), 1);
        assert_eq!(to_remove[0]["id"], "a");
    }

    #[test]
    fn omitted_volumes_are_left_alone() {
        let old = json!({
            "name": "pool",
            "data_volumes": volumes(&[("SSD", 20, "a"), ("SAS", 50, "b")]),
        });
        let new = json!({"name": "pool"});
        assert!(has_change(&old, &new, &["data_volumes"]));
        assert_eq!(data_volume_changes(&old, &new), None);
        assert_eq!(
            data_volume_changes(&old, &json!({"name": "pool", "data_volumes": null})),
            None
        );

        let (to_add, to_remove) =
            data_volume_changes(&old, &json!({"data_volumes": []})).unwrap();
        assert!(to_add.is_empty());
        assert_eq!(to_remove.len(), 2);
    }

    #[test]
    fn create_body_shape() {
        let d = json!({
            "name": "pool",
            "type": "DYNAMIC",
            "size": 2,
            "product_id": "p-1",
            "image_type": "gold",
            "image_id": "img-1",
            "root_volume": [{"type": "SAS", "size": 80}],
            "subnet_ids": ["subnet-1"],
            "security_groups": [{"id": "sg-1"}],
            "data_volumes": [{"type": "SSD", "size": 20}],
            "tags": {"k": "v"}
        });
        let body = build_create_body(&d, None);
        assert_eq!(body["root_volume"], json!({"type": "SAS", "size": 80}));
        assert_eq!(body["security_groups"], json!([{"id": "sg-1"}]));
        assert_eq!(body["data_volumes"], json!([{"type": "SSD", "size": 20}]));
        assert_eq!(body["autoscale_policy"], json!({}));
        assert_eq!(body["enable_autoscale"], false);
        assert_eq!(body["tags"], json!([{"key": "k", "value": "v"}]));
        assert!(body.get("authorized_objects").is_none());
        assert!(body.get("enterprise_project_id").is_none());
    }

    #[test]
    fn update_body_clears_text_fields() {
        let d = json!({
            "name": "renamed",
            "autoscale_policy": [{"autoscale_type": "AUTO_CREATED", "max_auto_created": 5}]
        });
        let body = build_update_body(&d, true);
        assert_eq!(body["description"], "");
        assert_eq!(body["ou_name"], "");
        assert_eq!(body["name"], "renamed");
        assert_eq!(
            body["autoscale_policy"],
            json!({"autoscale_type": "AUTO_CREATED", "max_auto_created": 5})
        );
        assert!(body.get("tags").is_none());
        assert!(build_update_body(&d, false).get("name").is_none());
    }

    #[test]
    fn residual_autoscale_policy_is_dropped() {
        assert_eq!(flatten_autoscale_policy(None), JsonValue::Null);
        assert_eq!(flatten_autoscale_policy(Some(&json!({}))), JsonValue::Null);
        assert_eq!(
            flatten_autoscale_policy(Some(&json!({"once_auto_created": 3}))),
            JsonValue::Null
        );
        let policy = flatten_autoscale_policy(Some(&json!({"min_idle": 1, "once_auto_created": 3})));
        assert_eq!(policy[0]["min_idle"], 1);
    }

    #[test]
    fn flatten_pool_fields() {
        let pool = json!({
            "name": "pool",
            "desktop_count": 3,
            "subnet_id": "subnet-1",
            "product": {"product_id": "p-1", "charge_mode": "postPaid", "cpu": "4"},
            "root_volume": {"type": "SAS", "size": 80, "id": "r"},
            "data_volumes": [{"type": "SSD", "size": 20, "id": "a"}, {"type": "SAS", "size": 50, "id": "b"}],
            "security_groups": [{"id": "sg-1", "name": "default"}],
            "tags": [{"key": "k", "value": "v"}]
        });
        let order = vec![json!({"type": "SAS", "size": 50})];
        let attrs = flatten_pool(&pool, &order);
        assert_eq!(attrs["size"], 3);
        assert_eq!(attrs["product_id"], "p-1");
        assert_eq!(attrs["subnet_ids"], json!(["subnet-1"]));
        assert_eq!(attrs["product"][0]["charging_mode"], "postPaid");
        assert_eq!(attrs["security_groups"], json!([{"id": "sg-1"}]));
        assert_eq!(attrs["data_volumes"][0]["id"], "b");
        assert_eq!(attrs["autoscale_policy"], JsonValue::Null);
        assert_eq!(attrs["tags"], json!({"k": "v"}));
    }

    #[test]
    fn authorized_object_difference() {
        let a = json!({"authorized_objects": [
            {"object_id": "u1", "object_type": "USER", "object_name": "alice", "user_group": "users"},
            {"object_id": "u2", "object_type": "USER", "object_name": "bob", "user_group": "users"}
        ]});
        let b = json!({"authorized_objects": [
            {"object_id": "u1", "object_type": "USER", "object_name": "alice", "user_group": "users"}
        ]});
        let removed = object_difference(&a, &b);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0]["object_id"], "u2");
        assert!(object_difference(&b, &a).is_empty());
    }
}
