//! End-to-end handler flows through WorkspaceProvider against a mock service

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use serde_json::json;
use vela_core::provider::ErrorKind;
use vela_core::resource::{Resource, ResourceId, State, Value};
use vela_provider_workspace::{ProviderConfig, WorkspaceProvider};
use wiremock::matchers::{body_json, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> ProviderConfig {
    let endpoints: HashMap<String, String> = ["workspace", "appstream"]
        .iter()
        .map(|service| (service.to_string(), server.uri()))
        .collect();
    ProviderConfig {
        region: "cn-north-4".to_string(),
        access_key: "AK".to_string(),
        secret_key: "SK".to_string(),
        project_id: Some("p-1".to_string()),
        endpoints,
        poll_interval: Some(Duration::from_millis(1)),
        conflict_retry_interval: Duration::from_millis(1),
        ..Default::default()
    }
}

fn provider(server: &MockServer) -> WorkspaceProvider {
    WorkspaceProvider::new(config(server)).unwrap()
}

fn attr(value: serde_json::Value) -> Value {
    Value::from_json(&value).unwrap()
}

fn app_server_resource() -> Resource {
    Resource::new("workspace_app_server", "srv")
        .with_attribute("server_group_id", attr(json!("g-1")))
        .with_attribute("type", attr(json!("createApps")))
        .with_attribute("flavor_id", attr(json!("p-1")))
        .with_attribute("root_volume", attr(json!([{"type": "SAS", "size": 80}])))
        .with_attribute("vpc_id", attr(json!("vpc-1")))
        .with_attribute("subnet_id", attr(json!("subnet-1")))
        .with_attribute("name", attr(json!("srv")))
}

fn app_server_body() -> serde_json::Value {
    json!({
        "id": "srv-1",
        "server_group_id": "g-1",
        "name": "srv",
        "maintain_status": false,
        "product_info": {
            "product_id": "p-1",
            "system_disk_type": "SAS",
            "system_disk_size": "80"
        },
        "metadata": {"charging_mode": "0"}
    })
}

async fn mount_job(server: &MockServer, job_id: &str, resource_id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/v2/p-1/job/{}", job_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": job_id,
            "status": "SUCCESS",
            "sub_jobs": [{"job_resource_info": {"resource_id": resource_id}}]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn app_server_create_waits_for_job_and_reads_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/p-1/app-servers/actions/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "j-1"})))
        .expect(1)
        .mount(&server)
        .await;
    mount_job(&server, "j-1", "srv-1").await;
    Mock::given(method("PATCH"))
        .and(path("/v1/p-1/app-servers/srv-1"))
        .and(body_json(json!({"name": "srv"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/p-1/app-servers/srv-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(app_server_body()))
        .mount(&server)
        .await;

    let state = provider(&server)
        .create_resource(&app_server_resource())
        .await
        .unwrap();

    assert!(state.exists);
    assert_eq!(state.identifier.as_deref(), Some("srv-1"));
    assert_eq!(state.get("flavor_id"), Some(&attr(json!("p-1"))));
    assert_eq!(
        state.get("root_volume"),
        Some(&attr(json!([{"type": "SAS", "size": 80}])))
    );
    assert_eq!(state.get("charging_mode"), Some(&attr(json!("postPaid"))));
    assert_eq!(state.get("vpc_id"), Some(&attr(json!("vpc-1"))));
    assert_eq!(state.get("region"), Some(&attr(json!("cn-north-4"))));
}

#[tokio::test]
async fn app_server_prepaid_is_rejected_before_any_call() {
    let server = MockServer::start().await;
    let resource = app_server_resource().with_attribute("charging_mode", attr(json!("prePaid")));

    let err = provider(&server).create_resource(&resource).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn app_server_missing_on_read_leaves_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/p-1/app-servers/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error_code": "WKS.0004",
            "error_msg": "server not found"
        })))
        .mount(&server)
        .await;

    let id = ResourceId::new("workspace_app_server", "srv");
    let state = provider(&server).read_resource(&id, "gone", None).await.unwrap();
    assert!(!state.exists);
}

#[tokio::test]
async fn app_server_delete_waits_until_gone() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/p-1/app-servers/srv-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "j-2"})))
        .expect(1)
        .mount(&server)
        .await;
    mount_job(&server, "j-2", "srv-1").await;
    Mock::given(method("GET"))
        .and(path("/v1/p-1/app-servers/srv-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(app_server_body()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/p-1/app-servers/srv-1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let id = ResourceId::new("workspace_app_server", "srv");
    let prior = State::existing(id.clone(), HashMap::new()).with_identifier("srv-1");
    provider(&server)
        .delete_resource(&id, "srv-1", &prior)
        .await
        .unwrap();
}

fn power_action(max_retries: i64) -> Resource {
    Resource::new("workspace_desktop_power_action", "restart")
        .with_attribute("desktop_ids", attr(json!(["d-1", "d-2"])))
        .with_attribute("op_type", attr(json!("reboot")))
        .with_attribute("max_retries", attr(json!(max_retries)))
}

#[tokio::test]
async fn power_action_retries_busy_desktops() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/p-1/desktops/action"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error_code": "WKS.0407",
            "error_msg": "desktop is busy"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/p-1/desktops/action"))
        .and(body_json(json!({"desktop_ids": ["d-1", "d-2"], "op_type": "reboot"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(&server);
    let resource = power_action(1);
    let state = provider.create_resource(&resource).await.unwrap();
    let identifier = state.identifier.clone().unwrap();
    assert_eq!(identifier.len(), 36);

    // Reads never reach the service
    let read = provider
        .read_resource(&resource.id, &identifier, Some(&state))
        .await
        .unwrap();
    assert_eq!(read.get("op_type"), Some(&attr(json!("reboot"))));
}

#[tokio::test]
async fn power_action_without_retries_surfaces_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/p-1/desktops/action"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error_code": "WKS.0407",
            "error_msg": "desktop is busy"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = provider(&server)
        .create_resource(&power_action(0))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert!(err.resource_id.is_some());
}

#[tokio::test]
async fn power_action_update_is_refused() {
    let server = MockServer::start().await;
    let provider = provider(&server);
    let resource = power_action(0);
    let from = State::existing(resource.id.clone(), resource.attributes.clone());

    let err = provider
        .update_resource(&resource.id, "x", &from, &resource)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn server_groups_query_from_file_config() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/p-1/app-server-groups"))
        .and(query_param("server_group_name", "grp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "g-1", "name": "grp", "app_server_count": 2}],
            "count": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
region = "cn-north-4"
access_key = "AK"
secret_key = "SK"
project_id = "p-1"
poll_interval_ms = 1

[endpoints]
appstream = "{}"
"#,
        server.uri()
    )
    .unwrap();
    let config = ProviderConfig::from_file(file.path()).unwrap();
    let provider = WorkspaceProvider::new(config).unwrap();

    let query = Resource::new("workspace_app_server_groups", "named")
        .with_read_only(true)
        .with_attribute("server_group_name", attr(json!("grp")));
    let state = provider.query_data_source(&query).await.unwrap();

    let groups = state.get("server_groups").and_then(|v| v.as_list()).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(
        groups[0].as_map().unwrap().get("id"),
        Some(&attr(json!("g-1")))
    );
    assert_eq!(state.get("server_group_name"), Some(&attr(json!("grp"))));
}

// =============================================================================
// Workspace service
// =============================================================================

fn service_body(status: &str) -> serde_json::Value {
    json!({
        "id": "ws-1",
        "status": status,
        "closable": true,
        "vpc_id": "vpc-1",
        "subnet_ids": [{"subnet_id": "net-1"}],
        "access_mode": "INTERNET",
        "ad_domains": {"domain_type": "LITE_AS"}
    })
}

async fn mount_service_status(server: &MockServer, status: &str, times: Option<u64>) {
    let mock = Mock::given(method("GET"))
        .and(path("/v2/p-1/workspaces"))
        .respond_with(ResponseTemplate::new(200).set_body_json(service_body(status)));
    match times {
        Some(n) => mock.up_to_n_times(n).mount(server).await,
        None => mock.mount(server).await,
    }
}

#[tokio::test]
async fn service_create_waits_until_subscribed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/p-1/workspaces"))
        .and(body_partial_json(json!({
            "ad_domains": {"domain_type": "LITE_AS"},
            "vpc_id": "vpc-1",
            "subnet_ids": [{"subnet_id": "net-1"}],
            "access_mode": "INTERNET"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "j-1"})))
        .expect(1)
        .mount(&server)
        .await;
    mount_service_status(&server, "PREPARING", Some(1)).await;
    mount_service_status(&server, "SUBSCRIBING", Some(1)).await;
    mount_service_status(&server, "SUBSCRIBED", None).await;
    Mock::given(method("GET"))
        .and(path("/v2/p-1/assist-auth-config/method-config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/p-1/workspaces/lock-status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"is_locked": 0})))
        .mount(&server)
        .await;

    let resource = Resource::new("workspace_service", "main")
        .with_attribute("vpc_id", attr(json!("vpc-1")))
        .with_attribute("network_ids", attr(json!(["net-1"])))
        .with_attribute("access_mode", attr(json!("INTERNET")));
    let state = provider(&server).create_resource(&resource).await.unwrap();

    assert!(state.exists);
    assert_eq!(state.identifier.as_deref(), Some("ws-1"));
    assert_eq!(state.get("status"), Some(&attr(json!("SUBSCRIBED"))));
    assert_eq!(state.get("auth_type"), Some(&attr(json!("LITE_AS"))));
    assert_eq!(state.get("network_ids"), Some(&attr(json!(["net-1"]))));
    assert_eq!(state.get("is_locked"), Some(&attr(json!(0))));
}

#[tokio::test]
async fn closed_service_reads_as_removed() {
    let server = MockServer::start().await;
    mount_service_status(&server, "CLOSED", None).await;

    let id = ResourceId::new("workspace_service", "main");
    let prior = State::existing(id.clone(), HashMap::new()).with_identifier("ws-1");
    let state = provider(&server)
        .read_resource(&id, "ws-1", Some(&prior))
        .await
        .unwrap();
    assert!(!state.exists);
}

#[tokio::test]
async fn service_delete_waits_through_deregistering() {
    let server = MockServer::start().await;
    mount_service_status(&server, "SUBSCRIBED", Some(1)).await;
    mount_service_status(&server, "DEREGISTERING", Some(2)).await;
    mount_service_status(&server, "CLOSED", None).await;
    Mock::given(method("DELETE"))
        .and(path("/v2/p-1/workspaces"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "j-9"})))
        .expect(1)
        .mount(&server)
        .await;

    let id = ResourceId::new("workspace_service", "main");
    let prior = State::existing(id.clone(), HashMap::new()).with_identifier("ws-1");
    provider(&server)
        .delete_resource(&id, "ws-1", &prior)
        .await
        .unwrap();

    let gets = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "GET")
        .count();
    assert_eq!(gets, 4);
}

// =============================================================================
// Desktop pool
// =============================================================================

fn pool_resource() -> Resource {
    Resource::new("workspace_desktop_pool", "pool")
        .with_attribute("name", attr(json!("pool")))
        .with_attribute("type", attr(json!("DYNAMIC")))
        .with_attribute("size", attr(json!(2)))
        .with_attribute("product_id", attr(json!("prod-1")))
        .with_attribute("image_type", attr(json!("gold")))
        .with_attribute("image_id", attr(json!("img-1")))
        .with_attribute("root_volume", attr(json!([{"type": "SSD", "size": 80}])))
        .with_attribute("subnet_ids", attr(json!(["net-1"])))
}

/// Prior state of `pool_resource` with two data volumes attached
fn pool_state(resource: &Resource) -> State {
    let mut attributes = resource.attributes.clone();
    attributes.insert(
        "data_volumes".to_string(),
        attr(json!([
            {"type": "SSD", "size": 20, "id": "a"},
            {"type": "SAS", "size": 50, "id": "b"}
        ])),
    );
    State::existing(resource.id.clone(), attributes).with_identifier("pool-1")
}

async fn mount_pool_read(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v2/p-1/desktop-pools/pool-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pool-1",
            "name": "pool",
            "type": "DYNAMIC",
            "status": "STEADY",
            "desktop_count": 2,
            "product": {"product_id": "prod-1"},
            "data_volumes": [
                {"type": "SSD", "size": 20, "id": "a"},
                {"type": "SSD", "size": 100, "id": "c"}
            ]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/p-1/desktop-pools/pool-1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"objects": []})))
        .mount(server)
        .await;
}

async fn mount_pool_job(server: &MockServer, job_id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/v2/p-1/workspace-jobs/{}", job_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": job_id,
            "status": "SUCCESS"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn pool_update_without_data_volumes_keeps_them() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/p-1/desktop-pools/pool-1/volumes/batch-delete"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "j-del"})))
        .expect(0)
        .mount(&server)
        .await;
    mount_pool_read(&server).await;

    let resource = pool_resource();
    let state = provider(&server)
        .update_resource(&resource.id, "pool-1", &pool_state(&resource), &resource)
        .await
        .unwrap();

    assert!(state.exists);
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.method.as_str() == "GET"));
}

#[tokio::test]
async fn pool_update_adds_and_removes_changed_volumes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/p-1/desktop-pools/pool-1/volumes/batch-delete"))
        .and(body_json(json!({"volumes": [{"id": "b", "type": "SAS", "size": 50}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "j-del"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/p-1/desktop-pools/pool-1/volumes/batch-add"))
        .and(body_json(json!({"volumes": [{"type": "SSD", "size": 100}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "j-add"})))
        .expect(1)
        .mount(&server)
        .await;
    mount_pool_job(&server, "j-del").await;
    mount_pool_job(&server, "j-add").await;
    Mock::given(method("GET"))
        .and(path("/v2/p-1/desktops"))
        .and(query_param("pool_id", "pool-1"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "desktops": [{"desktop_id": "d-1", "status": "ACTIVE"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/p-1/desktops"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"desktops": []})))
        .mount(&server)
        .await;
    mount_pool_read(&server).await;

    let resource = pool_resource().with_attribute(
        "data_volumes",
        attr(json!([{"type": "SSD", "size": 20}, {"type": "SSD", "size": 100}])),
    );
    let state = provider(&server)
        .update_resource(&resource.id, "pool-1", &pool_state(&resource), &resource)
        .await
        .unwrap();

    assert_eq!(
        state.get("data_volumes"),
        Some(&attr(json!([
            {"type": "SSD", "size": 20, "id": "a"},
            {"type": "SSD", "size": 100, "id": "c"}
        ])))
    );
}

// =============================================================================
// Data sources
// =============================================================================

#[tokio::test]
async fn app_servers_query_follows_pages() {
    let server = MockServer::start().await;
    let first: Vec<serde_json::Value> = (0..100)
        .map(|i| json!({"id": format!("srv-{}", i), "name": "app"}))
        .collect();
    Mock::given(method("GET"))
        .and(path("/v1/p-1/app-servers"))
        .and(query_param("server_name", "app"))
        .and(query_param("limit", "100"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": first})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/p-1/app-servers"))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "id": "srv-100",
                "name": "app",
                "product_info": {"product_id": "p-1"},
                "freeze": [{"effect": 1, "scene": "ARREAR"}]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = Resource::new("workspace_app_servers", "all")
        .with_read_only(true)
        .with_attribute("server_name", attr(json!("app")));
    let state = provider(&server).query_data_source(&query).await.unwrap();

    let servers = state.get("servers").and_then(|v| v.as_list()).unwrap();
    assert_eq!(servers.len(), 101);
    let last = servers[100].as_map().unwrap();
    assert_eq!(last.get("id"), Some(&attr(json!("srv-100"))));
    assert_eq!(
        last.get("freeze"),
        Some(&attr(json!([{"effect": 1, "scene": "ARREAR"}])))
    );
    assert_eq!(state.identifier.as_deref().map(str::len), Some(36));
}

#[tokio::test]
async fn pool_desktops_query_lists_members() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/p-1/desktop-pools/pool-1/desktops"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pool_desktops": [
                {
                    "desktop_id": "d-1",
                    "computer_name": "pool-001",
                    "status": "ACTIVE",
                    "root_volume": {"type": "SSD", "size": 80, "id": "v-1"},
                    "tags": [{"key": "team", "value": "ops"}]
                },
                {"desktop_id": "d-2", "computer_name": "pool-002", "status": "SHUTOFF"}
            ],
            "total_count": 2
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = Resource::new("workspace_desktop_pool_associated_desktops", "members")
        .with_read_only(true)
        .with_attribute("pool_id", attr(json!("pool-1")));
    let state = provider(&server).query_data_source(&query).await.unwrap();

    let desktops = state.get("desktops").and_then(|v| v.as_list()).unwrap();
    assert_eq!(desktops.len(), 2);
    let first = desktops[0].as_map().unwrap();
    assert_eq!(first.get("desktop_id"), Some(&attr(json!("d-1"))));
    assert_eq!(
        first.get("root_volume"),
        Some(&attr(json!([{"type": "SSD", "size": 80, "id": "v-1"}])))
    );
    assert_eq!(first.get("tags"), Some(&attr(json!({"team": "ops"}))));
    assert_eq!(
        desktops[1].as_map().unwrap().get("status"),
        Some(&attr(json!("SHUTOFF")))
    );
    assert_eq!(state.get("pool_id"), Some(&attr(json!("pool-1"))));
}
