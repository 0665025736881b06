//! Vela Huawei Cloud Workspace Provider
//!
//! Manages Workspace desktops, desktop pools and the APP streaming service
//! through the Workspace and AppStream REST APIs.
//!
//! ## Module Structure
//!
//! - `config` - Credentials, region, project and endpoint resolution
//! - `signer` / `client` - Signed JSON transport
//! - `pagination`, `wait`, `retry`, `jobs` - Shared polling building blocks
//! - `schemas` - Attribute schemas per type
//! - `resources` / `data_sources` - Per-type handlers
//! - `provider` - WorkspaceProvider dispatch

pub mod client;
pub mod config;
pub mod data_sources;
pub mod jobs;
pub mod pagination;
pub mod provider;
pub mod resources;
pub mod retry;
pub mod schemas;
pub mod signer;
pub mod utils;
pub mod wait;

// Re-export main types
pub use config::ProviderConfig;
pub use provider::WorkspaceProvider;

use vela_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use vela_core::resource::{Resource, ResourceId, State};

use resources::resource_types;

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for WorkspaceProvider {
    fn name(&self) -> &'static str {
        "workspace"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resource_types()
    }

    fn read<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        prior: Option<&'a State>,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.read_resource(id, identifier, prior))
    }

    fn create<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.create_resource(resource))
    }

    fn update<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        from: &'a State,
        to: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.update_resource(id, identifier, from, to))
    }

    fn delete<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        prior: &'a State,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.delete_resource(id, identifier, prior))
    }

    fn import<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.import_resource(id, identifier))
    }

    fn read_data_source<'a>(
        &'a self,
        resource: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.query_data_source(resource))
    }
}
