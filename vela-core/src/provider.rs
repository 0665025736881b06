//! Provider - Trait abstracting resource operations
//!
//! A Provider turns resource lifecycles (create, read, update, delete,
//! import) and data source queries into remote API calls.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::resource::{Resource, ResourceId, State};
use crate::schema::ResourceSchema;

/// Broad category of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Remote API returned an error
    Api,
    /// The remote object does not exist
    NotFound,
    /// The remote object is busy (HTTP 409)
    Conflict,
    /// A wait did not reach its target in time
    Timeout,
    /// Credentials, region or endpoint problems
    Config,
    /// Attributes rejected before any call was made
    Validation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Api => "api",
            ErrorKind::NotFound => "not found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Config => "config",
            ErrorKind::Validation => "validation",
        };
        f.write_str(name)
    }
}

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}.{}] {}", id.resource_type, id.name, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_id: None,
            cause: None,
            kind: ErrorKind::Api,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ErrorKind::NotFound)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ErrorKind::Validation)
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == ErrorKind::Conflict
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "workspace_desktop")
    fn name(&self) -> &'static str;

    /// Attribute schema for this resource type
    fn schema(&self) -> ResourceSchema;
}

/// Main Provider trait
///
/// All operations are async and involve side effects. A read that finds
/// nothing returns `State::not_found()` rather than an error, which tells
/// the host to drop the resource from its state.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "workspace")
    fn name(&self) -> &'static str;

    /// Resource and data source types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Get the current state of a resource
    ///
    /// `prior` is the last stored state, used to carry values the API
    /// never returns (passwords, user-only flags).
    fn read<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        prior: Option<&'a State>,
    ) -> BoxFuture<'a, ProviderResult<State>>;

    /// Create a resource
    ///
    /// Returns State with identifier set to the remote ID
    fn create<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<State>>;

    /// Update a resource in place
    fn update<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        from: &'a State,
        to: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<State>>;

    /// Delete a resource
    fn delete<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        prior: &'a State,
    ) -> BoxFuture<'a, ProviderResult<()>>;

    /// Import an existing remote object by its identifier
    fn import<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        self.read(id, identifier, None)
    }

    /// Run a data source query
    fn read_data_source<'a>(&'a self, resource: &'a Resource)
    -> BoxFuture<'a, ProviderResult<State>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn read<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        prior: Option<&'a State>,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        (**self).read(id, identifier, prior)
    }

    fn create<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        from: &'a State,
        to: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        prior: &'a State,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        (**self).delete(id, identifier, prior)
    }

    fn import<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        (**self).import(id, identifier)
    }

    fn read_data_source<'a>(
        &'a self,
        resource: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        (**self).read_data_source(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Value;

    struct MockProvider;

    impl Provider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
            vec![]
        }

        fn read<'a>(
            &'a self,
            id: &'a ResourceId,
            identifier: &'a str,
            _prior: Option<&'a State>,
        ) -> BoxFuture<'a, ProviderResult<State>> {
            Box::pin(async move {
                if identifier == "missing" {
                    Ok(State::not_found(id.clone()))
                } else {
                    Ok(State::existing(id.clone(), Default::default()).with_identifier(identifier))
                }
            })
        }

        fn create<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<State>> {
            Box::pin(async move {
                Ok(State::existing(resource.id.clone(), resource.attributes.clone())
                    .with_identifier("mock-id-123"))
            })
        }

        fn update<'a>(
            &'a self,
            id: &'a ResourceId,
            _identifier: &'a str,
            _from: &'a State,
            to: &'a Resource,
        ) -> BoxFuture<'a, ProviderResult<State>> {
            Box::pin(async move { Ok(State::existing(id.clone(), to.attributes.clone())) })
        }

        fn delete<'a>(
            &'a self,
            _id: &'a ResourceId,
            _identifier: &'a str,
            _prior: &'a State,
        ) -> BoxFuture<'a, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn read_data_source<'a>(
            &'a self,
            resource: &'a Resource,
        ) -> BoxFuture<'a, ProviderResult<State>> {
            Box::pin(async move {
                Err(ProviderError::validation("no data sources").for_resource(resource.id.clone()))
            })
        }
    }

    #[tokio::test]
    async fn mock_provider_read_returns_not_found() {
        let provider = MockProvider;
        let id = ResourceId::new("test", "example");
        let state = provider.read(&id, "missing", None).await.unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn mock_provider_create_returns_existing() {
        let provider = MockProvider;
        let resource =
            Resource::new("test", "example").with_attribute("name", Value::String("a".into()));
        let state = provider.create(&resource).await.unwrap();
        assert!(state.exists);
        assert_eq!(state.identifier, Some("mock-id-123".to_string()));
    }

    #[tokio::test]
    async fn import_defaults_to_read() {
        let provider: Box<dyn Provider> = Box::new(MockProvider);
        let id = ResourceId::new("test", "example");
        let state = provider.import(&id, "abc").await.unwrap();
        assert_eq!(state.identifier.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn data_source_error_keeps_kind_and_resource() {
        let provider = MockProvider;
        let resource = Resource::new("test", "query").with_read_only(true);
        let err = provider.read_data_source(&resource).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.to_string(), "[test.query] no data sources");
    }

    #[test]
    fn error_kind_helpers() {
        assert!(ProviderError::not_found("gone").is_not_found());
        assert!(
            ProviderError::new("busy")
                .with_kind(ErrorKind::Conflict)
                .is_conflict()
        );
        assert_eq!(ProviderError::new("x").kind, ErrorKind::Api);
    }
}
