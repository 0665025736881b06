//! Vela Core
//!
//! Value model, attribute schemas and the provider trait shared by the
//! Workspace provider and the `vela` host.

pub mod provider;
pub mod resource;
pub mod schema;
