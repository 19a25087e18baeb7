// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stable contract types shared across the control plane: [`Node`],
//! [`DiscoveryRequest`], resources, [`TemplateSpec`], [`SourceData`],
//! [`ContextResult`], [`Entry`], and [`RegisteredClient`].
//!
//! Every other crate in the workspace depends on this one for the shapes
//! that cross a component boundary; it has no dependency on any of them.
#![deny(unsafe_code)]

mod context;
mod entry;
mod events;
mod node;
mod registered_client;
mod request;
mod resource;
mod source_data;
mod template;
mod type_url;

pub use context::{ContextResult, ContextState};
pub use entry::Entry;
pub use events::{EventBus, Topic};
pub use node::{BuildVersionTuple, Locality, Node, DEFAULT_ENVOY_VERSION};
pub use registered_client::RegisteredClient;
pub use request::{ApiVersion, DiscoveryRequest, ResourceType};
pub use resource::{filter_by_requested_names, resource_name, Resource, Resources};
pub use source_data::{diff, DiffOp, SourceData, DEFAULT_SCOPE};
pub use template::{TemplateOutput, TemplateSpec};
pub use type_url::type_url;
