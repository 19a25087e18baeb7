// SPDX-License-Identifier: MIT OR Apache-2.0
//! Loadable: translate a small configuration object into a value fetched
//! from a URI-shaped address (file, env, http, module, s3, inline) and
//! deserialised (yaml, json, string, raw, jinja).
#![cfg_attr(not(test), deny(unsafe_code))]

mod loader;
mod registry;
mod spec;

pub use loader::{load, LoadContext};
pub use registry::{LoadRegistry, ModuleProvider};
pub use spec::{from_config, parse_legacy_string, Deserializer, LoadableSpec, Protocol};
