// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Render Pipeline: template selection, render-context construction,
//! Jinja/module rendering, resource filtering, `@type` annotation, version
//! hashing, and subprocess fault isolation (section 4.8).
#![deny(unsafe_code)]

mod engine;
mod pipeline;
mod render_context;
mod subprocess;
mod table;

pub use engine::render;
pub use pipeline::RenderPipeline;
pub use render_context::{build_render_context, DEFAULT_CIPHER_SUITES};
pub use subprocess::{render_in_subprocess, run_render_worker, RenderJob, RenderJobResult, RENDER_WORKER_SUBCOMMAND};
pub use table::{TemplateTable, DEFAULT_VERSION_KEY};
