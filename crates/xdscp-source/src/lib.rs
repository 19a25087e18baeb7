// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Source Poller: periodic ingestion, structural diffing, node
//! matching, and modifier application over upstream instance data.
#![deny(unsafe_code)]

mod matching;
mod modifier;
mod poller;
mod registry;
mod source;

pub use matching::{instance_match_value, matches, node_match_value};
pub use modifier::{apply_modifiers, GlobalModifier, Modifier};
pub use poller::{match_node, MatchingConfig, Poller, PollerRetryConfig};
pub use registry::{GlobalModifierFactory, ModifierFactory, PluginRegistry, SourceFactory};
pub use source::{FileSource, InlineSource, Source};
