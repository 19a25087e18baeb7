// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Two-Tier Cache: a [`CacheBackend`] contract, a filesystem-backed
//! [`LocalCache`], an object-storage-backed [`RemoteCache`], and the
//! [`DualCache`] that composes them with write-back and graceful
//! degradation.
#![deny(unsafe_code)]

mod backend;
mod dual;
mod local;
mod remote;

pub use backend::CacheBackend;
pub use dual::DualCache;
pub use local::LocalCache;
pub use remote::{RemoteCache, COMPACTED_MARKER, REGISTRATIONS_PREFIX};
