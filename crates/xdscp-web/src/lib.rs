// SPDX-License-Identifier: MIT OR Apache-2.0
//! The read side: a blocking cache read that registers new clients with
//! the worker on miss, and the outward xDS HTTP surface built on top of
//! it (sections 4.10 and 6).
#![deny(unsafe_code)]

mod http;
mod read_side;

pub use http::{router, WebState};
pub use read_side::ReadSide;
