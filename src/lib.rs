// SPDX-License-Identifier: MIT OR Apache-2.0
//! `xdscp` is a workspace: the root crate itself holds no runtime code,
//! only the root-level integration tests and benches that exercise the
//! `xdscp-*` crates together. See `crates/xdscp-cli` for the binary.
