//! The cached render output.

use crate::node::Node;
use serde::{Deserialize, Serialize};

/// A rendered Discovery Response body, cached under the request
/// fingerprint. `len` and `text` are kept alongside each other so the
/// read-side never has to re-measure the payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub text: String,
    pub len: usize,
    pub version: String,
    pub node: Node,
}

impl Entry {
    #[must_use]
    pub fn new(text: String, version: String, node: Node) -> Self {
        let len = text.len();
        Self { text, len, version, node }
    }
}
