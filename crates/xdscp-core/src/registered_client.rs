//! A client registered with the worker for on-change fan-out.

use crate::request::DiscoveryRequest;
use serde::{Deserialize, Serialize};

/// A `{client_id, request}` pair the worker iterates on `NEW_CONTEXT`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegisteredClient {
    pub client_id: String,
    pub request: DiscoveryRequest,
}
