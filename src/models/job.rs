//! Payload of a thumbnail derivation job.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Instructs the worker to regenerate every size variant of one image entry.
///
/// Both ids are optional on the wire: a job written by an older or foreign
/// producer may lack them, and the worker rejects such jobs instead of
/// failing to decode the whole queue row.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DerivationJob {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
}

impl DerivationJob {
    pub fn new(owner_id: Uuid, entry_id: Uuid) -> Self {
        Self {
            owner_id: Some(owner_id.to_string()),
            entry_id: Some(entry_id.to_string()),
        }
    }
}
