use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of entity a crypto identity is bound to, per the data model's
/// `entity_type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Component,
    Message,
    File,
    User,
    Agent,
    Decision,
}

/// `{crypto_id, entity_id, entity_type, key_id, signature_alg, created_at}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoIdentity {
    pub crypto_id: Uuid,
    pub entity_id: String,
    pub entity_type: EntityType,
    pub key_id: String,
    pub signature_alg: String,
    pub created_at: DateTime<Utc>,
}

impl CryptoIdentity {
    pub fn new(entity_id: impl Into<String>, entity_type: EntityType, key_id: impl Into<String>) -> Self {
        Self {
            crypto_id: Uuid::new_v4(),
            entity_id: entity_id.into(),
            entity_type,
            key_id: key_id.into(),
            signature_alg: "ed25519".to_string(),
            created_at: Utc::now(),
        }
    }
}
