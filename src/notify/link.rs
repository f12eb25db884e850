//! One-time action links backed by the storage collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use uuid::Uuid;

use super::LinkIssuer;
use crate::error::Result;
use crate::store::Storage;

// ---

/// Issues `{public_base_url}/action/{token}` links. The token is a random
/// UUID in URL-safe base64 (22 characters), stored with its alert id and
/// expiry; `GET /action/{token}` consumes it.
pub struct StoredLinkIssuer {
    storage: Arc<dyn Storage>,
    public_base_url: String,
    ttl: Duration,
}

impl StoredLinkIssuer {
    pub fn new(storage: Arc<dyn Storage>, public_base_url: &str, ttl: Duration) -> Self {
        StoredLinkIssuer {
            storage,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            ttl,
        }
    }
}

#[async_trait]
impl LinkIssuer for StoredLinkIssuer {
    async fn create_link(&self, alert_id: i64) -> Result<String> {
        // ---
        let token = new_token();
        self.storage
            .create_action_link(&token, alert_id, Utc::now() + self.ttl)
            .await?;

        Ok(format!("{}/action/{}", self.public_base_url, token))
    }
}

fn new_token() -> String {
    URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes())
}
