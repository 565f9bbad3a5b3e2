// [[AUTORL]]/apps/autorl-kernel/src/security.rs
// Purpose: Client identification for run attribution.
// Architecture: API Layer
// Dependencies: Axum

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::KernelError;

pub const CLIENT_ID_HEADER: &str = "X-AUTORL-CLIENT-ID";
const ANONYMOUS_CLIENT: &str = "public";

pub struct ClientSession(pub String);

impl ClientSession {
    pub fn anonymous() -> Self {
        ClientSession(ANONYMOUS_CLIENT.to_string())
    }

    /// Alphanumerics and dashes only.
    pub fn parse(raw: &str) -> Result<Self, KernelError> {
        if raw.is_empty() || !raw.chars().all(|c| c.is_alphanumeric() || c == '-') {
            return Err(KernelError::InvalidClientId(raw.to_string()));
        }
        Ok(ClientSession(raw.to_string()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientSession
where
    S: Send + Sync,
{
    type Rejection = KernelError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(CLIENT_ID_HEADER) else {
            return Ok(ClientSession::anonymous());
        };

        let raw = header
            .to_str()
            .map_err(|_| KernelError::InvalidClientId("<non-ascii>".to_string()))?;

        ClientSession::parse(raw).map_err(|e| {
            tracing::warn!("Invalid client id rejected: {}", raw);
            e
        })
    }
}
