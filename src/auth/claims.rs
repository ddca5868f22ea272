use serde::{Deserialize, Serialize};

/// JWT claims accepted by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user or service ID)
    pub sub: String,

    /// Audience
    pub aud: String,

    /// Issuer - optional
    #[serde(default)]
    pub iss: Option<String>,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// User role - optional
    #[serde(default)]
    pub role: Option<String>,
}
