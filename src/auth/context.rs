use super::Claims;

/// Authenticated caller extracted from a verified JWT
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// JWT sub claim
    pub subject: String,

    /// Caller role, recorded on stage invocations
    pub role: Option<String>,
}

impl AuthContext {
    pub fn from_claims(claims: &Claims) -> Result<Self, &'static str> {
        if claims.sub.trim().is_empty() {
            return Err("Token has an empty subject");
        }

        Ok(Self {
            subject: claims.sub.clone(),
            role: claims.role.clone(),
        })
    }
}
