use serde::{Deserialize, Serialize};

/// Payload of an identity token issued by the external provider.
///
/// `iss` and `aud` are checked by the validator straight from the raw token,
/// so only the fields the backend reads are modelled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,              // provider user id
    pub exp: usize,               // expires at (unix timestamp)
    #[serde(default)]
    pub email: Option<String>,    // not every provider sends it
}

/// Verified caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
}

impl Identity {
    /// Display name used when a profile is created without one.
    pub fn default_display_name(&self) -> String {
        self.email
            .as_deref()
            .and_then(|e| e.split('@').next())
            .filter(|local| !local.is_empty())
            .map(String::from)
            .unwrap_or_else(|| "Friend".to_string())
    }
}
