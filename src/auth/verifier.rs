use anyhow::Context;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use tracing::debug;

use super::claims::{Claims, Identity};
use crate::config::{IdentityConfig, IdentityKey};

/// Checks identity tokens handed out by the identity provider.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> anyhow::Result<Identity>;
}

pub struct JwtVerifier {
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn from_config(cfg: &IdentityConfig) -> anyhow::Result<Self> {
        let (decoding, alg) = match &cfg.key {
            IdentityKey::Secret(secret) => {
                anyhow::ensure!(!secret.is_empty(), "identity secret is empty");
                (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)
            }
            IdentityKey::PublicKeyPem(pem) => (
                DecodingKey::from_rsa_pem(pem.as_bytes()).context("parse identity public key")?,
                Algorithm::RS256,
            ),
        };

        let mut validation = Validation::new(alg);
        validation.set_audience(std::slice::from_ref(&cfg.audience));
        validation.set_issuer(std::slice::from_ref(&cfg.issuer));
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        Ok(Self { decoding, validation })
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> anyhow::Result<Identity> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;
        let Claims { sub, email, .. } = data.claims;
        anyhow::ensure!(!sub.trim().is_empty(), "token has an empty subject");
        debug!(uid = %sub, "identity token verified");
        Ok(Identity { uid: sub, email })
    }
}
