//! HMAC-SHA256 signatures for pre-signed object URLs and owner tokens.

use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac, digest::InvalidLength};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct Signer {
    mac: HmacSha256,
}

impl Signer {
    pub fn new(secret: &str) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret.as_bytes())?,
        })
    }

    /// URL-safe base64 signature over `payload`.
    pub fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Constant-time check of a signature produced by [`Signer::sign`].
    pub fn verify(&self, payload: &str, signature: &str) -> bool {
        let Ok(signature) = general_purpose::URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).is_ok()
    }

    /// Bearer token for a gallery owner: `{user_id}.{signature}`.
    pub fn issue_owner_token(&self, user_id: Uuid) -> String {
        let subject = user_id.to_string();
        format!("{}.{}", subject, self.sign(&owner_payload(&subject)))
    }

    pub fn verify_owner_token(&self, token: &str) -> Option<Uuid> {
        let (subject, signature) = token.split_once('.')?;
        if !self.verify(&owner_payload(subject), signature) {
            return None;
        }
        Uuid::parse_str(subject).ok()
    }
}

fn owner_payload(subject: &str) -> String {
    format!("owner\n{}", subject)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_verify_only_for_the_signed_payload() {
        let signer = Signer::new("secret").unwrap();
        let sig = signer.sign("put\nkey\n1\nimage/png");
        assert!(signer.verify("put\nkey\n1\nimage/png", &sig));
        assert!(!signer.verify("put\nkey\n2\nimage/png", &sig));
        assert!(!signer.verify("put\nkey\n1\nimage/png", "bogus!"));
    }

    #[test]
    fn owner_tokens_round_trip_and_reject_tampering() {
        let signer = Signer::new("secret").unwrap();
        let user = Uuid::new_v4();
        let token = signer.issue_owner_token(user);
        assert_eq!(signer.verify_owner_token(&token), Some(user));

        let other = Uuid::new_v4();
        let (_, sig) = token.split_once('.').unwrap();
        assert_eq!(signer.verify_owner_token(&format!("{}.{}", other, sig)), None);
        assert_eq!(signer.verify_owner_token("no-dot"), None);

        let foreign = Signer::new("another").unwrap();
        assert_eq!(foreign.verify_owner_token(&token), None);
    }
}
