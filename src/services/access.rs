//! Access decisions for gallery reads and writes.
//!
//! Everything here is pure: the caller resolves the gallery and credentials,
//! these functions only decide. Write access to anonymous galleries is not
//! decided here at all; holding the access key is the credential, and it is
//! checked by lookup.

use crate::{
    models::{anonymous_gallery::AnonymousGallery, gallery::Gallery},
    services::{
        gallery_service::GalleryError,
        password::{PasswordHasher, PasswordMatch},
    },
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    NotPublic,
    PasswordRequired,
    InvalidPassword,
    PasswordNotRequired,
    NotOwner,
}

impl Denial {
    pub fn reason(&self) -> &'static str {
        match self {
            Denial::NotPublic => "gallery_not_public",
            Denial::PasswordRequired => "password_required",
            Denial::InvalidPassword => "invalid_password",
            Denial::PasswordNotRequired => "password_not_required",
            Denial::NotOwner => "gallery_not_found",
        }
    }
}

impl From<Denial> for GalleryError {
    fn from(denial: Denial) -> Self {
        match denial {
            // Someone else's gallery looks exactly like a missing one.
            Denial::NotOwner => GalleryError::NotFound(denial.reason()),
            other => GalleryError::Unauthorized(other.reason()),
        }
    }
}

pub type Decision = Result<(), Denial>;

/// Public read path for owned galleries.
///
/// `password_verified` is true only when this same call has already checked
/// the password with [`verify_password`].
pub fn can_read_publicly(gallery: &Gallery, password_verified: bool) -> Decision {
    if !gallery.is_public {
        return Err(Denial::NotPublic);
    }
    if gallery.has_password() && !password_verified {
        return Err(Denial::PasswordRequired);
    }
    Ok(())
}

pub fn verify_password(gallery: &Gallery, supplied: &str, hasher: &dyn PasswordHasher) -> Decision {
    let Some(hash) = gallery.password_hash.as_deref().filter(|h| !h.is_empty()) else {
        return Err(Denial::PasswordNotRequired);
    };
    match hasher.verify(hash, supplied) {
        PasswordMatch::Match => Ok(()),
        PasswordMatch::Mismatch => Err(Denial::InvalidPassword),
    }
}

pub fn can_write(gallery: &Gallery, actor: Uuid) -> Decision {
    if gallery.user_id == actor {
        Ok(())
    } else {
        Err(Denial::NotOwner)
    }
}

pub fn is_expired(gallery: &AnonymousGallery, now: DateTime<Utc>) -> bool {
    now > gallery.expires_at
}

pub fn ensure_not_expired(gallery: &AnonymousGallery, now: DateTime<Utc>) -> Result<(), GalleryError> {
    if is_expired(gallery, now) {
        Err(GalleryError::Gone("gallery_expired"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::password::Argon2Hasher;
    use chrono::Duration;

    fn gallery(is_public: bool, password: Option<&str>) -> Gallery {
        let mut gallery = Gallery::new(Uuid::new_v4(), "abcd".into(), is_public, Utc::now());
        if let Some(password) = password {
            gallery.set_password(Argon2Hasher::new().hash(password).unwrap());
        }
        gallery
    }

    #[test]
    fn public_gallery_without_password_is_readable() {
        assert_eq!(can_read_publicly(&gallery(true, None), false), Ok(()));
    }

    #[test]
    fn public_gallery_with_password_needs_verification() {
        let g = gallery(true, Some("SecurePassword123"));
        assert_eq!(can_read_publicly(&g, false), Err(Denial::PasswordRequired));
        assert_eq!(can_read_publicly(&g, true), Ok(()));
    }

    #[test]
    fn private_gallery_is_never_publicly_readable() {
        assert_eq!(can_read_publicly(&gallery(false, None), true), Err(Denial::NotPublic));
        let g = gallery(false, Some("SecurePassword123"));
        assert_eq!(can_read_publicly(&g, true), Err(Denial::NotPublic));
    }

    #[test]
    fn password_verification_outcomes() {
        let hasher = Argon2Hasher::new();
        let g = gallery(true, Some("SecurePassword123"));
        assert_eq!(verify_password(&g, "SecurePassword123", &hasher), Ok(()));
        assert_eq!(verify_password(&g, "wrong", &hasher), Err(Denial::InvalidPassword));
        assert_eq!(
            verify_password(&gallery(true, None), "anything", &hasher),
            Err(Denial::PasswordNotRequired)
        );
    }

    #[test]
    fn only_the_owner_may_write() {
        let g = gallery(true, None);
        assert_eq!(can_write(&g, g.user_id), Ok(()));
        assert_eq!(can_write(&g, Uuid::new_v4()), Err(Denial::NotOwner));
        assert!(matches!(
            GalleryError::from(Denial::NotOwner),
            GalleryError::NotFound("gallery_not_found")
        ));
    }

    #[test]
    fn expiry_is_strictly_after_expires_at_and_monotonic() {
        let created = Utc::now();
        let g = AnonymousGallery::new("abcd".into(), "key".into(), created);
        assert_eq!(g.expires_at, created + Duration::days(30));

        assert!(!is_expired(&g, created));
        assert!(!is_expired(&g, g.expires_at));
        let mut expired_seen = false;
        for hours in (0..=24 * 40).step_by(6) {
            let expired = is_expired(&g, created + Duration::hours(hours));
            assert!(!(expired_seen && !expired));
            expired_seen |= expired;
        }
        assert!(expired_seen);
        assert!(matches!(
            ensure_not_expired(&g, g.expires_at + Duration::seconds(1)),
            Err(GalleryError::Gone("gallery_expired"))
        ));
    }
}
