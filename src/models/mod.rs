//! Core data models for the gallery sharing service.
//!
//! These entities represent galleries of both kinds and the media they own.
//! Gallery records map to database tables via `sqlx::FromRow`; media rows go
//! through [`media::MediaRow`] so the parent relation can be a sum type.

pub mod anonymous_gallery;
pub mod gallery;
pub mod media;
pub mod views;
