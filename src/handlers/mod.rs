pub mod anonymous_handlers;
pub mod auth;
pub mod gallery_handlers;
pub mod health_handlers;
pub mod object_handlers;
