pub mod access;
pub mod cleanup;
pub mod clock;
pub mod gallery_service;
pub mod media_probe;
pub mod metadata;
pub mod object_store;
pub mod password;
pub mod repository;
pub mod short_code;
pub mod signing;
