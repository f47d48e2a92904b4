//! Core data models for the gallery service.
//!
//! These entities represent users and their uploaded images. They map
//! cleanly to database rows via `sqlx::FromRow` and serialize naturally as
//! JSON via `serde`.

pub mod image;
pub mod user;
