//! Defines routes for the gallery REST surface.
//!
//! ## Structure
//! - **Image endpoints** (GET is public, mutation requires a bearer token)
//!   - `GET    /images` — list/search (`?contributor=`, `?q=`)
//!   - `POST   /images` — multipart upload
//!   - `GET    /images/{id}` — metadata
//!   - `DELETE /images/{id}` — owner-only delete
//!   - `GET/PUT/DELETE /images/{id}/title` — title property
//!   - `GET/PUT/DELETE /images/{id}/description` — description property
//!   - `GET    /images/{id}/content` — stored bytes
//!
//! - **User endpoints** (all require a bearer token)
//!   - `GET /users`, `GET /users/me`, `GET /users/{id}`
//!   - `GET/PUT /users/{id}/name` — display name (PUT is self-only)
//!   - `GET /users/{id}/images` — that user's uploads

use crate::{
    AppState,
    handlers::{
        health_handlers::{healthz, readyz},
        image_handlers::{
            delete_description, delete_image, delete_title, get_content, get_description,
            get_image, get_title, put_description, put_title, search_images, upload_image,
        },
        user_handlers::{get_name, get_user, get_user_images, list_users, me, put_name},
    },
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, put},
};

/// Build and return the router for the whole REST surface.
///
/// The router carries shared state (`AppState`) to all handlers;
/// authentication is enforced per-handler by the `AuthUser` extractor.
/// `max_upload_bytes` replaces axum's 2 MB default body cap on the upload
/// route, which is far too small for photographs.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // image resources
        .route(
            "/images",
            get(search_images)
                .post(upload_image)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/images/{id}", get(get_image).delete(delete_image))
        .route(
            "/images/{id}/title",
            get(get_title).put(put_title).delete(delete_title),
        )
        .route(
            "/images/{id}/description",
            get(get_description)
                .put(put_description)
                .delete(delete_description),
        )
        .route("/images/{id}/content", get(get_content))
        // user resources
        .route("/users", get(list_users))
        .route("/users/me", get(me))
        .route("/users/{id}", get(get_user))
        .route("/users/{id}/name", put(put_name).get(get_name))
        .route("/users/{id}/images", get(get_user_images))
}
