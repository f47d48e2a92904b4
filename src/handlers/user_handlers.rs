//! HTTP handlers for user resources. Every endpoint here requires a
//! resolved principal; display-name edits are additionally self-only.

use crate::{
    AppState,
    auth::AuthUser,
    errors::AppError,
    handlers::validate_min_length,
    models::{image::Image, user::User},
};
use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

/// GET `/users` — all users, display-name order.
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(_principal): AuthUser,
) -> Result<Json<Vec<User>>, AppError> {
    let users = state.users.get_all().await?;
    Ok(Json(
        users
            .into_iter()
            .map(|user| user.with_href(&state.base_url))
            .collect(),
    ))
}

/// GET `/users/me` — the authenticated caller's own profile.
pub async fn me(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Json<User> {
    Json(principal.with_href(&state.base_url))
}

/// GET `/users/{id}`
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(_principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    state
        .users
        .get(id)
        .await?
        .map(|user| Json(user.with_href(&state.base_url)))
        .ok_or_else(|| AppError::not_found("user not found"))
}

/// GET `/users/{id}/name`
pub async fn get_name(
    State(state): State<AppState>,
    AuthUser(_principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<String>, AppError> {
    state
        .users
        .get(id)
        .await?
        .map(|user| Json(user.display_name))
        .ok_or_else(|| AppError::not_found("user not found"))
}

/// PUT `/users/{id}/name` — self-only display-name edit, min length 3.
/// A non-self id gets the same 404 as a nonexistent one.
pub async fn put_name(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    name: String,
) -> Result<Json<String>, AppError> {
    validate_min_length("name", &name)?;
    let mut user = state
        .users
        .get_owned(id, &principal)
        .ok_or_else(|| AppError::not_found("user not found"))?;
    user.display_name = name;
    let saved = state.users.save(&user).await?;
    Ok(Json(saved.display_name))
}

/// GET `/users/{id}/images` — that user's uploads, newest first.
pub async fn get_user_images(
    State(state): State<AppState>,
    AuthUser(_principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Image>>, AppError> {
    let user = state
        .users
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    let images = state.images.images_of(&user).await?;
    Ok(Json(
        images
            .into_iter()
            .map(|image| {
                let mut image = image.with_href(&state.base_url);
                if let Some(contributor) = image.contributor.take() {
                    image.contributor = Some(contributor.with_href(&state.base_url));
                }
                image
            })
            .collect(),
    ))
}
