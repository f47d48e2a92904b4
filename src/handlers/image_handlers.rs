//! HTTP handlers for image resources.
//!
//! GET endpoints under `/images` are public; everything that mutates
//! requires a resolved principal. Content downloads are streamed rather
//! than buffered, and storage concerns stay behind `ImageService`.

use crate::{
    AppState,
    auth::AuthUser,
    errors::AppError,
    handlers::validate_min_length,
    models::image::{Image, image_href},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use std::io;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

/// Declared MIME types accepted for upload. Everything else is 415.
const ALLOWED_CONTENT_TYPES: [&str; 7] = [
    "image/bmp",
    "image/gif",
    "image/jpeg",
    "image/png",
    "image/svg+xml",
    "image/tiff",
    "image/webp",
];

/// Query params accepted by `GET /images`.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub contributor: Option<Uuid>,
    pub q: Option<String>,
}

/// Attach derived link fields before an image leaves the service.
fn decorate(mut image: Image, base_url: &str) -> Image {
    if let Some(contributor) = image.contributor.take() {
        image.contributor = Some(contributor.with_href(base_url));
    }
    image.with_href(base_url)
}

/// GET `/images` — list or search, depending on which criteria are present.
///
/// An unknown contributor id yields an empty list rather than an error, so
/// the search surface never confirms which user ids exist.
pub async fn search_images(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Image>>, AppError> {
    let contributor = match query.contributor {
        Some(id) => match state.users.get(id).await? {
            Some(user) => Some(user),
            None => return Ok(Json(Vec::new())),
        },
        None => None,
    };

    let images = state
        .images
        .search(contributor.as_ref(), query.q.as_deref())
        .await?;
    Ok(Json(
        images
            .into_iter()
            .map(|image| decorate(image, &state.base_url))
            .collect(),
    ))
}

/// Multipart failures keep their own status so an over-limit body surfaces
/// as 413 rather than a generic 400.
fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}

/// POST `/images` — multipart upload (`file` plus optional `title` and
/// `description` fields), 201 with a `Location` header on success.
///
/// The file field is streamed into storage as it arrives, never buffered
/// whole. Metadata fields may precede or follow the file; trailing ones are
/// applied with a follow-up save, and a trailing field that fails validation
/// rolls the stored upload back.
pub async fn upload_image(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut title: Option<String> = None;
    let mut description: Option<String> = None;
    let mut image: Option<Image> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("title") => title = Some(field.text().await.map_err(multipart_error)?),
            Some("description") => {
                description = Some(field.text().await.map_err(multipart_error)?);
            }
            Some("file") if image.is_none() => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
                    return Err(AppError::new(
                        StatusCode::UNSUPPORTED_MEDIA_TYPE,
                        "upload MIME type not in whitelist",
                    ));
                }
                if let Some(title) = &title {
                    validate_min_length("title", title)?;
                }
                if let Some(description) = &description {
                    validate_min_length("description", description)?;
                }
                let content = field.map(|chunk| chunk.map_err(io::Error::other));
                image = Some(
                    state
                        .images
                        .store(
                            content,
                            &filename,
                            &content_type,
                            title.take(),
                            description.take(),
                            &principal,
                        )
                        .await?,
                );
            }
            _ => {}
        }
    }

    let mut image = image.ok_or_else(|| AppError::bad_request("missing `file` field"))?;

    if title.is_some() || description.is_some() {
        if let Err(err) = apply_trailing_metadata(&state, &mut image, title, description).await {
            let _ = state.images.delete(&image).await;
            return Err(err);
        }
    }

    let location = image_href(&state.base_url, &image.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(decorate(image, &state.base_url)),
    ))
}

async fn apply_trailing_metadata(
    state: &AppState,
    image: &mut Image,
    title: Option<String>,
    description: Option<String>,
) -> Result<(), AppError> {
    if let Some(title) = title {
        validate_min_length("title", &title)?;
        image.title = Some(title);
    }
    if let Some(description) = description {
        validate_min_length("description", &description)?;
        image.description = Some(description);
    }
    let saved = state.images.save(image).await?;
    image.updated = saved.updated;
    Ok(())
}

/// GET `/images/{id}`
pub async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Image>, AppError> {
    state
        .images
        .get(id)
        .await?
        .map(|image| Json(decorate(image, &state.base_url)))
        .ok_or_else(|| AppError::not_found("image not found"))
}

/// DELETE `/images/{id}` — owner only; releases stored content first.
pub async fn delete_image(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let image = state
        .images
        .get_owned(id, &principal)
        .await?
        .ok_or_else(|| AppError::not_found("image not found"))?;
    state.images.delete(&image).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/images/{id}/title` — 404 covers both a missing image and an image
/// that has no title.
pub async fn get_title(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<String>, AppError> {
    state
        .images
        .get(id)
        .await?
        .and_then(|image| image.title)
        .map(Json)
        .ok_or_else(|| AppError::not_found("image not found"))
}

/// PUT `/images/{id}/title` — owner only, min length 3.
pub async fn put_title(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    title: String,
) -> Result<Json<String>, AppError> {
    validate_min_length("title", &title)?;
    let mut image = state
        .images
        .get_owned(id, &principal)
        .await?
        .ok_or_else(|| AppError::not_found("image not found"))?;
    image.title = Some(title.clone());
    state.images.save(&image).await?;
    Ok(Json(title))
}

/// DELETE `/images/{id}/title` — owner only; clears the title.
pub async fn delete_title(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let mut image = state
        .images
        .get_owned(id, &principal)
        .await?
        .ok_or_else(|| AppError::not_found("image not found"))?;
    image.title = None;
    state.images.save(&image).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/images/{id}/description` — 404 covers both a missing image and an
/// image that has no description.
pub async fn get_description(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<String>, AppError> {
    state
        .images
        .get(id)
        .await?
        .and_then(|image| image.description)
        .map(Json)
        .ok_or_else(|| AppError::not_found("image not found"))
}

/// PUT `/images/{id}/description` — owner only, min length 3.
pub async fn put_description(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    description: String,
) -> Result<Json<String>, AppError> {
    validate_min_length("description", &description)?;
    let mut image = state
        .images
        .get_owned(id, &principal)
        .await?
        .ok_or_else(|| AppError::not_found("image not found"))?;
    image.description = Some(description.clone());
    state.images.save(&image).await?;
    Ok(Json(description))
}

/// DELETE `/images/{id}/description` — owner only; clears the description.
pub async fn delete_description(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let mut image = state
        .images
        .get_owned(id, &principal)
        .await?
        .ok_or_else(|| AppError::not_found("image not found"))?;
    image.description = None;
    state.images.save(&image).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/images/{id}/content` — stream the stored bytes back out with the
/// recorded MIME type and an attachment disposition carrying the original
/// filename.
pub async fn get_content(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let image = state
        .images
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("image not found"))?;
    let file = state.images.retrieve(&image).await?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&image.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    let disposition = format!("attachment; filename=\"{}\"", image.name.replace('"', ""));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AppState,
        auth::{AuthGate, Claims},
        routes::routes::routes,
        services::{
            image_service::ImageService,
            storage_service::StorageService,
            test_support::{test_config, test_pool},
            user_service::UserService,
        },
    };
    use axum::{Router, body::to_bytes, http::Request};
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header as JwtHeader};
    use tower::ServiceExt;

    const BOUNDARY: &str = "gallery-form-boundary";

    /// Full router over a throwaway database, plus a bearer token for a
    /// caller the user directory has not seen yet.
    async fn test_app() -> (Router, String) {
        let cfg = test_config();
        let pool = test_pool().await;
        let state = AppState {
            db: pool.clone(),
            users: UserService::new(pool.clone()),
            images: ImageService::new(pool, StorageService::new(&cfg)),
            auth: AuthGate::new(&cfg),
            base_url: cfg.base_url.clone(),
            upload_root: cfg.upload_root(),
        };
        let claims = Claims {
            sub: "ext-1".into(),
            name: Some("Alice".into()),
            exp: (Utc::now().timestamp() + 3600) as usize,
            iss: None,
            aud: None,
        };
        let token = jsonwebtoken::encode(
            &JwtHeader::default(),
            &claims,
            &EncodingKey::from_secret(cfg.jwt_secret.as_bytes()),
        )
        .unwrap();
        (routes(cfg.max_upload_bytes).with_state(state), token)
    }

    fn text_part(name: &str, value: &str) -> Vec<u8> {
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        )
        .into_bytes()
    }

    fn file_part(filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
        let mut part = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        part.extend_from_slice(data);
        part.extend_from_slice(b"\r\n");
        part
    }

    fn closing() -> Vec<u8> {
        format!("--{BOUNDARY}--\r\n").into_bytes()
    }

    fn upload_request(token: Option<&str>, body: Vec<u8>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/images").header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn uploads_larger_than_two_megabytes_are_accepted() {
        let (app, token) = test_app().await;
        let photo = vec![0xab_u8; 3 * 1024 * 1024];
        let mut body = text_part("title", "Sunset");
        body.extend(file_part("photo.jpg", "image/jpeg", &photo));
        body.extend(closing());

        let response = app
            .clone()
            .oneshot(upload_request(Some(&token), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().contains_key(header::LOCATION));
        let created = json_body(response).await;
        assert_eq!(created["title"], "Sunset");

        // the stored bytes come back out intact
        let uri = format!("/images/{}/content", created["id"].as_str().unwrap());
        let response = app.oneshot(get_request(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let downloaded = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(downloaded.len(), photo.len());
    }

    #[tokio::test]
    async fn disallowed_content_type_is_unsupported_media() {
        let (app, token) = test_app().await;
        let mut body = file_part("notes.txt", "text/plain", b"not an image");
        body.extend(closing());

        let response = app
            .oneshot(upload_request(Some(&token), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn metadata_fields_after_the_file_are_applied() {
        let (app, token) = test_app().await;
        let mut body = file_part("photo.png", "image/png", &[1_u8; 64]);
        body.extend(text_part("title", "Harbour"));
        body.extend(text_part("description", "Boats at dusk"));
        body.extend(closing());

        let response = app
            .oneshot(upload_request(Some(&token), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["title"], "Harbour");
        assert_eq!(created["description"], "Boats at dusk");
    }

    #[tokio::test]
    async fn invalid_trailing_title_rolls_the_upload_back() {
        let (app, token) = test_app().await;
        let mut body = file_part("photo.png", "image/png", &[1_u8; 64]);
        body.extend(text_part("title", "ab"));
        body.extend(closing());

        let response = app
            .clone()
            .oneshot(upload_request(Some(&token), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.oneshot(get_request("/images")).await.unwrap();
        assert_eq!(json_body(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn upload_requires_a_bearer_token() {
        let (app, _) = test_app().await;
        let mut body = file_part("photo.png", "image/png", &[1_u8; 8]);
        body.extend(closing());

        let response = app.oneshot(upload_request(None, body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bodies_over_the_configured_limit_are_payload_too_large() {
        let (app, token) = test_app().await;
        // test config caps bodies at 8 MiB
        let oversized = vec![0_u8; 9 * 1024 * 1024];
        let mut body = file_part("big.jpg", "image/jpeg", &oversized);
        body.extend(closing());

        let response = app
            .oneshot(upload_request(Some(&token), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn absent_properties_read_as_not_found() {
        let (app, token) = test_app().await;
        let mut body = file_part("photo.png", "image/png", &[1_u8; 16]);
        body.extend(closing());

        let response = app
            .clone()
            .oneshot(upload_request(Some(&token), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        let id = created["id"].as_str().unwrap().to_string();

        for property in ["title", "description"] {
            let response = app
                .clone()
                .oneshot(get_request(&format!("/images/{id}/{property}")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{property}");
        }

        let put = Request::builder()
            .method("PUT")
            .uri(format!("/images/{id}/title"))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::from("Sunrise"))
            .unwrap();
        let response = app.clone().oneshot(put).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(get_request(&format!("/images/{id}/title")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!("Sunrise"));
    }
}
