use std::path::{Path, PathBuf};

use axum::{
    extract::{
        multipart::{Field, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    routing::post,
    Router,
};
use tracing::{debug, instrument};

use super::repo_types::PublicUser;
use super::services::{register_user, RegisterForm};
use crate::{
    error::{AppError, AppResult},
    response::ApiResponse,
    state::AppState,
    uploads::StagedFiles,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

/// POST /register (multipart)
/// Text fields: fullname, username, email, password. Files: avatar (required), coverImage.
#[instrument(skip(state, mp))]
pub async fn register(
    State(state): State<AppState>,
    mp: Result<Multipart, MultipartRejection>,
) -> AppResult<ApiResponse<PublicUser>> {
    let mut mp = mp.map_err(|rejection| AppError::Validation(rejection.body_text()))?;

    // the uploader removes what it was handed; dropping this removes the rest
    let mut staged = StagedFiles::default();
    let form = read_form(&state.config.upload_dir, &mut mp, &mut staged).await?;
    let user = register_user(state.users.as_ref(), state.media.as_ref(), form).await?;
    Ok(ApiResponse::new(
        StatusCode::CREATED,
        user,
        "User registered successfully",
    ))
}

async fn read_form(
    upload_dir: &Path,
    mp: &mut Multipart,
    staged: &mut StagedFiles,
) -> AppResult<RegisterForm> {
    let mut form = RegisterForm::default();
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "fullname" => form.fullname = Some(text(field).await?),
            "username" => form.username = Some(text(field).await?),
            "email" => form.email = Some(text(field).await?),
            "password" => form.password = Some(text(field).await?),
            "avatar" if form.avatar.is_none() => {
                form.avatar = stage(upload_dir, field, staged).await?;
            }
            "coverImage" if form.cover_image.is_none() => {
                form.cover_image = stage(upload_dir, field, staged).await?;
            }
            other => debug!(field = %other, "ignoring multipart field"),
        }
    }
    Ok(form)
}

async fn text(field: Field<'_>) -> AppResult<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(e.body_text()))
}

/// Stages a file part on disk. An empty part with no file name counts as absent.
async fn stage(
    upload_dir: &Path,
    field: Field<'_>,
    staged: &mut StagedFiles,
) -> AppResult<Option<PathBuf>> {
    let file_name = field.file_name().map(str::to_string);
    let content_type = field.content_type().map(str::to_string);
    let body = field
        .bytes()
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?;
    if body.is_empty() && file_name.as_deref().unwrap_or_default().is_empty() {
        return Ok(None);
    }
    let path = staged
        .stage(upload_dir, body, content_type.as_deref(), file_name.as_deref())
        .await?;
    Ok(Some(path))
}
