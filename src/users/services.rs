use std::path::PathBuf;

use tracing::{info, instrument, warn};

use super::repo::{StoreError, UserStore};
use super::repo_types::{NewUser, PublicUser};
use crate::error::{AppError, AppResult};
use crate::storage::MediaUploader;

const DUPLICATE_MSG: &str = "User with email or username already exists";

/// Parsed registration request. Files are already staged on local disk.
#[derive(Debug, Default, Clone)]
pub struct RegisterForm {
    pub fullname: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub avatar: Option<PathBuf>,
    pub cover_image: Option<PathBuf>,
}

struct ValidFields<'a> {
    fullname: &'a str,
    username: String,
    email: String,
    password: &'a str,
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn validate(form: &RegisterForm) -> AppResult<ValidFields<'_>> {
    match (
        non_blank(&form.fullname),
        non_blank(&form.username),
        non_blank(&form.email),
        non_blank(&form.password),
    ) {
        (Some(fullname), Some(username), Some(email), Some(_)) => Ok(ValidFields {
            fullname,
            username: username.to_lowercase(),
            email: email.to_lowercase(),
            // passwords are stored as typed, surrounding whitespace included
            password: form.password.as_deref().unwrap_or_default(),
        }),
        _ => Err(AppError::Validation("All fields are required".into())),
    }
}

fn store_error(e: StoreError) -> AppError {
    match e {
        StoreError::Duplicate => AppError::Conflict(DUPLICATE_MSG.into()),
        StoreError::Other(e) => AppError::Unhandled(e),
    }
}

/// Registers a user: validate, reject duplicates, upload media, persist,
/// and return the sanitized record.
#[instrument(skip_all)]
pub async fn register_user(
    users: &dyn UserStore,
    media: &dyn MediaUploader,
    form: RegisterForm,
) -> AppResult<PublicUser> {
    let fields = validate(&form)?;

    if users
        .find_by_username_or_email(&fields.username, &fields.email)
        .await
        .map_err(store_error)?
        .is_some()
    {
        warn!(username = %fields.username, email = %fields.email, "user already exists");
        return Err(AppError::Conflict(DUPLICATE_MSG.into()));
    }

    let avatar_path = form
        .avatar
        .as_deref()
        .ok_or_else(|| AppError::Validation("Avatar file is required".into()))?;

    let avatar = media
        .upload(avatar_path)
        .await
        .ok_or_else(|| AppError::Upload("Failed to upload avatar".into()))?;

    let cover_image_url = match form.cover_image.as_deref() {
        Some(path) => match media.upload(path).await {
            Some(cover) => cover.url,
            None => {
                warn!("cover image upload failed; registering without it");
                String::new()
            }
        },
        None => String::new(),
    };

    let created = users
        .create(NewUser {
            username: fields.username,
            email: fields.email,
            fullname: fields.fullname.to_string(),
            password: fields.password.to_string(),
            avatar_url: avatar.url,
            cover_image_url,
        })
        .await
        .map_err(store_error)?;

    let user = users
        .find_public_by_id(created.id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| {
            AppError::Internal("Something went wrong while registering the user".into())
        })?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeUploader, MemoryUserStore};
    use std::path::Path;

    fn staged(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn form(dir: &tempfile::TempDir) -> RegisterForm {
        RegisterForm {
            fullname: Some("  Jane Doe ".into()),
            username: Some(" JDoe ".into()),
            email: Some("Jane@Example.com".into()),
            password: Some("hunter22".into()),
            avatar: Some(staged(dir, "avatar.png", "avatar-1")),
            cover_image: None,
        }
    }

    #[tokio::test]
    async fn blank_or_missing_fields_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryUserStore::default();
        let media = FakeUploader::default();

        let blanks: [fn(&mut RegisterForm); 8] = [
            |f| f.fullname = None,
            |f| f.username = None,
            |f| f.email = None,
            |f| f.password = None,
            |f| f.fullname = Some("   ".into()),
            |f| f.username = Some("\t".into()),
            |f| f.email = Some("".into()),
            |f| f.password = Some(" \n ".into()),
        ];
        for blank in blanks {
            let mut f = form(&dir);
            blank(&mut f);
            let err = register_user(&store, &media, f).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(ref m) if m == "All fields are required"));
        }
        assert_eq!(store.create_calls(), 0);
        assert_eq!(media.upload_calls(), 0);
    }

    #[tokio::test]
    async fn duplicate_username_or_email_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryUserStore::default();
        let media = FakeUploader::default();
        register_user(&store, &media, form(&dir)).await.unwrap();

        let mut same_username = form(&dir);
        same_username.email = Some("other@example.com".into());
        let err = register_user(&store, &media, same_username).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let mut same_email = form(&dir);
        same_email.username = Some("someone-else".into());
        same_email.email = Some(" JANE@example.COM ".into());
        let err = register_user(&store, &media, same_email).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // conflict wins even without an avatar
        let mut no_avatar = form(&dir);
        no_avatar.avatar = None;
        let err = register_user(&store, &media, no_avatar).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.create_calls(), 1);
    }

    #[tokio::test]
    async fn missing_avatar_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryUserStore::default();
        let mut f = form(&dir);
        f.avatar = None;
        let err = register_user(&store, &FakeUploader::default(), f).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "Avatar file is required"));
    }

    #[tokio::test]
    async fn failed_avatar_upload_never_creates_user() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryUserStore::default();
        let media = FakeUploader::default();
        let mut f = form(&dir);
        f.avatar = Some(staged(&dir, "bad.png", "fail"));
        let avatar = f.avatar.clone().unwrap();

        let err = register_user(&store, &media, f).await.unwrap_err();
        assert!(matches!(err, AppError::Upload(ref m) if m == "Failed to upload avatar"));
        assert_eq!(store.create_calls(), 0);
        assert!(!avatar.exists());
    }

    #[tokio::test]
    async fn without_cover_image_url_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryUserStore::default();
        let user = register_user(&store, &FakeUploader::default(), form(&dir))
            .await
            .unwrap();
        assert_eq!(user.avatar_url, "https://media.test/avatar-1");
        assert_eq!(user.cover_image_url, "");
    }

    #[tokio::test]
    async fn with_cover_image_both_urls_are_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryUserStore::default();
        let mut f = form(&dir);
        f.cover_image = Some(staged(&dir, "cover.jpg", "cover-1"));
        let user = register_user(&store, &FakeUploader::default(), f).await.unwrap();
        assert_eq!(user.avatar_url, "https://media.test/avatar-1");
        assert_eq!(user.cover_image_url, "https://media.test/cover-1");
    }

    #[tokio::test]
    async fn failed_cover_upload_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryUserStore::default();
        let mut f = form(&dir);
        f.cover_image = Some(staged(&dir, "cover.jpg", "fail"));
        let user = register_user(&store, &FakeUploader::default(), f).await.unwrap();
        assert_eq!(user.cover_image_url, "");
        assert_eq!(store.create_calls(), 1);
    }

    #[tokio::test]
    async fn registered_user_round_trips_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryUserStore::default();
        let user = register_user(&store, &FakeUploader::default(), form(&dir))
            .await
            .unwrap();

        let fetched = store.find_public_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(fetched, user);
        assert_eq!(fetched.username, "jdoe");
        assert_eq!(fetched.email, "jane@example.com");
        assert_eq!(fetched.fullname, "Jane Doe");

        let stored = store.get(user.id).unwrap();
        assert_ne!(stored.password_hash, "hunter22");
        assert!(stored.is_password_match("hunter22").unwrap());
        assert!(stored.refresh_token_hash.is_none());
    }

    #[tokio::test]
    async fn racing_duplicate_maps_to_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryUserStore::default();
        register_user(&store, &FakeUploader::default(), form(&dir))
            .await
            .unwrap();

        store.hide_from_lookup(true);
        let err = register_user(&store, &FakeUploader::default(), form(&dir))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn vanished_record_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryUserStore::default();
        store.lose_created(true);
        let err = register_user(&store, &FakeUploader::default(), form(&dir))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn validate_normalizes_identity_fields() {
        let f = RegisterForm {
            fullname: Some(" Jane ".into()),
            username: Some(" MiXeD ".into()),
            email: Some(" A@B.C ".into()),
            password: Some(" pw ".into()),
            avatar: Some(Path::new("x").to_path_buf()),
            cover_image: None,
        };
        let v = validate(&f).unwrap();
        assert_eq!(v.fullname, "Jane");
        assert_eq!(v.username, "mixed");
        assert_eq!(v.email, "a@b.c");
        assert_eq!(v.password, " pw ");
    }
}
