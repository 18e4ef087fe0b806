//! In-memory stand-ins for the store and the media host, used by unit and router tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::password::hash_password;
use crate::storage::{remove_if_exists, MediaUploader, UploadedMedia};
use crate::users::repo::{StoreError, UserStore};
use crate::users::repo_types::{NewUser, PublicUser, User};

/// Hashes on create and enforces username/email uniqueness like the real table.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
    create_calls: AtomicUsize,
    hide_from_lookup: AtomicBool,
    lose_created: AtomicBool,
}

impl MemoryUserStore {
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Make the existence check miss, as if a concurrent insert had not landed yet.
    pub fn hide_from_lookup(&self, on: bool) {
        self.hide_from_lookup.store(on, Ordering::SeqCst);
    }

    /// Make sanitized lookups find nothing.
    pub fn lose_created(&self, on: bool) {
        self.lose_created.store(on, Ordering::SeqCst);
    }

    pub fn get(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        if self.hide_from_lookup.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.username == username || u.email == email)
            .cloned())
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let password_hash = hash_password(&new_user.password)?;
        let mut users = self.users.lock().unwrap();
        if users
            .iter()
            .any(|u| u.username == new_user.username || u.email == new_user.email)
        {
            return Err(StoreError::Duplicate);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            fullname: new_user.fullname,
            avatar_url: new_user.avatar_url,
            cover_image_url: new_user.cover_image_url,
            password_hash,
            refresh_token_hash: None,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_public_by_id(&self, id: Uuid) -> Result<Option<PublicUser>, StoreError> {
        if self.lose_created.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.get(id).map(PublicUser::from))
    }
}

/// Reports `https://media.test/<file contents>` for each upload, or failure
/// when the file reads `fail`. Removes the file either way.
#[derive(Default)]
pub struct FakeUploader {
    upload_calls: AtomicUsize,
}

impl FakeUploader {
    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaUploader for FakeUploader {
    async fn upload(&self, local_path: &Path) -> Option<UploadedMedia> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let body = tokio::fs::read_to_string(local_path).await.ok();
        remove_if_exists(local_path).await;
        match body.as_deref() {
            None | Some("fail") => None,
            Some(body) => Some(UploadedMedia {
                url: format!("https://media.test/{body}"),
            }),
        }
    }
}
