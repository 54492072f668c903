//! In-memory identity store used by the core tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use uuid::Uuid;

use super::identity::{CreateOutcome, IdentityStore, NewUser, UserChanges, UserRecord};
use super::password::hash_password;
use super::role::RoleFlags;

/// Active user record with a hashed password, ready to insert.
pub(crate) fn user(email: &str, password: &str, flags: RoleFlags) -> UserRecord {
    let now = Utc::now();
    UserRecord {
        id: Uuid::new_v4(),
        email: email.to_string(),
        display_name: "Test User".to_string(),
        password_hash: hash_password(password).expect("hash password"),
        timezone: "UTC".to_string(),
        flags,
        is_active: true,
        access_expires_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[derive(Default)]
pub(crate) struct MemoryIdentityStore {
    users: Mutex<Vec<UserRecord>>,
}

impl MemoryIdentityStore {
    pub(crate) fn insert(&self, record: UserRecord) {
        self.users.lock().expect("lock").push(record);
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        // Byte-exact match, like the unique index in the real store.
        Ok(self
            .users
            .lock()
            .expect("lock")
            .iter()
            .find(|record| record.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        Ok(self
            .users
            .lock()
            .expect("lock")
            .iter()
            .find(|record| record.id == id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<UserRecord>> {
        Ok(self.users.lock().expect("lock").clone())
    }

    async fn create(&self, user: NewUser) -> Result<CreateOutcome> {
        let mut users = self.users.lock().expect("lock");
        if users.iter().any(|record| record.email == user.email) {
            return Ok(CreateOutcome::DuplicateEmail);
        }
        let now = Utc::now();
        let record = UserRecord {
            id: Uuid::new_v4(),
            email: user.email,
            display_name: user.display_name,
            password_hash: user.password_hash,
            timezone: user.timezone,
            flags: user.flags,
            is_active: user.is_active,
            access_expires_at: user.access_expires_at,
            created_at: now,
            updated_at: now,
        };
        users.push(record.clone());
        Ok(CreateOutcome::Created(record))
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<Option<UserRecord>> {
        let mut users = self.users.lock().expect("lock");
        let Some(record) = users.iter_mut().find(|record| record.id == id) else {
            return Ok(None);
        };
        if let Some(display_name) = changes.display_name {
            record.display_name = display_name;
        }
        if let Some(timezone) = changes.timezone {
            record.timezone = timezone;
        }
        if let Some(password_hash) = changes.password_hash {
            record.password_hash = password_hash;
        }
        if let Some(flags) = changes.flags {
            record.flags = flags;
        }
        if let Some(is_active) = changes.is_active {
            record.is_active = is_active;
        }
        if let Some(expiry) = changes.access_expires_at {
            record.access_expires_at = expiry;
        }
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut users = self.users.lock().expect("lock");
        let before = users.len();
        users.retain(|record| record.id != id);
        Ok(users.len() < before)
    }
}
