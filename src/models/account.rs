//! Account model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::version::VersionToken;

/// Opaque account identifier handed over by the identity layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for AccountId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Account {
    #[sqlx(rename = "account_id")]
    pub id: AccountId,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    /// Hash produced by the caller; never leaves the core in serialized form
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub last_modified_at: DateTime<Utc>,
}

impl Account {
    pub fn version(&self) -> VersionToken {
        VersionToken::new(self.last_modified_at)
    }
}

/// Fields for registering a new account
#[derive(Debug, Clone, Deserialize)]
pub struct AccountDraft {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    pub password_hash: String,
}

impl AccountDraft {
    pub fn into_account(self, id: AccountId, now: DateTime<Utc>) -> Account {
        Account {
            id,
            username: self.username,
            email: self.email,
            is_admin: self.is_admin,
            password_hash: self.password_hash,
            last_modified_at: VersionToken::new(now).as_datetime(),
        }
    }
}

/// Profile edit submitted by an administrator
#[derive(Debug, Clone, Deserialize)]
pub struct AccountUpdate {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    /// `None` keeps the stored hash
    #[serde(default)]
    pub password_hash: Option<String>,
}

impl AccountUpdate {
    pub fn into_patch(self, modified_at: VersionToken) -> AccountPatch {
        AccountPatch {
            username: self.username,
            email: self.email,
            is_admin: self.is_admin,
            password_hash: self.password_hash,
            modified_at,
        }
    }
}

/// Mutation applied by a guarded account update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountPatch {
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub password_hash: Option<String>,
    pub modified_at: VersionToken,
}

impl AccountPatch {
    pub fn apply_to(&self, account: &mut Account) {
        account.username = self.username.clone();
        account.email = self.email.clone();
        account.is_admin = self.is_admin;
        if let Some(ref hash) = self.password_hash {
            account.password_hash = hash.clone();
        }
        account.last_modified_at = self.modified_at.as_datetime();
    }
}
