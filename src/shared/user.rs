//! User and branch records with their API projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role string stored on a user row.
pub const ROLE_USER: &str = "user";
/// Administrator role.
pub const ROLE_ADMIN: &str = "admin";

/// Branch record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Branch {
    pub id: Uuid,
    /// Branch name (unique, trimmed)
    pub name: String,
    /// Optional short code (uppercased, unique when present)
    pub code: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User record as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// Email address (unique, trimmed)
    pub email: String,
    /// Bcrypt hash, never serialized into responses
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// `"user"` or `"admin"`
    pub role: String,
    pub branch_id: Uuid,
    pub branch_name: String,
    pub active: bool,
    /// Public URL of the profile image, empty when unset
    pub profile_image: String,
    pub profession: String,
    /// Bcrypt hash of the outstanding password-reset OTP
    #[serde(skip_serializing)]
    pub reset_otp: Option<String>,
    #[serde(skip_serializing)]
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Safe projection for API responses
    pub fn public(&self) -> UserPublic {
        UserPublic {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
            branch_id: self.branch_id,
            branch_name: self.branch_name.clone(),
            profile_image: self.profile_image.clone(),
            profession: self.profession.clone(),
            active: self.active,
        }
    }

    /// Minimal projection used when hydrating messages and conversations
    pub fn brief(&self) -> UserBrief {
        UserBrief {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            profile_image: self.profile_image.clone(),
        }
    }
}

/// User projection without credentials or reset state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPublic {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub branch_id: Uuid,
    pub branch_name: String,
    pub profile_image: String,
    pub profession: String,
    pub active: bool,
}

/// Minimal user projection (name, email, avatar)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBrief {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub profile_image: String,
}

/// Online/last-seen status for a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStatus {
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}
