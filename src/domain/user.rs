use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;

/// A registered account holder.
///
/// The password arrives already hashed; hashing and credential checks live
/// with the authentication boundary, not in this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub login: String,
    pub password_hash: String,
    pub registered_at: DateTime<Utc>,
}
