use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Profile data owned by the profile service; read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub user_id: String,
    pub gender: Option<String>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>, gender: Option<&str>) -> Self {
        Self {
            user_id: user_id.into(),
            gender: gender.map(str::to_string),
        }
    }
}
