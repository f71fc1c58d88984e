use chrono::{DateTime, Utc};
use serde::Serialize;

/// Credential view used by login/registration; never leaves the auth
/// handlers.
#[derive(Debug, Clone)]
pub struct UserAuth {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
}

/// One row of a user's QR history, shaped for the JSON history listing.
/// Styling tags stay as their wire strings here; rows written before a
/// style was retired should still list rather than fail to decode.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QrHistoryEntry {
    pub id: i64,
    pub kind: String,
    pub display_text: String,
    pub color: String,
    pub size: i64,
    pub frame: Option<String>,
    pub logo_url: Option<String>,
    pub shape: Option<String>,
    pub created_at: DateTime<Utc>,
}
