use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User record as returned by the backend's auth endpoints.
///
/// The backend omits `credits` for accounts that never had a balance;
/// a missing balance is read as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub id: String,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub credits: u32,
    #[serde(default)]
    pub streak: u32,
    #[serde(rename = "studiedToday", default)]
    pub studied_today: u32,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    /// Minimal user with only an identifier and a balance.
    pub fn new(id: impl Into<String>, credits: u32) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            email: None,
            credits,
            streak: 0,
            studied_today: 0,
            created_at: None,
            updated_at: None,
        }
    }

    /// Name to show in prompts, falling back to email then id.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_user() {
        let json = r#"{"id":"u_123","displayName":"Ada","email":"ada@example.com","credits":42,"streak":3,"studiedToday":7,"createdAt":"2026-01-02T03:04:05Z","updatedAt":"2026-02-03T04:05:06Z"}"#;
        let user: User = serde_json::from_str(json).expect("Failed to parse user test JSON");
        assert_eq!(user.id, "u_123");
        assert_eq!(user.display_name.as_deref(), Some("Ada"));
        assert_eq!(user.credits, 42);
        assert_eq!(user.streak, 3);
        assert_eq!(user.studied_today, 7);
        assert!(user.created_at.is_some());
    }

    #[test]
    fn test_missing_credits_reads_as_zero() {
        let user: User = serde_json::from_str(r#"{"id":"u_1"}"#).unwrap();
        assert_eq!(user.credits, 0);
        assert_eq!(user.streak, 0);
        assert!(user.updated_at.is_none());
    }

    #[test]
    fn test_label_fallbacks() {
        let mut user = User::new("u_1", 0);
        assert_eq!(user.label(), "u_1");
        user.email = Some("a@b.c".to_string());
        assert_eq!(user.label(), "a@b.c");
        user.display_name = Some(String::new());
        assert_eq!(user.label(), "a@b.c");
        user.display_name = Some("Ada".to_string());
        assert_eq!(user.label(), "Ada");
    }
}
