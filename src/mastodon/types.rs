//! Serde models for the slice of the Mastodon API this bot uses.

use serde::Deserialize;

/// An account as it appears inside notifications and follower pages.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub id: String,
    /// Fully qualified account name ("alice" locally, "alice@other.example" remote).
    pub acct: String,
    /// Local part of the account name.
    #[serde(default)]
    pub username: String,
}

/// A status referenced by a mention notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    pub id: String,
    /// HTML body of the status.
    #[serde(default)]
    pub content: String,
}

/// One entry from `GET /api/v1/notifications`.
///
/// Known kinds: mention, follow, favourite, reblog, poll, follow_request.
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub account: Option<Account>,
    pub status: Option<Status>,
}

/// Response body of `GET /api/v1/accounts/verify_credentials`.
#[derive(Debug, Deserialize)]
pub struct CredentialAccount {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mention_notification() {
        let json = r#"{
            "id": "34975861",
            "type": "mention",
            "created_at": "2019-11-23T07:49:02.064Z",
            "account": {"id": "971724", "acct": "alice@other.example", "username": "alice"},
            "status": {"id": "103270115826048975", "content": "<p>toot the horn</p>"}
        }"#;
        let note: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(note.kind, "mention");
        assert_eq!(note.account.as_ref().unwrap().acct, "alice@other.example");
        assert_eq!(note.status.as_ref().unwrap().content, "<p>toot the horn</p>");
    }

    #[test]
    fn test_parse_follow_notification_without_status() {
        let json = r#"{
            "id": "34975535",
            "type": "follow",
            "account": {"id": "971724", "acct": "bob"}
        }"#;
        let note: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(note.kind, "follow");
        assert!(note.status.is_none());
        assert_eq!(note.account.unwrap().acct, "bob");
    }

    #[test]
    fn test_parse_notification_list_skips_nothing() {
        let json = r#"[
            {"id": "3", "type": "favourite", "account": {"id": "1", "acct": "carol"}},
            {"id": "2", "type": "follow", "account": {"id": "2", "acct": "dan"}}
        ]"#;
        let notes: Vec<Notification> = serde_json::from_str(json).unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].kind, "favourite");
    }
}
