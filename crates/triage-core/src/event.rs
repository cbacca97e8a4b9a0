//! Webhook event normalization.
//!
//! Turns an `(event type, raw JSON body)` pair into a tagged
//! [`WebhookEvent`]. Only `issues` events with action `opened`, `edited`,
//! or `reopened` become [`WebhookEvent::Issue`]; everything else maps to
//! [`WebhookEvent::Ignored`] with a reason, which callers acknowledge
//! without side effects.

use serde::Deserialize;

use crate::models::{IssueRecord, RepoRef};

/// Event type header value for issue changes.
pub const ISSUES_EVENT: &str = "issues";

/// Issue actions that trigger the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueAction {
    Opened,
    Edited,
    Reopened,
}

impl IssueAction {
    fn parse(action: &str) -> Option<Self> {
        match action {
            "opened" => Some(Self::Opened),
            "edited" => Some(Self::Edited),
            "reopened" => Some(Self::Reopened),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Edited => "edited",
            Self::Reopened => "reopened",
        }
    }
}

/// A qualifying issue event, validated and normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueEvent {
    pub action: IssueAction,
    pub issue: IssueRecord,
    /// Installation reference used to obtain tracker credentials in
    /// live-window mode.
    pub installation_id: Option<u64>,
}

/// Why an event produced no pipeline activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    UnsupportedEvent(String),
    UnsupportedAction(String),
    MissingIssue,
    MissingRepository,
    MalformedPayload(String),
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedEvent(e) => write!(f, "unsupported event type '{}'", e),
            Self::UnsupportedAction(a) => write!(f, "unsupported issues action '{}'", a),
            Self::MissingIssue => write!(f, "payload has no issue object"),
            Self::MissingRepository => write!(f, "payload has no repository object"),
            Self::MalformedPayload(e) => write!(f, "malformed payload: {}", e),
        }
    }
}

/// Normalized webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    Issue(IssueEvent),
    Ignored(IgnoreReason),
}

#[derive(Deserialize)]
struct RawIssuesPayload {
    action: Option<String>,
    issue: Option<RawIssue>,
    repository: Option<RawRepository>,
    installation: Option<RawInstallation>,
}

#[derive(Deserialize)]
struct RawIssue {
    number: u64,
    title: Option<String>,
    body: Option<String>,
    state: Option<String>,
    user: Option<RawAccount>,
}

#[derive(Deserialize)]
struct RawRepository {
    name: Option<String>,
    owner: Option<RawAccount>,
}

#[derive(Deserialize)]
struct RawAccount {
    login: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawInstallation {
    id: u64,
}

/// Normalize a webhook delivery.
///
/// Never fails: malformed or irrelevant input becomes
/// [`WebhookEvent::Ignored`].
pub fn normalize(event_type: &str, body: &[u8]) -> WebhookEvent {
    if event_type != ISSUES_EVENT {
        return WebhookEvent::Ignored(IgnoreReason::UnsupportedEvent(event_type.to_string()));
    }

    let payload: RawIssuesPayload = match serde_json::from_slice(body) {
        Ok(p) => p,
        Err(e) => return WebhookEvent::Ignored(IgnoreReason::MalformedPayload(e.to_string())),
    };

    let Some(issue) = payload.issue else {
        return WebhookEvent::Ignored(IgnoreReason::MissingIssue);
    };
    let Some(repository) = payload.repository else {
        return WebhookEvent::Ignored(IgnoreReason::MissingRepository);
    };

    let action_str = payload.action.unwrap_or_default();
    let Some(action) = IssueAction::parse(&action_str) else {
        return WebhookEvent::Ignored(IgnoreReason::UnsupportedAction(action_str));
    };

    let owner = repository
        .owner
        .and_then(|o| o.login.or(o.name))
        .unwrap_or_else(|| "unknown".to_string());
    let name = repository.name.unwrap_or_else(|| "unknown".to_string());

    WebhookEvent::Issue(IssueEvent {
        action,
        issue: IssueRecord {
            repo: RepoRef::new(owner, name),
            number: issue.number,
            title: issue.title.unwrap_or_default(),
            body: issue.body.unwrap_or_default(),
            state: issue.state.unwrap_or_else(|| "open".to_string()),
            author: issue
                .user
                .and_then(|u| u.login)
                .unwrap_or_else(|| "unknown".to_string()),
        },
        installation_id: payload.installation.map(|i| i.id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(action: &str) -> Vec<u8> {
        json!({
            "action": action,
            "issue": {
                "number": 42,
                "title": "Crash on startup",
                "body": null,
                "state": "open",
                "user": { "login": "octocat" }
            },
            "repository": { "name": "widgets", "owner": { "login": "acme" } },
            "installation": { "id": 987 }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn test_opened_issue_is_normalized() {
        let event = normalize("issues", &payload("opened"));
        let WebhookEvent::Issue(ev) = event else {
            panic!("expected issue event, got {:?}", event);
        };
        assert_eq!(ev.action, IssueAction::Opened);
        assert_eq!(ev.issue.repo, RepoRef::new("acme", "widgets"));
        assert_eq!(ev.issue.number, 42);
        assert_eq!(ev.issue.body, "");
        assert_eq!(ev.issue.author, "octocat");
        assert_eq!(ev.installation_id, Some(987));
    }

    #[test]
    fn test_edited_and_reopened_qualify() {
        for action in ["edited", "reopened"] {
            assert!(matches!(
                normalize("issues", &payload(action)),
                WebhookEvent::Issue(_)
            ));
        }
    }

    #[test]
    fn test_other_actions_ignored() {
        assert_eq!(
            normalize("issues", &payload("closed")),
            WebhookEvent::Ignored(IgnoreReason::UnsupportedAction("closed".into()))
        );
        assert!(matches!(
            normalize("issues", &payload("labeled")),
            WebhookEvent::Ignored(IgnoreReason::UnsupportedAction(_))
        ));
    }

    #[test]
    fn test_other_event_types_ignored() {
        assert_eq!(
            normalize("pull_request", &payload("opened")),
            WebhookEvent::Ignored(IgnoreReason::UnsupportedEvent("pull_request".into()))
        );
    }

    #[test]
    fn test_missing_issue_or_repository() {
        let no_issue = json!({ "action": "opened", "repository": { "name": "r" } }).to_string();
        assert_eq!(
            normalize("issues", no_issue.as_bytes()),
            WebhookEvent::Ignored(IgnoreReason::MissingIssue)
        );

        let no_repo = json!({ "action": "opened", "issue": { "number": 1 } }).to_string();
        assert_eq!(
            normalize("issues", no_repo.as_bytes()),
            WebhookEvent::Ignored(IgnoreReason::MissingRepository)
        );
    }

    #[test]
    fn test_malformed_json_ignored() {
        assert!(matches!(
            normalize("issues", b"{not json"),
            WebhookEvent::Ignored(IgnoreReason::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_defaults_for_missing_optional_fields() {
        let body = json!({
            "action": "opened",
            "issue": { "number": 7, "title": "t" },
            "repository": { "name": "r", "owner": { "name": "org-by-name" } }
        })
        .to_string();
        let WebhookEvent::Issue(ev) = normalize("issues", body.as_bytes()) else {
            panic!("expected issue event");
        };
        assert_eq!(ev.issue.repo.owner, "org-by-name");
        assert_eq!(ev.issue.author, "unknown");
        assert_eq!(ev.issue.state, "open");
        assert_eq!(ev.installation_id, None);
    }
}
