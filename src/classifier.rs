use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::github::{AuthorAssociation, IssuesEvent, PullRequestEvent, Submission};

const OPENED: &str = "opened";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Admit(Submission),
    Skip(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Event kind that never feeds the collector (comments, pings, ...).
    IrrelevantEvent,
    Action(String),
    IgnoredAssociation(AuthorAssociation),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::IrrelevantEvent => write!(f, "event kind is not tracked"),
            SkipReason::Action(action) => write!(f, "action '{}' is not 'opened'", action),
            SkipReason::IgnoredAssociation(assoc) => {
                write!(f, "author association {} is ignored", assoc)
            }
        }
    }
}

/// Decides whether an authenticated delivery should be counted.
///
/// `issues` and `pull_request` are inspected; every other event name is
/// acknowledged without further checks.
pub fn classify(
    event: &str,
    payload: &Value,
    ignored: &[AuthorAssociation],
) -> Result<Verdict> {
    let (action, submission) = match event {
        "issues" => {
            let payload =
                IssuesEvent::deserialize(payload).context("Failed to parse issues payload")?;
            (payload.action, payload.issue)
        }
        "pull_request" => {
            let payload = PullRequestEvent::deserialize(payload)
                .context("Failed to parse pull_request payload")?;
            (payload.action, payload.pull_request)
        }
        _ => return Ok(Verdict::Skip(SkipReason::IrrelevantEvent)),
    };

    if action != OPENED {
        return Ok(Verdict::Skip(SkipReason::Action(action)));
    }
    if ignored.contains(&submission.author_association) {
        return Ok(Verdict::Skip(SkipReason::IgnoredAssociation(
            submission.author_association,
        )));
    }
    Ok(Verdict::Admit(submission))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue_body(action: &str, assoc: &str) -> Value {
        json!({
            "action": action,
            "issue": {
                "id": 11,
                "number": 4,
                "title": "Buy cheap followers",
                "html_url": "https://github.com/o/r/issues/4",
                "author_association": assoc
            },
            "repository": { "full_name": "o/r" }
        })
    }

    fn pull_body(action: &str, assoc: &str) -> Value {
        json!({
            "action": action,
            "number": 9,
            "pull_request": {
                "id": 99,
                "number": 9,
                "title": "Update README.md",
                "author_association": assoc
            }
        })
    }

    #[test]
    fn admits_opened_issue_from_outsider() {
        let verdict = classify("issues", &issue_body("opened", "NONE"), &[]).unwrap();
        let Verdict::Admit(item) = verdict else {
            panic!("expected admit, got {:?}", verdict);
        };
        assert_eq!(item.id, 11);
        assert_eq!(item.author_association, AuthorAssociation::NoAssociation);
    }

    #[test]
    fn admits_opened_pull_request() {
        let verdict = classify(
            "pull_request",
            &pull_body("opened", "FIRST_TIME_CONTRIBUTOR"),
            &[AuthorAssociation::Owner],
        )
        .unwrap();
        assert!(matches!(verdict, Verdict::Admit(ref s) if s.number == 9));
    }

    #[test]
    fn skips_other_actions() {
        for action in ["closed", "edited", "reopened", "Opened"] {
            let verdict = classify("issues", &issue_body(action, "NONE"), &[]).unwrap();
            assert_eq!(verdict, Verdict::Skip(SkipReason::Action(action.to_string())));
        }
        let verdict = classify("pull_request", &pull_body("synchronize", "NONE"), &[]).unwrap();
        assert!(matches!(verdict, Verdict::Skip(SkipReason::Action(_))));
    }

    #[test]
    fn skips_ignored_associations() {
        let ignored = [AuthorAssociation::Owner, AuthorAssociation::Member];
        let verdict = classify("issues", &issue_body("opened", "MEMBER"), &ignored).unwrap();
        assert_eq!(
            verdict,
            Verdict::Skip(SkipReason::IgnoredAssociation(AuthorAssociation::Member))
        );
        let verdict = classify("issues", &issue_body("opened", "CONTRIBUTOR"), &ignored).unwrap();
        assert!(matches!(verdict, Verdict::Admit(_)));
    }

    #[test]
    fn other_events_are_acknowledged() {
        for event in ["issue_comment", "ping", "star", ""] {
            let verdict = classify(event, &json!({ "zen": "Keep it logically awesome." }), &[])
                .unwrap();
            assert_eq!(verdict, Verdict::Skip(SkipReason::IrrelevantEvent));
        }
    }

    #[test]
    fn malformed_tracked_payload_is_an_error() {
        assert!(classify("issues", &json!({ "action": "opened" }), &[]).is_err());
        assert!(classify("pull_request", &json!([]), &[]).is_err());
    }
}
