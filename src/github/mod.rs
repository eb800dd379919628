use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod client;

pub use client::{GitHubClient, DEFAULT_API_URL};

pub const EVENT_HEADER: &str = "x-github-event";

/// Remote restriction API for the account that owns the credential.
#[async_trait]
pub trait InteractionsApi: Send + Sync {
    /// `None` when no restriction is currently in place.
    async fn current_restriction(&self) -> Result<Option<InteractionRestriction>>;
    async fn set_restriction(&self, limit: InteractionLimit, expiry: RestrictionExpiry)
        -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorAssociation {
    Collaborator,
    Contributor,
    FirstTimer,
    FirstTimeContributor,
    Mannequin,
    Member,
    #[serde(rename = "NONE")]
    NoAssociation,
    Owner,
    #[serde(other)]
    Unrecognized,
}

impl AuthorAssociation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorAssociation::Collaborator => "COLLABORATOR",
            AuthorAssociation::Contributor => "CONTRIBUTOR",
            AuthorAssociation::FirstTimer => "FIRST_TIMER",
            AuthorAssociation::FirstTimeContributor => "FIRST_TIME_CONTRIBUTOR",
            AuthorAssociation::Mannequin => "MANNEQUIN",
            AuthorAssociation::Member => "MEMBER",
            AuthorAssociation::NoAssociation => "NONE",
            AuthorAssociation::Owner => "OWNER",
            AuthorAssociation::Unrecognized => "UNRECOGNIZED",
        }
    }
}

impl FromStr for AuthorAssociation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let assoc = match s.trim().to_uppercase().as_str() {
            "COLLABORATOR" => AuthorAssociation::Collaborator,
            "CONTRIBUTOR" => AuthorAssociation::Contributor,
            "FIRST_TIMER" => AuthorAssociation::FirstTimer,
            "FIRST_TIME_CONTRIBUTOR" => AuthorAssociation::FirstTimeContributor,
            "MANNEQUIN" => AuthorAssociation::Mannequin,
            "MEMBER" => AuthorAssociation::Member,
            "NONE" => AuthorAssociation::NoAssociation,
            "OWNER" => AuthorAssociation::Owner,
            other => bail!("Unknown author association '{}'", other),
        };
        Ok(assoc)
    }
}

impl fmt::Display for AuthorAssociation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The issue or pull request object carried by an event. Only the fields
/// used for identity and logging are kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct Submission {
    pub id: u64,
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub html_url: String,
    pub author_association: AuthorAssociation,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssuesEvent {
    pub action: String,
    pub issue: Submission,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub pull_request: Submission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionLimit {
    ExistingUsers,
    ContributorsOnly,
    CollaboratorsOnly,
}

impl InteractionLimit {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionLimit::ExistingUsers => "existing_users",
            InteractionLimit::ContributorsOnly => "contributors_only",
            InteractionLimit::CollaboratorsOnly => "collaborators_only",
        }
    }
}

impl fmt::Display for InteractionLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionExpiry {
    OneDay,
    ThreeDays,
    OneWeek,
    OneMonth,
    SixMonths,
}

impl RestrictionExpiry {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestrictionExpiry::OneDay => "one_day",
            RestrictionExpiry::ThreeDays => "three_days",
            RestrictionExpiry::OneWeek => "one_week",
            RestrictionExpiry::OneMonth => "one_month",
            RestrictionExpiry::SixMonths => "six_months",
        }
    }
}

impl fmt::Display for RestrictionExpiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InteractionRestriction {
    pub limit: InteractionLimit,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}
