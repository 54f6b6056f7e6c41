use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::ParseEnumError;

/// What kind of infrastructure problem an issue reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    Road,
    Lighting,
    Water,
    Garbage,
    Sidewalk,
    Other,
}

impl IssueCategory {
    pub const ALL: [Self; 6] = [
        Self::Road,
        Self::Lighting,
        Self::Water,
        Self::Garbage,
        Self::Sidewalk,
        Self::Other,
    ];

    const fn as_str(self) -> &'static str {
        match self {
            Self::Road => "road",
            Self::Lighting => "lighting",
            Self::Water => "water",
            Self::Garbage => "garbage",
            Self::Sidewalk => "sidewalk",
            Self::Other => "other",
        }
    }
}

/// Triage and resolution lifecycle of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueStatus {
    Pending,
    StaffAssigned,
    InProgress,
    Working,
    Resolved,
    Closed,
    Rejected,
}

impl IssueStatus {
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::StaffAssigned,
        Self::InProgress,
        Self::Working,
        Self::Resolved,
        Self::Closed,
        Self::Rejected,
    ];

    const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::StaffAssigned => "staff-assigned",
            Self::InProgress => "in-progress",
            Self::Working => "working",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Rejected => "rejected",
        }
    }

    /// Closed and rejected issues accept no further status changes.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Rejected)
    }

    /// Validate whether a transition from self to `target` is allowed.
    ///
    /// Valid transitions:
    /// - `pending -> staff-assigned | rejected | closed`
    /// - `staff-assigned -> in-progress | rejected`
    /// - `in-progress -> working | resolved`
    /// - `working -> resolved`
    /// - `resolved -> closed`
    pub fn can_transition_to(self, target: Self) -> Result<(), InvalidTransition> {
        if self == target {
            return Err(InvalidTransition {
                from: self,
                to: target,
                reason: "no-op transition is not allowed",
            });
        }

        let allowed = matches!(
            (self, target),
            (Self::Pending, Self::StaffAssigned | Self::Rejected | Self::Closed)
                | (Self::StaffAssigned, Self::InProgress | Self::Rejected)
                | (Self::InProgress, Self::Working | Self::Resolved)
                | (Self::Working, Self::Resolved)
                | (Self::Resolved, Self::Closed)
        );

        if allowed {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self,
                to: target,
                reason: "transition not allowed by lifecycle rules",
            })
        }
    }
}

/// Staff-facing urgency of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

/// A citizen-reported issue as the backend serves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: IssueCategory,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub status: IssueStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub upvotes: u64,
    #[serde(default)]
    pub upvoters: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_staff: Option<String>,
}

impl Issue {
    /// Minimal pending issue, mostly useful for fixtures and simulations.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            category: IssueCategory::Other,
            location: String::new(),
            images: Vec::new(),
            status: IssueStatus::Pending,
            priority: Priority::Normal,
            upvotes: 0,
            upvoters: Vec::new(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            created_by: created_by.into(),
            assigned_staff: None,
        }
    }

    #[must_use]
    pub fn has_upvoted(&self, user: &str) -> bool {
        self.upvoters.iter().any(|u| u == user)
    }

    /// True when the count agrees with the membership list.
    #[must_use]
    pub fn vote_count_consistent(&self) -> bool {
        u64::try_from(self.upvoters.len()).is_ok_and(|n| n == self.upvotes)
    }
}

/// Error returned when a status transition is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: IssueStatus,
    pub to: IssueStatus,
    pub reason: &'static str,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot move {} -> {}: {}", self.from, self.to, self.reason)
    }
}

impl std::error::Error for InvalidTransition {}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase()
}

impl FromStr for IssueCategory {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| ParseEnumError {
                expected: "category",
                got: s.to_string(),
            })
    }
}

impl FromStr for IssueStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s).replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == normalized)
            .ok_or_else(|| ParseEnumError {
                expected: "status",
                got: s.to_string(),
            })
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}
