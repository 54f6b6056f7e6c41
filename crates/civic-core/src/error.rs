use std::fmt;

/// Machine-readable error codes for scripts and structured CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    EndpointNotConfigured,
    IssueNotFound,
    InvalidStatusTransition,
    ActorBlocked,
    SelfUpvote,
    RoleNotPermitted,
    InvalidEnumValue,
    NotSignedIn,
    ActorMismatch,
    NetworkFailure,
    SessionUnauthorized,
    UnrecognizedResponse,
    ServerRejected,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1002",
            Self::EndpointNotConfigured => "E1003",
            Self::IssueNotFound => "E2001",
            Self::InvalidStatusTransition => "E2002",
            Self::ActorBlocked => "E2003",
            Self::SelfUpvote => "E2004",
            Self::RoleNotPermitted => "E2005",
            Self::InvalidEnumValue => "E2006",
            Self::NotSignedIn => "E2007",
            Self::ActorMismatch => "E2008",
            Self::NetworkFailure => "E4001",
            Self::SessionUnauthorized => "E4002",
            Self::UnrecognizedResponse => "E4003",
            Self::ServerRejected => "E4004",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::EndpointNotConfigured => "Mutation endpoint not configured",
            Self::IssueNotFound => "Issue not found",
            Self::InvalidStatusTransition => "Invalid status transition",
            Self::ActorBlocked => "Account is blocked",
            Self::SelfUpvote => "Cannot upvote own issue",
            Self::RoleNotPermitted => "Role not permitted",
            Self::InvalidEnumValue => "Invalid category/status/priority/role value",
            Self::NotSignedIn => "Not signed in",
            Self::ActorMismatch => "Acting user differs from the session",
            Self::NetworkFailure => "Network request failed",
            Self::SessionUnauthorized => "Session is no longer authorized",
            Self::UnrecognizedResponse => "Unrecognized mutation response",
            Self::ServerRejected => "Server rejected the mutation",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .civic/config.toml and retry."),
            Self::EndpointNotConfigured => {
                Some("Set [endpoint] base_url in .civic/config.toml or pass --base-url.")
            }
            Self::IssueNotFound => None,
            Self::InvalidStatusTransition => Some(
                "Follow the lifecycle: pending -> staff-assigned -> in-progress -> working -> resolved -> closed.",
            ),
            Self::ActorBlocked => Some("Contact an administrator to unblock the account."),
            Self::SelfUpvote => None,
            Self::RoleNotPermitted => Some("Sign in with an account that holds the required role."),
            Self::InvalidEnumValue => Some("Use one of the documented enum values."),
            Self::NotSignedIn => Some("Sign in again."),
            Self::ActorMismatch => Some("Act as the signed-in user."),
            Self::NetworkFailure => Some("Check connectivity and retry; local state was restored."),
            Self::SessionUnauthorized => Some("Sign in again."),
            Self::UnrecognizedResponse => {
                Some("The backend answered with an unexpected body; local state was restored.")
            }
            Self::ServerRejected => None,
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigParseError,
            ErrorCode::EndpointNotConfigured,
            ErrorCode::IssueNotFound,
            ErrorCode::InvalidStatusTransition,
            ErrorCode::ActorBlocked,
            ErrorCode::SelfUpvote,
            ErrorCode::RoleNotPermitted,
            ErrorCode::InvalidEnumValue,
            ErrorCode::NotSignedIn,
            ErrorCode::ActorMismatch,
            ErrorCode::NetworkFailure,
            ErrorCode::SessionUnauthorized,
            ErrorCode::UnrecognizedResponse,
            ErrorCode::ServerRejected,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::UnrecognizedResponse.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }
}
