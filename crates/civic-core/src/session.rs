//! Signed-in identity and role-gated route evaluation.

use serde::{Deserialize, Serialize};

use crate::model::{Role, User};

/// Where an unauthenticated or revoked session is sent.
pub const LOGIN_ROUTE: &str = "/login";
/// Where a signed-in user without the required role is sent.
pub const FORBIDDEN_ROUTE: &str = "/forbidden";

/// Current identity. Revocation is sticky until the next sign-in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    identity: Option<User>,
    revoked: bool,
}

impl Session {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn signed_in(user: User) -> Self {
        Self {
            identity: Some(user),
            revoked: false,
        }
    }

    pub fn sign_in(&mut self, user: User) {
        self.identity = Some(user);
        self.revoked = false;
    }

    /// Forced sign-out after an authorization failure.
    pub fn sign_out(&mut self) {
        if let Some(user) = self.identity.take() {
            tracing::info!(user = %user.email, "session signed out");
        }
        self.revoked = true;
    }

    #[must_use]
    pub const fn identity(&self) -> Option<&User> {
        self.identity.as_ref()
    }

    #[must_use]
    pub const fn is_revoked(&self) -> bool {
        self.revoked
    }
}

/// An asynchronously resolved value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    Pending,
    Resolved(T),
    Failed,
}

impl<T> Resolution<T> {
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl<T> From<Option<T>> for Resolution<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Failed, Self::Resolved)
    }
}

/// Render decision for a guarded route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardState {
    Loading,
    Unauthenticated,
    Forbidden,
    Authorized,
}

impl GuardState {
    /// Redirect target for states that do not render the guarded content.
    #[must_use]
    pub const fn redirect(self) -> Option<&'static str> {
        match self {
            Self::Unauthenticated => Some(LOGIN_ROUTE),
            Self::Forbidden => Some(FORBIDDEN_ROUTE),
            Self::Loading | Self::Authorized => None,
        }
    }
}

/// Role requirement for one route. `None` admits any signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteGuard {
    required: Option<Role>,
}

impl RouteGuard {
    #[must_use]
    pub const fn signed_in() -> Self {
        Self { required: None }
    }

    #[must_use]
    pub const fn requiring(role: Role) -> Self {
        Self {
            required: Some(role),
        }
    }

    /// Evaluate once per navigation. Identity and role resolve independently;
    /// a failed role lookup is final for this evaluation.
    #[must_use]
    pub fn evaluate(&self, identity: &Resolution<User>, role: &Resolution<Role>) -> GuardState {
        match identity {
            Resolution::Pending => GuardState::Loading,
            Resolution::Failed => GuardState::Unauthenticated,
            Resolution::Resolved(_) => match (self.required, role) {
                (None, _) => GuardState::Authorized,
                (Some(_), Resolution::Pending) => GuardState::Loading,
                (Some(_), Resolution::Failed) => GuardState::Forbidden,
                (Some(required), Resolution::Resolved(actual)) if *actual == required => {
                    GuardState::Authorized
                }
                (Some(_), Resolution::Resolved(_)) => GuardState::Forbidden,
            },
        }
    }

    /// Evaluate against a session whose role is already known.
    #[must_use]
    pub fn evaluate_session(&self, session: &Session) -> GuardState {
        let identity: Resolution<User> = session.identity().cloned().into();
        let role: Resolution<Role> = session.identity().map(|u| u.role).into();
        self.evaluate(&identity, &role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staff() -> User {
        User::new("u1", "s@x.com", Role::Staff)
    }

    #[test]
    fn sign_out_clears_identity_and_marks_revoked() {
        let mut session = Session::signed_in(staff());
        session.sign_out();
        assert!(session.identity().is_none());
        assert!(session.is_revoked());
        session.sign_in(staff());
        assert!(!session.is_revoked());
    }

    #[test]
    fn session_evaluation_uses_identity_role() {
        let guard = RouteGuard::requiring(Role::Admin);
        assert_eq!(guard.evaluate_session(&Session::anonymous()), GuardState::Unauthenticated);
        assert_eq!(
            guard.evaluate_session(&Session::signed_in(staff())),
            GuardState::Forbidden
        );
        assert_eq!(
            RouteGuard::requiring(Role::Staff).evaluate_session(&Session::signed_in(staff())),
            GuardState::Authorized
        );
    }

    #[test]
    fn redirects() {
        assert_eq!(GuardState::Unauthenticated.redirect(), Some(LOGIN_ROUTE));
        assert_eq!(GuardState::Forbidden.redirect(), Some(FORBIDDEN_ROUTE));
        assert_eq!(GuardState::Loading.redirect(), None);
    }
}
