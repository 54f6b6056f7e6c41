//! Pure next-state functions. Each returns a new [`Issue`] and never touches
//! its input.

use super::{MutationIntent, MutationKind};
use crate::model::{Issue, IssueStatus};

/// Toggle `user`'s upvote: add if absent (count +1), remove if present
/// (count -1, floored at zero).
#[must_use]
pub fn toggle_upvote(issue: &Issue, user: &str) -> Issue {
    let mut next = issue.clone();
    if next.has_upvoted(user) {
        next.upvoters.retain(|u| u != user);
        next.upvotes = next.upvotes.saturating_sub(1);
    } else {
        next.upvoters.push(user.to_string());
        next.upvotes = next.upvotes.saturating_add(1);
    }
    next
}

/// Force `user`'s membership to `upvoted`, leaving the count alone.
#[must_use]
pub(crate) fn set_upvoted(issue: &Issue, user: &str, upvoted: bool) -> Issue {
    let mut next = issue.clone();
    let present = next.has_upvoted(user);
    if upvoted && !present {
        next.upvoters.push(user.to_string());
    } else if !upvoted && present {
        next.upvoters.retain(|u| u != user);
    }
    next
}

/// Record `staff` as assigned. A pending issue moves to staff-assigned.
#[must_use]
pub fn assign_staff(issue: &Issue, staff: &str) -> Issue {
    let mut next = issue.clone();
    next.assigned_staff = Some(staff.to_string());
    if next.status == IssueStatus::Pending {
        next.status = IssueStatus::StaffAssigned;
    }
    next
}

#[must_use]
pub fn change_status(issue: &Issue, status: IssueStatus) -> Issue {
    let mut next = issue.clone();
    next.status = status;
    next
}

/// Locally computed next state for `intent` applied to `issue`.
#[must_use]
pub fn speculate(issue: &Issue, intent: &MutationIntent) -> Issue {
    match &intent.kind {
        MutationKind::Upvote => toggle_upvote(issue, &intent.actor.id),
        MutationKind::Assign { staff } => assign_staff(issue, staff),
        MutationKind::StatusChange { status } => change_status(issue, *status),
    }
}
