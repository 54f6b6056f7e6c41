use civic_core::model::{Role, User};
use civic_core::session::{GuardState, Resolution, RouteGuard};

fn user(role: Role) -> User {
    User::new("u1", "who@x.com", role)
}

#[test]
fn loading_while_identity_pending() {
    let guard = RouteGuard::requiring(Role::Admin);
    assert_eq!(
        guard.evaluate(&Resolution::Pending, &Resolution::Pending),
        GuardState::Loading
    );
    assert_eq!(
        guard.evaluate(&Resolution::Pending, &Resolution::Resolved(Role::Admin)),
        GuardState::Loading
    );
}

#[test]
fn loading_while_role_pending_for_role_routes() {
    let identity = Resolution::Resolved(user(Role::Admin));
    assert_eq!(
        RouteGuard::requiring(Role::Admin).evaluate(&identity, &Resolution::Pending),
        GuardState::Loading
    );
    assert_eq!(
        RouteGuard::signed_in().evaluate(&identity, &Resolution::Pending),
        GuardState::Authorized
    );
}

#[test]
fn no_identity_is_unauthenticated() {
    for guard in [RouteGuard::signed_in(), RouteGuard::requiring(Role::Staff)] {
        assert_eq!(
            guard.evaluate(&Resolution::Failed, &Resolution::Pending),
            GuardState::Unauthenticated
        );
    }
}

#[test]
fn role_mismatch_or_failure_is_forbidden() {
    let identity = Resolution::Resolved(user(Role::Citizen));
    let guard = RouteGuard::requiring(Role::Staff);
    assert_eq!(
        guard.evaluate(&identity, &Resolution::Resolved(Role::Citizen)),
        GuardState::Forbidden
    );
    assert_eq!(guard.evaluate(&identity, &Resolution::Failed), GuardState::Forbidden);
    // Admin does not implicitly satisfy a staff route.
    assert_eq!(
        guard.evaluate(&identity, &Resolution::Resolved(Role::Admin)),
        GuardState::Forbidden
    );
}

#[test]
fn matching_role_is_authorized() {
    let identity = Resolution::Resolved(user(Role::Staff));
    assert_eq!(
        RouteGuard::requiring(Role::Staff).evaluate(&identity, &Resolution::Resolved(Role::Staff)),
        GuardState::Authorized
    );
}

#[test]
fn re_evaluation_moves_through_states() {
    let guard = RouteGuard::requiring(Role::Admin);
    let mut identity = Resolution::Pending;
    let mut role = Resolution::Pending;
    assert_eq!(guard.evaluate(&identity, &role), GuardState::Loading);

    identity = Resolution::Resolved(user(Role::Admin));
    assert_eq!(guard.evaluate(&identity, &role), GuardState::Loading);

    role = Resolution::Resolved(Role::Admin);
    assert_eq!(guard.evaluate(&identity, &role), GuardState::Authorized);
}
