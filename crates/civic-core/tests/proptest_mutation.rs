use civic_core::model::{Issue, Role, User};
use civic_core::mutation::{Actor, Begin, toggle_upvote};
use civic_core::session::Session;
use civic_core::transport::TransportError;
use civic_core::{FingerprintStore, MutationIntent, MutationKind, Mutator, QueryKey};
use proptest::prelude::*;

fn arb_user() -> impl Strategy<Value = String> {
    (0u8..8).prop_map(|n| format!("user{n}@x.com"))
}

prop_compose! {
    fn arb_issue()(
        voters in proptest::collection::btree_set(arb_user(), 0..6),
        title in "[a-z ]{1,20}",
    ) -> Issue {
        let mut issue = Issue::new("i1", title, "owner@x.com");
        issue.upvoters = voters.into_iter().collect();
        issue.upvotes = issue.upvoters.len() as u64;
        issue
    }
}

/// `upvoters` is a set; a remove-then-add pair may move the voter to the end.
fn by_membership(mut issue: Issue) -> Issue {
    issue.upvoters.sort();
    issue
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(256))]

    #[test]
    fn toggle_twice_is_identity(issue in arb_issue(), user in arb_user()) {
        let once = toggle_upvote(&issue, &user);
        prop_assert_ne!(once.has_upvoted(&user), issue.has_upvoted(&user));
        prop_assert!(once.vote_count_consistent());
        let twice = toggle_upvote(&once, &user);
        prop_assert_eq!(by_membership(twice), by_membership(issue));
    }

    #[test]
    fn failed_mutation_restores_store_exactly(
        issue in arb_issue(),
        user in arb_user(),
        latest in any::<bool>(),
    ) {
        let mut store = FingerprintStore::new();
        store.set(QueryKey::new("issues"), vec![issue.clone(), Issue::new("i2", "x", "o@x.com")]);
        if latest {
            store.set(QueryKey::new("latest"), vec![issue]);
        }
        let before = store.clone();

        let mutator = Mutator::default();
        let mut session = Session::signed_in(User::new("u", user.clone(), Role::Citizen));
        let intent = MutationIntent::new("i1", MutationKind::Upvote, Actor::citizen(user));
        let Ok(Begin::Started(pending)) = mutator.begin(&mut store, &session, intent) else {
            return Err(TestCaseError::fail("begin did not start"));
        };
        prop_assert_ne!(&store, &before);

        mutator.complete(
            &mut store,
            &mut session,
            pending,
            Err(TransportError::Network("dropped".to_string())),
        );
        prop_assert_eq!(store, before);
        prop_assert!(mutator.guard().is_idle());
    }
}
