use proptest::prelude::*;

use pkiguard::authz::engine::check;
use pkiguard::authz::tree::AccessTree;
use pkiguard::authz::types::*;
use pkiguard::authz::AdminIdentity;

fn alice() -> AdminIdentity {
    AdminIdentity::certificate(5, "0A", "CN=alice")
}

fn group(id: i64, rules: Vec<AccessRule>) -> AdminGroup {
    AdminGroup {
        id: GroupId(id),
        name: format!("group-{id}"),
        ca_id: 5,
        entities: vec![AdminEntity::new(
            MatchWith::CommonName,
            Comparator::EqualCase,
            "alice",
            5,
        )],
        rules,
    }
}

/// Paths over a small alphabet so generated rules and queries overlap.
fn path() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(vec!["a", "b", "c"]), 0..4)
        .prop_map(|segments| format!("/{}", segments.join("/")))
}

fn rule() -> impl Strategy<Value = AccessRule> {
    (path(), any::<bool>(), any::<bool>()).prop_map(|(resource, accept, recursive)| {
        if accept {
            AccessRule::accept(&resource, recursive)
        } else {
            AccessRule::decline(&resource)
        }
    })
}

fn rules() -> impl Strategy<Value = Vec<AccessRule>> {
    prop::collection::vec(rule(), 0..8).prop_map(|rules| {
        // One rule per resource, as the store keeps them
        let mut seen = std::collections::BTreeSet::new();
        rules
            .into_iter()
            .filter(|r| seen.insert(r.resource.clone()))
            .collect()
    })
}

proptest! {
    #[test]
    fn decisions_are_deterministic(rules in rules(), queries in prop::collection::vec(path(), 1..10)) {
        let first = AccessTree::build(&[group(1, rules.clone())], 1);
        let mut reversed = rules.clone();
        reversed.reverse();
        let second = AccessTree::build(&[group(1, reversed)], 1);

        for query in &queries {
            let answer = check(&first, &alice(), query);
            prop_assert_eq!(answer, check(&first, &alice(), query));
            prop_assert_eq!(answer, check(&second, &alice(), query));
        }
    }

    #[test]
    fn deny_without_covering_accept(rules in rules(), query in path()) {
        let tree = AccessTree::build(&[group(1, rules.clone())], 1);
        let query_segments: Vec<&str> = segments(&query).collect();
        let covered = rules.iter().any(|rule| {
            let rule_segments: Vec<&str> = segments(&rule.resource).collect();
            rule.effect == RuleEffect::Accept
                && query_segments.starts_with(&rule_segments)
                && (rule.recursive || rule_segments.len() == query_segments.len())
        });
        if !covered {
            prop_assert!(!check(&tree, &alice(), &query));
        }
    }

    #[test]
    fn recursive_accept_reaches_descendants(base in path(), suffix in path()) {
        let tree = AccessTree::build(&[group(1, vec![AccessRule::accept(&base, true)])], 1);
        let descendant = format!("{}/{}", base, suffix);
        prop_assert!(check(&tree, &alice(), &descendant));
    }

    #[test]
    fn non_members_are_always_denied(rules in rules(), query in path()) {
        let tree = AccessTree::build(&[group(1, rules)], 1);
        let bob = AdminIdentity::certificate(5, "0B", "CN=bob");
        prop_assert!(!check(&tree, &bob, &query));
    }
}
