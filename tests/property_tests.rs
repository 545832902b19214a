//! Property-based tests for core domain types.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

use proptest::prelude::*;
use tempfile::TempDir;

use grgit::core::location::Location;
use grgit::core::types::{short_ref_name, validate_short_name, CommitId};

/// Strategy for generating valid branch name characters.
fn name_char() -> impl Strategy<Value = char> {
    prop_oneof![
        prop::char::range('a', 'z'),
        prop::char::range('A', 'Z'),
        prop::char::range('0', '9'),
        Just('-'),
        Just('_'),
    ]
}

/// One path component that never starts with '.' or '-'.
fn component() -> impl Strategy<Value = String> {
    (
        prop::char::range('a', 'z'),
        prop::collection::vec(name_char(), 0..12),
    )
        .prop_map(|(first, rest)| std::iter::once(first).chain(rest).collect())
}

/// Valid branch names such as `feature/login-2`.
fn valid_name() -> impl Strategy<Value = String> {
    prop::collection::vec(component(), 1..4).prop_map(|parts| parts.join("/"))
}

fn hex_id() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![prop::char::range('0', '9'), prop::char::range('a', 'f')],
        40,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    #[test]
    fn generated_names_are_valid(name in valid_name()) {
        prop_assert!(validate_short_name(&name).is_ok(), "rejected {}", name);
    }

    #[test]
    fn forbidden_characters_are_rejected(
        name in valid_name(),
        bad in prop::sample::select(vec![' ', '~', '^', ':', '?', '*', '[', '\\']),
    ) {
        let broken = format!("{}{}x", name, bad);
        prop_assert!(validate_short_name(&broken).is_err());
    }

    #[test]
    fn short_ref_name_strips_known_prefixes(name in valid_name()) {
        for prefix in ["refs/heads/", "refs/tags/", "refs/remotes/"] {
            let full = format!("{}{}", prefix, name);
            prop_assert_eq!(short_ref_name(&full), name.as_str());
        }
    }

    #[test]
    fn commit_ids_normalize_case(id in hex_id()) {
        let lower = CommitId::new(id.clone()).unwrap();
        let upper = CommitId::new(id.to_uppercase()).unwrap();
        prop_assert_eq!(&lower, &upper);
        prop_assert!(id.starts_with(lower.short(7)));
    }

    #[test]
    fn truncated_ids_are_rejected(id in hex_id(), len in 1usize..40) {
        prop_assert!(CommitId::new(&id[..len]).is_err());
    }

    #[test]
    fn remote_urls_ignore_trailing_slashes(host in "[a-z][a-z0-9]{0,10}", path in valid_name()) {
        let url = format!("https://{}.example.com/{}", host, path);
        let a = Location::remote(&url).unwrap();
        let b = Location::remote(&format!("{}//", url)).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn remote_urls_drop_passwords(user in "[a-z][a-z0-9]{0,8}", secret in "[a-z0-9]{6,12}") {
        let url = format!("https://{}:{}@git.example.com/repo.git", user, secret);
        let location = Location::remote(&url).unwrap();
        let needle = format!(":{}@", secret);
        prop_assert!(!location.to_string().contains(&needle));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn local_paths_normalize(parts in prop::collection::vec(component(), 1..4)) {
        let dir = TempDir::new().unwrap();
        let relative = parts.join("/");
        let direct = Location::local(dir.path().join(&relative)).unwrap();
        let detour = Location::local(dir.path().join("x/..").join(&relative)).unwrap();
        let dotted = Location::local(dir.path().join(".").join(&relative)).unwrap();
        prop_assert_eq!(&direct, &detour);
        prop_assert_eq!(&direct, &dotted);
    }
}
