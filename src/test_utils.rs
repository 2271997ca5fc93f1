//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    /// Generate a valid recipe name (lowercase alphanumeric with hyphens)
    pub fn recipe_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,20}[a-z0-9]?".prop_filter("Name must not be empty", |s| !s.is_empty())
    }

    /// Generate a dotted symbol version such as `2.3.4`
    pub fn dotted_version() -> impl Strategy<Value = Vec<u32>> {
        prop::collection::vec(0u32..20, 1..=4)
    }

    /// Generate an MD5 digest (32 hex characters)
    pub fn md5_hash() -> impl Strategy<Value = String> {
        "[0-9a-f]{32}"
    }

    /// Generate a SHA256 digest (64 hex characters)
    pub fn sha256_hash() -> impl Strategy<Value = String> {
        "[0-9a-f]{64}"
    }

    /// Generate a source archive URL
    pub fn url() -> impl Strategy<Value = String> {
        (
            prop_oneof!["https", "http", "ftp"],
            "[a-z]{3,10}",
            "[a-z]{2,5}",
            "[a-z0-9-]{1,20}",
            prop_oneof![".tar.gz", ".tar.bz2", ".tgz", ".zip"],
        )
            .prop_map(|(scheme, domain, tld, path, ext)| {
                format!("{scheme}://{domain}.{tld}/{path}{ext}")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_recipe_name_generator(name in recipe_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }

        #[test]
        fn test_dotted_version_generator(parts in dotted_version()) {
            prop_assert!(!parts.is_empty());
            prop_assert!(parts.len() <= 4);
        }

        #[test]
        fn test_hash_generators(md5 in md5_hash(), sha in sha256_hash()) {
            prop_assert_eq!(md5.len(), 32);
            prop_assert_eq!(sha.len(), 64);
            prop_assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
