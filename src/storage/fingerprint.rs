/*
 * Copyright 2025 Vijaykumar Singh
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Content fingerprints used for identity defaulting and deduplication.

use sha2::{Digest, Sha256};

/// Replace NUL characters, which text columns reject, with U+FFFD.
pub fn normalize_content(content: &str) -> String {
    content.replace('\0', "\u{FFFD}")
}

/// Lowercase hex SHA-256 of the normalized content.
pub fn content_fingerprint(content: &str) -> String {
    let normalized = normalize_content(content);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Explicit id if present, otherwise the fingerprint.
pub fn resolve_identity(explicit: Option<&str>, fingerprint: &str) -> String {
    match explicit {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => fingerprint.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            content_fingerprint("hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_nul_normalization() {
        assert_eq!(normalize_content("a\0b"), "a\u{FFFD}b");
        assert_eq!(content_fingerprint("a\0b"), content_fingerprint("a\u{FFFD}b"));
        assert_ne!(content_fingerprint("a\0b"), content_fingerprint("ab"));
    }

    #[test]
    fn test_identity_defaults_to_fingerprint() {
        let fp = content_fingerprint("body");
        assert_eq!(resolve_identity(None, &fp), fp);
        assert_eq!(resolve_identity(Some(""), &fp), fp);
        assert_eq!(resolve_identity(Some("doc-1"), &fp), "doc-1");
    }

    proptest! {
        #[test]
        fn prop_fingerprint_is_stable(content in ".*") {
            let first = content_fingerprint(&content);
            prop_assert_eq!(first.len(), 64);
            prop_assert_eq!(first, content_fingerprint(&content));
        }

        #[test]
        fn prop_normalized_content_has_no_nul(content in "[a-z\\x00]{0,32}") {
            let normalized = normalize_content(&content);
            prop_assert!(!normalized.contains('\0'));
            prop_assert_eq!(content_fingerprint(&content), content_fingerprint(&normalized));
        }
    }
}
