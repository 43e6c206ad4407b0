//! Element fingerprinting for event identity
//!
//! A fingerprint is a stable 16-hex-char digest of an element's DOM locator.
//! Every event targeting the same element class gets the same fingerprint,
//! which is what the naming cache and the backfill UPDATE key on.

use sha2::{Digest, Sha256};

/// Compute a stable hash from DOM context for event dedup and naming.
///
/// Tag, id and classes are case-folded; path components are case-sensitive.
/// All five parts are whitespace-trimmed and joined with a single `|` before
/// hashing. The digest is truncated to 16 hex chars — 64 bits is plenty at
/// the cardinalities a single project produces, but this is an identity, not
/// a cryptographic commitment.
pub fn compute_fingerprint(
    element_tag: &str,
    element_id: &str,
    element_classes: &str,
    parent_path: &str,
    url_path: &str,
) -> String {
    let parts = [
        element_tag.trim().to_lowercase(),
        element_id.trim().to_lowercase(),
        element_classes.trim().to_lowercase(),
        parent_path.trim().to_string(),
        url_path.trim().to_string(),
    ];

    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.as_bytes());
    }

    hex::encode(hasher.finalize())[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = compute_fingerprint("button", "submit-btn", "btn btn-primary", "form>div", "/checkout");
        let b = compute_fingerprint("button", "submit-btn", "btn btn-primary", "form>div", "/checkout");
        assert_eq!(a, b, "same inputs produced different fingerprints");
    }

    #[test]
    fn sixteen_chars() {
        let fp = compute_fingerprint("button", "id", "class", "parent", "/path");
        assert_eq!(fp.len(), 16);
    }

    #[test]
    fn case_insensitive_on_element_parts() {
        let lower = compute_fingerprint("button", "submit-btn", "btn primary", "form", "/");
        let upper = compute_fingerprint("BUTTON", "SUBMIT-BTN", "BTN PRIMARY", "form", "/");
        assert_eq!(lower, upper, "tag/id/classes case should be normalized");
    }

    #[test]
    fn whitespace_trimmed() {
        let clean = compute_fingerprint("Button", "submit-btn", "btn btn-primary", "form>div", "/checkout");
        let padded = compute_fingerprint(
            "  BUTTON  ",
            "  SUBMIT-BTN  ",
            "  BTN BTN-PRIMARY  ",
            "form>div",
            "/checkout",
        );
        assert_eq!(clean, padded);
    }

    #[test]
    fn distinct_inputs_distinct_outputs() {
        let a = compute_fingerprint("button", "id1", "class", "parent", "/page");
        let b = compute_fingerprint("button", "id2", "class", "parent", "/page");
        assert_ne!(a, b);
    }

    #[test]
    fn path_components_case_sensitive() {
        let a = compute_fingerprint("button", "id", "class", "Form>Div", "/checkout");
        let b = compute_fingerprint("button", "id", "class", "form>div", "/checkout");
        assert_ne!(a, b);
    }

    #[test]
    fn empty_inputs_still_hash() {
        let fp = compute_fingerprint("", "", "", "", "");
        assert_eq!(fp.len(), 16);
    }

    #[test]
    fn lowercase_hex_only() {
        let fp = compute_fingerprint("a", "b", "c", "d", "e");
        assert!(fp.chars().all(|c| "0123456789abcdef".contains(c)), "non-hex char in {fp:?}");
    }
}
