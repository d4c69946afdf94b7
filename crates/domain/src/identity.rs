//! Canonical device identity codec.
//!
//! A device's canonical id is `normalize(protocol) + "/" + normalize(external_id)`.
//! It is computed, never persisted as its own column, and may contain extra
//! `/` characters after its first segment — topic and path parsers split on
//! the first `/` only.

use crate::error::ValidationError;

/// Lower-case and trim a protocol or external-id segment.
fn normalize_segment(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

/// Normalize a `(protocol, external_id)` pair into a canonical id and the
/// normalized external-id component.
///
/// `external_id` is split on `/`, empty segments are dropped, and a leading
/// segment equal to the normalized protocol is stripped (adapters sometimes
/// send their own protocol prefix back as part of the external id). At least
/// one segment must remain.
///
/// # Errors
///
/// Returns [`ValidationError::ProtocolExternalRequired`] if the protocol is
/// empty after trimming, or if no external-id segment remains.
pub fn normalize(protocol: &str, external_id: &str) -> Result<(String, String), ValidationError> {
    let protocol = normalize_segment(protocol);
    if protocol.is_empty() {
        return Err(ValidationError::ProtocolExternalRequired);
    }

    let mut segments: Vec<&str> = external_id
        .split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.first().is_some_and(|first| {
        first.eq_ignore_ascii_case(&protocol) || first.to_ascii_lowercase() == protocol
    }) {
        segments.remove(0);
    }

    if segments.is_empty() {
        return Err(ValidationError::ProtocolExternalRequired);
    }

    let normalized_external = segments
        .into_iter()
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("/");

    let canonical_id = format!("{protocol}/{normalized_external}");
    Ok((canonical_id, normalized_external))
}

/// Split a canonical device id into its `(protocol, external_id)` parts.
///
/// Only the first `/` is significant; the external-id part may itself
/// contain further `/` separators.
///
/// # Errors
///
/// Returns [`ValidationError::NotCanonical`] if there is no `/`, or if
/// either side is empty after trimming.
pub fn split(canonical: &str) -> Result<(String, String), ValidationError> {
    let (protocol, external) = canonical
        .split_once('/')
        .ok_or(ValidationError::NotCanonical)?;
    let protocol = protocol.trim();
    let external = external.trim();
    if protocol.is_empty() || external.is_empty() {
        return Err(ValidationError::NotCanonical);
    }
    Ok((protocol.to_string(), external.to_string()))
}

/// Rebuild a canonical id from a `(protocol, external_id)` pair, without
/// re-validating. Used by the round-trip invariant and by call sites that
/// already hold normalized parts.
#[must_use]
pub fn build(protocol: &str, external_id: &str) -> String {
    format!("{protocol}/{external_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_normalize_case_and_whitespace() {
        let (canonical, external) = normalize(" Zigbee ", " 0xABCD ").unwrap();
        assert_eq!(canonical, "zigbee/0xabcd");
        assert_eq!(external, "0xabcd");
    }

    #[test]
    fn should_drop_empty_segments() {
        let (canonical, _) = normalize("lan", "//bulb-01//").unwrap();
        assert_eq!(canonical, "lan/bulb-01");
    }

    #[test]
    fn should_strip_leading_protocol_prefix_from_external_id() {
        let (canonical, external) = normalize("zigbee", "zigbee/0xabcd").unwrap();
        assert_eq!(canonical, "zigbee/0xabcd");
        assert_eq!(external, "0xabcd");
    }

    #[test]
    fn should_preserve_extra_slashes_after_first_segment() {
        let (canonical, external) = normalize("lan", "sub/device/01").unwrap();
        assert_eq!(canonical, "lan/sub/device/01");
        assert_eq!(external, "sub/device/01");
    }

    #[test]
    fn should_reject_empty_protocol() {
        let result = normalize("  ", "bulb-01");
        assert!(matches!(
            result,
            Err(ValidationError::ProtocolExternalRequired)
        ));
    }

    #[test]
    fn should_reject_when_nothing_remains_after_stripping_prefix() {
        let result = normalize("zigbee", "zigbee");
        assert!(matches!(
            result,
            Err(ValidationError::ProtocolExternalRequired)
        ));
    }

    #[test]
    fn should_split_canonical_id_on_first_slash_only() {
        let (protocol, external) = split("lan/sub/device/01").unwrap();
        assert_eq!(protocol, "lan");
        assert_eq!(external, "sub/device/01");
    }

    #[test]
    fn should_reject_split_without_slash() {
        let result = split("lanonly");
        assert!(matches!(result, Err(ValidationError::NotCanonical)));
    }

    #[test]
    fn should_reject_split_with_empty_side() {
        assert!(matches!(split("/bulb-01"), Err(ValidationError::NotCanonical)));
        assert!(matches!(split("lan/"), Err(ValidationError::NotCanonical)));
    }

    #[test]
    fn should_round_trip_build_of_split_for_canonical_ids() {
        for canonical in ["lan/bulb-01", "zigbee/0xabcd", "lan/sub/device/01"] {
            let (protocol, external) = split(canonical).unwrap();
            assert_eq!(build(&protocol, &external), canonical);
        }
    }
}
