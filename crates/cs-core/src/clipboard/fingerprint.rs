use std::hash::Hasher;

use twox_hash::XxHash64;

/// Fingerprint returned for empty or absent content.
pub const EMPTY_FINGERPRINT: &str = "";

const FINGERPRINT_SEED: u64 = 0;

/// Deterministic, non-cryptographic digest of clipboard text.
///
/// Used only as a dedup / loop-prevention key. Empty and absent input both
/// map to [`EMPTY_FINGERPRINT`].
///
/// ```
/// use cs_core::fingerprint;
///
/// assert_eq!(fingerprint("hello"), fingerprint("hello"));
/// assert_eq!(fingerprint(""), fingerprint(None));
/// ```
pub fn fingerprint<'a>(text: impl Into<Option<&'a str>>) -> String {
    match text.into() {
        Some(text) if !text.is_empty() => {
            let mut hasher = XxHash64::with_seed(FINGERPRINT_SEED);
            hasher.write(text.as_bytes());
            format!("{:016x}", hasher.finish())
        }
        _ => EMPTY_FINGERPRINT.to_string(),
    }
}
