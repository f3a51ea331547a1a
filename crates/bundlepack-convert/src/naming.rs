//! Object names and template file names

use serde::Serialize;
use sha2::{Digest, Sha224};

use crate::error::Result;

/// Maximum length of a generated object name
pub const MAX_NAME_LENGTH: usize = 63;

/// Chart-relative template path for an object
///
/// `templates/<group>.<Kind>-<name>.yaml`, with `core` standing in for the
/// empty API group.
pub fn file_name_for_object(api_version: &str, kind: &str, name: &str) -> String {
    let group = match api_version.rsplit_once('/') {
        Some((group, _)) if !group.is_empty() => group,
        _ => "core",
    };
    format!("templates/{}.{}-{}.yaml", group, kind, name)
}

/// `base-suffix`, with the base shortened to fit [`MAX_NAME_LENGTH`]
pub fn name_with_suffix(base: &str, suffix: &str) -> String {
    let keep = MAX_NAME_LENGTH.saturating_sub(suffix.len() + 1);
    let base = truncate_at_char_boundary(base, keep).trim_end_matches(['-', '.']);
    format!("{}-{}", base, suffix)
}

/// Name of the Service fronting a deployment's webhooks
pub fn webhook_service_name(deployment: &str) -> String {
    name_with_suffix(&deployment.replace('.', "-"), "service")
}

/// `base-<hash of object>`, shortened to fit [`MAX_NAME_LENGTH`]
///
/// Only the base is ever truncated; the hash suffix is kept whole.
pub fn generate_name<T: Serialize>(base: &str, object: &T) -> Result<String> {
    let hash = hash_object(object)?;

    let mut base = base.to_string();
    if base.len() + hash.len() + 1 > MAX_NAME_LENGTH {
        let keep = MAX_NAME_LENGTH.saturating_sub(hash.len() + 1);
        base = truncate_at_char_boundary(&base, keep)
            .trim_end_matches(['-', '.'])
            .to_string();
    }

    if base.is_empty() {
        return Ok(hash);
    }
    Ok(format!("{}-{}", base, hash))
}

/// Stable base36 SHA-224 digest of an object's JSON form
pub fn hash_object<T: Serialize>(object: &T) -> Result<String> {
    // serde_json maps are ordered, so equal objects serialize identically
    let json = serde_json::to_vec(object)?;
    Ok(base36(&Sha224::digest(&json)))
}

fn truncate_at_char_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn base36(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut number: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
    let mut digits = Vec::new();

    while !number.is_empty() {
        let mut remainder: u32 = 0;
        let mut quotient = Vec::with_capacity(number.len());
        for byte in &number {
            let acc = (remainder << 8) | u32::from(*byte);
            let q = (acc / 36) as u8;
            remainder = acc % 36;
            if !(quotient.is_empty() && q == 0) {
                quotient.push(q);
            }
        }
        digits.push(DIGITS[remainder as usize]);
        number = quotient;
    }

    if digits.is_empty() {
        digits.push(b'0');
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}
