//! Shared key generation for storage backends.
//!
//! Original key format: `media/{uuid}.{ext}`. Variant key format: the
//! original key with `@{width}` inserted before the extension of the final
//! path segment.

use galerie_core::VariantSpec;
use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

const MEDIA_PREFIX: &str = "media";

static DERIVED_KEY: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?s)^(?P<stem>(?:.*/)?[^/]+)@(?P<width>[1-9][0-9]*)\.(?P<ext>[^./]+)$").ok()
});

/// Generate a fresh storage key for an uploaded original.
///
/// The stem is a random UUID, so the result never looks like a derived key.
pub fn original_key(extension: &str) -> String {
    let extension = extension.trim_start_matches('.').to_lowercase();
    if extension.is_empty() {
        format!("{}/{}", MEDIA_PREFIX, Uuid::new_v4())
    } else {
        format!("{}/{}.{}", MEDIA_PREFIX, Uuid::new_v4(), extension)
    }
}

/// Key of the `width`-pixel variant of `original_key`.
///
/// `a/b.jpg` with 300 becomes `a/b@300.jpg`. Keys whose final segment has no
/// extension (no stem like `.hidden`, or a trailing dot like `a.`) are
/// returned unchanged.
pub fn derive_key(original_key: &str, width: u32) -> String {
    let segment_start = original_key.rfind('/').map(|i| i + 1).unwrap_or(0);
    let segment = &original_key[segment_start..];

    match segment.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < segment.len() => {
            let split = segment_start + dot;
            format!(
                "{}@{}{}",
                &original_key[..split],
                width,
                &original_key[split..]
            )
        }
        _ => original_key.to_string(),
    }
}

/// Key of the given variant of `original_key`.
pub fn derive_variant_key(original_key: &str, variant: &VariantSpec) -> String {
    derive_key(original_key, variant.width)
}

/// Recover `(original_key, width)` from a derived key.
///
/// Returns `None` for anything that is not a derived key, including bare
/// original keys.
pub fn parse(derived_key: &str) -> Option<(String, u32)> {
    let pattern = DERIVED_KEY.as_ref()?;
    let captures = pattern.captures(derived_key)?;

    let width = captures.name("width")?.as_str().parse::<u32>().ok()?;
    let stem = captures.name("stem")?.as_str();
    let ext = captures.name("ext")?.as_str();

    Some((format!("{}.{}", stem, ext), width))
}
