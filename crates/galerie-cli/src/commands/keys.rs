use crate::commands::print_json;
use galerie_storage::keys;

pub fn derive(original_key: &str, width: u32) -> anyhow::Result<()> {
    if width == 0 {
        anyhow::bail!("width must be at least 1");
    }
    print_json(&serde_json::json!({
        "original_key": original_key,
        "width": width,
        "derived_key": keys::derive_key(original_key, width),
    }))
}

pub fn parse(derived_key: &str) -> anyhow::Result<()> {
    let (original_key, width) = keys::parse(derived_key)
        .ok_or_else(|| anyhow::anyhow!("{} is not a derived variant key", derived_key))?;
    print_json(&serde_json::json!({
        "derived_key": derived_key,
        "original_key": original_key,
        "width": width,
    }))
}
