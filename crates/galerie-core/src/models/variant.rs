use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default variant table used when `IMAGE_VARIANTS` is not set.
pub const DEFAULT_VARIANTS: &str = "small:300,medium:800,large:1600";

/// A named target width for derived images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSpec {
    pub name: String,
    pub width: u32,
}

impl VariantSpec {
    pub fn new(name: impl Into<String>, width: u32) -> Self {
        Self {
            name: name.into(),
            width,
        }
    }
}

/// The fixed set of variants every asset is derived into.
///
/// Supplied once at startup and shared by the derivative queue and the
/// rotation coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSet {
    variants: Vec<VariantSpec>,
}

impl VariantSet {
    /// Build a set, rejecting duplicate or empty names and zero widths.
    pub fn new(variants: Vec<VariantSpec>) -> Result<Self, anyhow::Error> {
        let mut seen = HashSet::new();
        for variant in &variants {
            if variant.name.trim().is_empty() {
                anyhow::bail!("Variant name must not be empty");
            }
            if variant.width == 0 {
                anyhow::bail!("Variant '{}' must have a width of at least 1", variant.name);
            }
            if !seen.insert(variant.name.as_str()) {
                anyhow::bail!("Duplicate variant name: {}", variant.name);
            }
        }
        Ok(Self { variants })
    }

    /// Parse a `name:width` list such as `small:300,medium:800`.
    pub fn parse(s: &str) -> Result<Self, anyhow::Error> {
        let variants = s
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (name, width) = entry
                    .split_once(':')
                    .ok_or_else(|| anyhow::anyhow!("Invalid variant entry '{}'", entry))?;
                let width = width
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| anyhow::anyhow!("Invalid width in variant entry '{}'", entry))?;
                Ok(VariantSpec::new(name.trim(), width))
            })
            .collect::<Result<Vec<_>, anyhow::Error>>()?;
        Self::new(variants)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariantSpec> {
        self.variants.iter()
    }

    pub fn get(&self, name: &str) -> Option<&VariantSpec> {
        self.variants.iter().find(|v| v.name == name)
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

impl Default for VariantSet {
    fn default() -> Self {
        Self {
            variants: vec![
                VariantSpec::new("small", 300),
                VariantSpec::new("medium", 800),
                VariantSpec::new("large", 1600),
            ],
        }
    }
}

impl<'a> IntoIterator for &'a VariantSet {
    type Item = &'a VariantSpec;
    type IntoIter = std::slice::Iter<'a, VariantSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.variants.iter()
    }
}
