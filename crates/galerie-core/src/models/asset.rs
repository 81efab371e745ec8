use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Processing state of an asset's derived variants.
///
/// Forward transitions only, except that a failed or completed asset may be
/// sent back to `pending` (manual retry, re-derivation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "variant_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum VariantStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl VariantStatus {
    pub const ALL: [VariantStatus; 4] = [
        VariantStatus::Pending,
        VariantStatus::Processing,
        VariantStatus::Completed,
        VariantStatus::Failed,
    ];

    /// Whether a stored status may move to `next`. Writing the current value is always allowed.
    pub fn can_transition_to(self, next: VariantStatus) -> bool {
        use VariantStatus::*;

        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Pending)
                | (Failed, Processing)
                | (Completed, Pending)
                | (Completed, Processing)
        )
    }

    /// Statuses from which `next` is reachable.
    pub fn predecessors(next: VariantStatus) -> Vec<VariantStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, VariantStatus::Completed | VariantStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VariantStatus::Pending => "pending",
            VariantStatus::Processing => "processing",
            VariantStatus::Completed => "completed",
            VariantStatus::Failed => "failed",
        }
    }
}

impl Display for VariantStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariantStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(VariantStatus::Pending),
            "processing" => Ok(VariantStatus::Processing),
            "completed" => Ok(VariantStatus::Completed),
            "failed" => Ok(VariantStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid variant status: {}", s)),
        }
    }
}

/// One uploaded image, as far as the derivative pipeline is concerned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct Asset {
    pub id: Uuid,
    pub original_key: String,
    pub mime_type: String,
    pub variant_status: VariantStatus,
    pub created_at: DateTime<Utc>,
    /// Last time any stored representation of this asset was rewritten.
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    pub fn new(id: Uuid, original_key: impl Into<String>, mime_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            original_key: original_key.into(),
            mime_type: mime_type.into(),
            variant_status: VariantStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Query value that changes whenever the asset's representations change.
    pub fn cache_buster(&self) -> String {
        format!("v={}", self.updated_at.timestamp_millis())
    }

    /// Append the cache-busting query parameter to a public URL.
    pub fn with_cache_buster(&self, url: &str) -> String {
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", url, separator, self.cache_buster())
    }
}
