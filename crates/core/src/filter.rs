//! Grouping filters applied on store lookups.

use serde::{Deserialize, Serialize};

use crate::snapshot::{OfferAttributes, Verification};

/// Restricts snapshots by grouping attributes.
///
/// An empty filter matches everything. GPU name tokens match as
/// case-insensitive substrings; any token matching is enough.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFilter {
    /// Lowercased GPU name substrings
    pub gpu_names: Vec<String>,
    /// Accepted GPU counts per offer
    pub gpu_counts: Vec<i32>,
    /// Accepted verification tier
    pub verification: Option<Verification>,
}

impl SnapshotFilter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds GPU name substrings. Blank tokens are ignored.
    #[must_use]
    pub fn with_gpu_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.gpu_names.extend(
            names
                .into_iter()
                .map(|n| n.as_ref().trim().to_lowercase())
                .filter(|n| !n.is_empty()),
        );
        self
    }

    /// Adds accepted GPU counts.
    #[must_use]
    pub fn with_gpu_counts(mut self, counts: impl IntoIterator<Item = i32>) -> Self {
        self.gpu_counts.extend(counts);
        self
    }

    /// Restricts to one verification tier.
    #[must_use]
    pub fn with_verification(mut self, verification: Verification) -> Self {
        self.verification = Some(verification);
        self
    }

    /// Returns true if no restriction is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gpu_names.is_empty() && self.gpu_counts.is_empty() && self.verification.is_none()
    }

    /// Returns true if a snapshot with these attributes passes the filter.
    #[must_use]
    pub fn matches(&self, attributes: &OfferAttributes) -> bool {
        if !self.gpu_names.is_empty() {
            let Some(name) = attributes.gpu_name.as_deref() else {
                return false;
            };
            let name = name.to_lowercase();
            if !self.gpu_names.iter().any(|token| name.contains(token)) {
                return false;
            }
        }

        if !self.gpu_counts.is_empty() && !self.gpu_counts.contains(&attributes.num_gpus) {
            return false;
        }

        match self.verification {
            Some(tier) => attributes.verification == tier,
            None => true,
        }
    }

    /// Returns the GPU name tokens as `ILIKE` patterns (`%token%`).
    #[must_use]
    pub fn gpu_name_patterns(&self) -> Vec<String> {
        self.gpu_names
            .iter()
            .map(|token| format!("%{}%", token.replace('%', "\\%").replace('_', "\\_")))
            .collect()
    }
}
