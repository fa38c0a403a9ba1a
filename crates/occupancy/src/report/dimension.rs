//! Grouping dimensions for reports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use vastwatch_core::OfferAttributes;

/// Label used when an attribute was not reported.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Buckets a per-offer GPU count: `1x`..`10x`, `10x+`, or `unknown`.
#[must_use]
pub fn gpu_count_bucket(num_gpus: i32) -> String {
    match num_gpus {
        1..=10 => format!("{num_gpus}x"),
        n if n > 10 => "10x+".to_string(),
        _ => UNKNOWN_LABEL.to_string(),
    }
}

/// A dimension to group offers by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupDimension {
    /// GPU model name
    Gpu,
    /// GPU count bucket
    GpuCount,
    /// Geolocation
    Region,
    /// Verification tier
    Verification,
    /// GPU model and count bucket together
    GpuAndCount,
}

impl GroupDimension {
    /// Column header for the group label.
    #[must_use]
    pub fn header(&self) -> &'static str {
        match self {
            Self::Gpu => "gpu_name",
            Self::GpuCount => "gpus",
            Self::Region => "region",
            Self::Verification => "verification",
            Self::GpuAndCount => "gpu_name/gpus",
        }
    }

    /// Group label for an offer's attributes.
    #[must_use]
    pub fn label(&self, attributes: &OfferAttributes) -> String {
        match self {
            Self::Gpu => gpu_label(attributes),
            Self::GpuCount => gpu_count_bucket(attributes.num_gpus),
            Self::Region => attributes
                .geolocation
                .as_deref()
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .unwrap_or(UNKNOWN_LABEL)
                .to_string(),
            Self::Verification => attributes.verification.to_string(),
            Self::GpuAndCount => format!(
                "{} {}",
                gpu_label(attributes),
                gpu_count_bucket(attributes.num_gpus)
            ),
        }
    }
}

fn gpu_label(attributes: &OfferAttributes) -> String {
    attributes
        .gpu_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(UNKNOWN_LABEL)
        .to_string()
}

impl fmt::Display for GroupDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Gpu => "gpu",
            Self::GpuCount => "gpu-count",
            Self::Region => "region",
            Self::Verification => "verification",
            Self::GpuAndCount => "gpu-and-count",
        };
        write!(f, "{s}")
    }
}

impl FromStr for GroupDimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gpu" | "model" | "gpu-name" => Ok(Self::Gpu),
            "gpu-count" | "gpus" | "count" => Ok(Self::GpuCount),
            "region" | "geo" | "geolocation" => Ok(Self::Region),
            "verification" | "verified" => Ok(Self::Verification),
            "gpu-and-count" => Ok(Self::GpuAndCount),
            other => Err(format!(
                "unknown grouping '{other}', expected gpu, gpu-count, region, verification or gpu-and-count"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vastwatch_core::Verification;

    #[test]
    fn test_gpu_count_buckets() {
        assert_eq!(gpu_count_bucket(1), "1x");
        assert_eq!(gpu_count_bucket(10), "10x");
        assert_eq!(gpu_count_bucket(16), "10x+");
        assert_eq!(gpu_count_bucket(0), "unknown");
        assert_eq!(gpu_count_bucket(-1), "unknown");
    }

    #[test]
    fn test_labels() {
        let attrs = OfferAttributes::new("RTX 4090", 8)
            .with_geolocation("Texas, US")
            .with_verification(Verification::Verified);

        assert_eq!(GroupDimension::Gpu.label(&attrs), "RTX 4090");
        assert_eq!(GroupDimension::GpuCount.label(&attrs), "8x");
        assert_eq!(GroupDimension::Region.label(&attrs), "Texas, US");
        assert_eq!(GroupDimension::Verification.label(&attrs), "verified");
        assert_eq!(GroupDimension::GpuAndCount.label(&attrs), "RTX 4090 8x");

        let bare = OfferAttributes::default();
        assert_eq!(GroupDimension::Gpu.label(&bare), "unknown");
        assert_eq!(GroupDimension::Region.label(&bare), "unknown");
    }

    #[test]
    fn test_parse_dimension() {
        assert_eq!("gpu".parse::<GroupDimension>().unwrap(), GroupDimension::Gpu);
        assert_eq!(
            "GPU-COUNT".parse::<GroupDimension>().unwrap(),
            GroupDimension::GpuCount
        );
        assert!("colour".parse::<GroupDimension>().is_err());
        for dim in [
            GroupDimension::Gpu,
            GroupDimension::GpuCount,
            GroupDimension::Region,
            GroupDimension::Verification,
            GroupDimension::GpuAndCount,
        ] {
            assert_eq!(dim.to_string().parse::<GroupDimension>().unwrap(), dim);
        }
    }
}
