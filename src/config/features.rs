//! Feature flags configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Feature flags for enabling/disabling functionality
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureFlags {
    /// Record webhook events without touching Quay or the newsletter.
    /// For staging environments pointed at production vendor accounts.
    #[serde(default)]
    pub skip_provisioning: bool,

    /// Run the periodic renewal scan
    #[serde(default = "default_enable_renewal_scan")]
    pub enable_renewal_scan: bool,

    /// Hours between renewal scans
    #[serde(default = "default_renewal_scan_interval")]
    pub renewal_scan_interval_hours: u64,
}

impl FeatureFlags {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enable_renewal_scan && self.renewal_scan_interval_hours == 0 {
            return Err(ValidationError::InvalidScanInterval);
        }
        Ok(())
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            skip_provisioning: false,
            enable_renewal_scan: default_enable_renewal_scan(),
            renewal_scan_interval_hours: default_renewal_scan_interval(),
        }
    }
}

fn default_enable_renewal_scan() -> bool {
    true
}

fn default_renewal_scan_interval() -> u64 {
    24
}
