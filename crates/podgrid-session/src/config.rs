//! Scheduler configuration knobs.
//!
//! Knobs arrive from deployment configuration and may be absent or out
//! of range; resolution applies defaults with a warning rather than
//! failing, so a bad knob never takes the scheduler down.

use serde::Deserialize;
use tracing::warn;

use podgrid_topology::HardwareProfile;

/// Reserve applied when no explicit reserve knob is configured.
pub const DEFAULT_RESERVE_POD_SIZE: u32 = 2;

/// Resolved scheduler configuration.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub profile: HardwareProfile,
    /// Maximum super-pod node count.
    pub super_pod_size: u32,
    /// Nodes each super-pod should keep unallocated for fault recovery.
    pub reserve_pod_size: u32,
}

impl SchedulerConfig {
    /// Configuration with the profile's defaults for both knobs.
    pub fn new(profile: HardwareProfile) -> Self {
        Self::from_knobs(profile, None, None)
    }

    /// Resolve raw knob values.
    ///
    /// An absent or non-positive super-pod size falls back to the
    /// profile default; the reserve is clamped below the super-pod
    /// size. Both fallbacks warn.
    pub fn from_knobs(
        profile: HardwareProfile,
        super_pod_size: Option<i64>,
        reserve_pod_size: Option<i64>,
    ) -> Self {
        let super_pod_size = match super_pod_size {
            Some(size) if size > 0 => size as u32,
            Some(size) => {
                warn!(
                    size,
                    default = profile.default_super_pod_size,
                    "super-pod size non-positive, using profile default"
                );
                profile.default_super_pod_size
            }
            None => profile.default_super_pod_size,
        };

        let default_reserve = DEFAULT_RESERVE_POD_SIZE.min(super_pod_size.saturating_sub(1));
        let reserve_pod_size = match reserve_pod_size {
            Some(reserve) if reserve >= 0 && (reserve as u32) < super_pod_size => reserve as u32,
            Some(reserve) => {
                warn!(
                    reserve,
                    super_pod_size, default = default_reserve,
                    "reserve must stay below the super-pod size, using default"
                );
                default_reserve
            }
            None => default_reserve,
        };

        Self {
            profile,
            super_pod_size,
            reserve_pod_size,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(HardwareProfile::default())
    }
}

/// On-disk configuration shape (TOML).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub profile: Option<String>,
    pub super_pod_size: Option<i64>,
    pub reserve_pod_size: Option<i64>,
}

impl ConfigFile {
    /// Resolve into a [`SchedulerConfig`], warning on unknown profiles.
    pub fn resolve(&self) -> SchedulerConfig {
        let profile = match self.profile.as_deref() {
            Some(name) => match HardwareProfile::by_name(name) {
                Some(profile) => profile,
                None => {
                    warn!(%name, "unknown hardware profile, using default");
                    HardwareProfile::default()
                }
            },
            None => HardwareProfile::default(),
        };
        SchedulerConfig::from_knobs(profile, self.super_pod_size, self.reserve_pod_size)
    }
}
