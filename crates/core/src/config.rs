use crate::broker::SponsorshipTier;
use chrono::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub allocation: AllocationConfig,
    pub ranking: RankingPolicy,
    pub recorder: RecorderConfig,
    pub charge: ChargeConfig,
    pub audit: AuditConfig,
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://placements.db?mode=rwc".to_string(),
            max_connections: 8,
        }
    }
}

// =============================================================================
// Allocation
// =============================================================================

/// Whether a placement has an organic equivalent to fall back to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementKind {
    #[default]
    Organic,
    /// Pure ad slot; fallback is a programmatic container.
    Programmatic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementConfig {
    pub slug: String,
    pub slots: usize,
    #[serde(default)]
    pub kind: PlacementKind,
    #[serde(default)]
    pub frequency_cap: Option<u32>,
    #[serde(default)]
    pub frequency_window_secs: Option<u64>,
}

/// Placement settings after defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlacement {
    pub slug: String,
    pub slots: usize,
    pub kind: PlacementKind,
    pub frequency_cap: u32,
    pub frequency_window: Duration,
}

/// Frequency windows are clamped to ten years.
const MAX_FREQUENCY_WINDOW_SECS: u64 = 10 * 366 * 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Hard budget for one allocate call, fallback read and winner stamping included.
    pub timeout_ms: u64,
    /// Budget for the catalog read inside an allocate call.
    pub catalog_timeout_ms: u64,
    pub default_slots: usize,
    pub default_frequency_cap: u32,
    pub default_frequency_window_secs: u64,
    pub placements: Vec<PlacementConfig>,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 50,
            catalog_timeout_ms: 20,
            default_slots: 1,
            default_frequency_cap: 3,
            default_frequency_window_secs: 86_400,
            placements: Vec::new(),
        }
    }
}

impl AllocationConfig {
    /// Resolves a placement slug, falling back to defaults for unknown slugs.
    #[must_use]
    pub fn placement(&self, slug: &str) -> ResolvedPlacement {
        let configured = self.placements.iter().find(|p| p.slug == slug);
        let window_secs = configured
            .and_then(|p| p.frequency_window_secs)
            .unwrap_or(self.default_frequency_window_secs);

        ResolvedPlacement {
            slug: slug.to_string(),
            slots: configured.map_or(self.default_slots, |p| p.slots),
            kind: configured.map(|p| p.kind).unwrap_or_default(),
            frequency_cap: configured
                .and_then(|p| p.frequency_cap)
                .unwrap_or(self.default_frequency_cap),
            frequency_window: Duration::seconds(
                i64::try_from(window_secs.min(MAX_FREQUENCY_WINDOW_SECS)).unwrap_or(0),
            ),
        }
    }

    #[must_use]
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn catalog_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.catalog_timeout_ms)
    }
}

// =============================================================================
// Ranking policy
// =============================================================================

/// Numeric priority per sponsorship tier. Higher always outranks lower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierWeights {
    pub none: u32,
    pub bronze: u32,
    pub silver: u32,
    pub gold: u32,
    pub platinum: u32,
}

impl Default for TierWeights {
    fn default() -> Self {
        Self {
            none: 0,
            bronze: 10,
            silver: 20,
            gold: 30,
            platinum: 40,
        }
    }
}

impl TierWeights {
    #[must_use]
    pub const fn weight(&self, tier: SponsorshipTier) -> u32 {
        match tier {
            SponsorshipTier::None => self.none,
            SponsorshipTier::Bronze => self.bronze,
            SponsorshipTier::Silver => self.silver,
            SponsorshipTier::Gold => self.gold,
            SponsorshipTier::Platinum => self.platinum,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingPolicy {
    pub tier_weights: TierWeights,
    /// Divisor turning a monthly fee into a daily-equivalent bid.
    pub featured_days_per_month: u32,
}

impl Default for RankingPolicy {
    fn default() -> Self {
        Self {
            tier_weights: TierWeights::default(),
            featured_days_per_month: 30,
        }
    }
}

// =============================================================================
// Workers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4_096,
            max_attempts: 3,
            base_backoff_ms: 25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargeConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ChargeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff_ms: 50,
            max_backoff_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub interval_secs: u64,
    pub replay_batch: i64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            replay_batch: 100,
        }
    }
}
