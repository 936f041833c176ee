use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ConfidenceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    #[serde(default = "default_explicit_initial")]
    pub explicit_initial: f64,
    #[serde(default = "default_implicit_initial")]
    pub implicit_initial: f64,
    #[serde(default = "default_boost_step")]
    pub boost_step: f64,
    #[serde(default = "default_penalize_step")]
    pub penalize_step: f64,
    /// Multiplier applied to either step when feedback comes from a person.
    #[serde(default = "default_human_weight")]
    pub human_weight: f64,
}

fn default_explicit_initial() -> f64 {
    0.8
}

fn default_implicit_initial() -> f64 {
    0.4
}

fn default_boost_step() -> f64 {
    0.10
}

fn default_penalize_step() -> f64 {
    0.15
}

fn default_human_weight() -> f64 {
    3.0
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            explicit_initial: default_explicit_initial(),
            implicit_initial: default_implicit_initial(),
            boost_step: default_boost_step(),
            penalize_step: default_penalize_step(),
            human_weight: default_human_weight(),
        }
    }
}

// ---------------------------------------------------------------------------
// DecayFunction
// ---------------------------------------------------------------------------

/// How idle time turns into confidence loss during maintenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecayFunction {
    /// Subtract `amount` once per full idle window.
    Step { amount: f64 },
    /// Subtract `per_day` for every idle day past the window.
    Linear { per_day: f64 },
    /// Never decay; only the floor and capacity rules apply.
    None,
}

impl Default for DecayFunction {
    fn default() -> Self {
        DecayFunction::Step { amount: 0.10 }
    }
}

// ---------------------------------------------------------------------------
// ArchivalConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivalConfig {
    #[serde(default = "default_max_deltas")]
    pub max_deltas: usize,
    #[serde(default = "default_floor")]
    pub floor: f64,
    #[serde(default = "default_stale_days")]
    pub stale_days: u32,
    #[serde(default)]
    pub decay: DecayFunction,
}

fn default_max_deltas() -> usize {
    50
}

fn default_floor() -> f64 {
    0.20
}

fn default_stale_days() -> u32 {
    30
}

impl Default for ArchivalConfig {
    fn default() -> Self {
        Self {
            max_deltas: default_max_deltas(),
            floor: default_floor(),
            stale_days: default_stale_days(),
            decay: DecayFunction::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// SyncConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_problem_max_chars")]
    pub problem_max_chars: usize,
    #[serde(default = "default_content_max_chars")]
    pub content_max_chars: usize,
    #[serde(default = "default_stale_sync_days")]
    pub stale_sync_days: i64,
}

fn default_problem_max_chars() -> usize {
    80
}

fn default_content_max_chars() -> usize {
    120
}

fn default_stale_sync_days() -> i64 {
    7
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            problem_max_chars: default_problem_max_chars(),
            content_max_chars: default_content_max_chars(),
            stale_sync_days: default_stale_sync_days(),
        }
    }
}

// ---------------------------------------------------------------------------
// ReportConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_top_n() -> usize {
    5
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_target_document")]
    pub target_document: String,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub archival: ArchivalConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

fn default_version() -> u32 {
    1
}

fn default_target_document() -> String {
    paths::DEFAULT_TARGET_DOCUMENT.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            target_document: default_target_document(),
            confidence: ConfidenceConfig::default(),
            archival: ArchivalConfig::default(),
            sync: SyncConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Config {
    /// Load `.playbook/config.yaml`, falling back to defaults when it is absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        let Some(data) = crate::io::read_optional(&path)? else {
            return Ok(Self::default());
        };
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Like `load`, but an unreadable or malformed file falls back to the
    /// defaults. For read-only commands.
    pub fn load_or_default(root: &Path) -> Self {
        Self::load(root).unwrap_or_else(|e| {
            tracing::warn!(
                path = %paths::config_path(root).display(),
                error = %e,
                "using default config"
            );
            Self::default()
        })
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn target_path(&self, root: &Path) -> std::path::PathBuf {
        paths::target_path(root, &self.target_document)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message });
        };

        let c = &self.confidence;
        for (name, v) in [
            ("confidence.explicit_initial", c.explicit_initial),
            ("confidence.implicit_initial", c.implicit_initial),
            ("archival.floor", self.archival.floor),
        ] {
            if !(0.0..=1.0).contains(&v) {
                push(WarnLevel::Error, format!("{name}={v} is outside [0.0, 1.0]"));
            }
        }
        for (name, v) in [
            ("confidence.boost_step", c.boost_step),
            ("confidence.penalize_step", c.penalize_step),
        ] {
            if v <= 0.0 || v > 1.0 {
                push(WarnLevel::Error, format!("{name}={v} must be in (0.0, 1.0]"));
            }
        }
        if c.human_weight < 1.0 {
            push(
                WarnLevel::Warning,
                format!(
                    "confidence.human_weight={} makes human feedback weaker than inferred feedback",
                    c.human_weight
                ),
            );
        }

        if self.archival.max_deltas == 0 {
            push(
                WarnLevel::Error,
                "archival.max_deltas=0 would archive every pattern".to_string(),
            );
        }
        if self.archival.stale_days == 0 {
            push(
                WarnLevel::Warning,
                "archival.stale_days=0 decays every pattern on each run".to_string(),
            );
        }
        if c.implicit_initial < self.archival.floor {
            push(
                WarnLevel::Warning,
                format!(
                    "implicit patterns start at {} which is below the archival floor {}",
                    c.implicit_initial, self.archival.floor
                ),
            );
        }
        match self.archival.decay {
            DecayFunction::Step { amount } if amount <= 0.0 => push(
                WarnLevel::Warning,
                format!("archival.decay.amount={amount} never decays; use type: none instead"),
            ),
            DecayFunction::Linear { per_day } if per_day <= 0.0 => push(
                WarnLevel::Warning,
                format!("archival.decay.per_day={per_day} never decays; use type: none instead"),
            ),
            _ => {}
        }

        if self.target_document.trim().is_empty() {
            push(WarnLevel::Error, "target_document is empty".to_string());
        }
        if self.sync.problem_max_chars < 4 {
            push(
                WarnLevel::Warning,
                format!(
                    "sync.problem_max_chars={} leaves no room for text",
                    self.sync.problem_max_chars
                ),
            );
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
