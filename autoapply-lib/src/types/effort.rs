use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How much generation work an application is allowed to spend.
///
/// The level is decided outside the core (effort planning is an external
/// collaborator); the engine consumes it as an execution hint and as a
/// counter dimension on the owning session.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EffortLevel {
    /// Resume-only, no tailored generation
    Low,
    /// Tailored answers, default
    Medium,
    /// Full cover letter and question answering
    High,
}

impl Default for EffortLevel {
    fn default() -> Self {
        Self::Medium
    }
}

impl EffortLevel {
    /// The next level up, saturating at [`EffortLevel::High`]
    #[must_use]
    pub const fn upgraded(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium | Self::High => Self::High,
        }
    }

    /// The next level down, saturating at [`EffortLevel::Low`]
    #[must_use]
    pub const fn downgraded(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }
}
