//! Pipeline stage definitions

use serde::Serialize;

/// One sequential step of the outline pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Identify the organizational features and sequencing the instructor uses
    Analysis,
    /// Propose a navigable outline structure from the analysis
    Planning,
    /// Produce the final outline, re-grounded against the original data
    Organization,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 3] = [Stage::Analysis, Stage::Planning, Stage::Organization];

    /// Template name prefix (`{name}-system.pmt` / `{name}-user.pmt`)
    pub fn template_name(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Planning => "planning",
            Self::Organization => "organization",
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Analysis => "Analysis",
            Self::Planning => "Planning",
            Self::Organization => "Organization",
        }
    }

    /// Whether the stage prompt embeds the original course data
    pub fn needs_materials(&self) -> bool {
        matches!(self, Self::Analysis | Self::Organization)
    }

    /// Whether the stage prompt embeds the preceding stage's output
    pub fn needs_previous_output(&self) -> bool {
        matches!(self, Self::Planning | Self::Organization)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A fully-formed prompt for one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInput {
    pub system_instruction: String,
    pub user_instruction: String,
}
