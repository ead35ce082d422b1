use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// Named processor bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Markdown,
    Shiki,
    Mermaid,
    Math,
    Full,
}

impl Preset {
    pub const ALL: [Preset; 5] = [
        Preset::Markdown,
        Preset::Shiki,
        Preset::Mermaid,
        Preset::Math,
        Preset::Full,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Shiki => "shiki",
            Self::Mermaid => "mermaid",
            Self::Math => "math",
            Self::Full => "full",
        }
    }

    /// Processor names the preset requests. Dependencies are added during resolution.
    #[must_use]
    pub fn processor_names(self) -> &'static [&'static str] {
        match self {
            Self::Markdown => &["markdown"],
            Self::Shiki => &["highlight"],
            Self::Mermaid => &["mermaid"],
            Self::Math => &["math"],
            Self::Full => &["markdown", "highlight", "mermaid", "math"],
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "markdown" => Ok(Self::Markdown),
            "shiki" | "highlight" => Ok(Self::Shiki),
            "mermaid" => Ok(Self::Mermaid),
            "math" => Ok(Self::Math),
            "full" => Ok(Self::Full),
            _ => Err(PipelineError::UnknownPreset {
                name: value.to_string(),
            }),
        }
    }
}
