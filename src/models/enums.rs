use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a string does not name any variant of a closed enum.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {field} value: '{value}'")]
pub struct UnknownVariant {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(UnknownVariant {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// Declaration order is severity order: derived `Ord` relies on it.
str_enum!(UrgencyLevel {
    NonUrgent => "non_urgent",
    Standard => "standard",
    Urgent => "urgent",
    HighPriority => "high_priority",
    Critical => "critical",
});

impl UrgencyLevel {
    /// Tier for a 0-10 severity score. Fractional scores fall into the
    /// tier whose lower bound they have reached.
    pub fn from_score(score: f64) -> Self {
        if score >= 9.0 {
            Self::Critical
        } else if score >= 7.0 {
            Self::HighPriority
        } else if score >= 5.0 {
            Self::Urgent
        } else if score >= 3.0 {
            Self::Standard
        } else {
            Self::NonUrgent
        }
    }

    /// Lenient parse for model output: case-insensitive, accepts `-` or
    /// space in place of `_`.
    pub fn parse_lenient(raw: &str) -> Result<Self, UnknownVariant> {
        let normalized = raw.trim().to_lowercase().replace(['-', ' '], "_");
        normalized.parse().map_err(|_: UnknownVariant| UnknownVariant {
            field: "UrgencyLevel".into(),
            value: raw.into(),
        })
    }

    /// Inclusive score band shown in the assessment rubric.
    pub fn score_band(&self) -> (u8, u8) {
        match self {
            Self::NonUrgent => (0, 2),
            Self::Standard => (3, 4),
            Self::Urgent => (5, 6),
            Self::HighPriority => (7, 8),
            Self::Critical => (9, 10),
        }
    }
}

// Content-safety categories screened on every provider response.
str_enum!(SafetyCategory {
    Harassment => "harassment",
    HateSpeech => "hate_speech",
    SexuallyExplicit => "sexually_explicit",
    DangerousContent => "dangerous_content",
});

impl SafetyCategory {
    pub const ALL: [SafetyCategory; 4] = [
        SafetyCategory::Harassment,
        SafetyCategory::HateSpeech,
        SafetyCategory::SexuallyExplicit,
        SafetyCategory::DangerousContent,
    ];
}

// Declaration order matters: `Ord` compares likelihood.
str_enum!(HarmProbability {
    Negligible => "negligible",
    Low => "low",
    Medium => "medium",
    High => "high",
});

str_enum!(HarmThreshold {
    BlockLowAndAbove => "block_low_and_above",
    BlockMediumAndAbove => "block_medium_and_above",
    BlockOnlyHigh => "block_only_high",
    BlockNone => "block_none",
});

impl HarmThreshold {
    /// Whether a rating at `probability` is blocked by this threshold.
    pub fn blocks(&self, probability: HarmProbability) -> bool {
        match self {
            Self::BlockLowAndAbove => probability >= HarmProbability::Low,
            Self::BlockMediumAndAbove => probability >= HarmProbability::Medium,
            Self::BlockOnlyHigh => probability >= HarmProbability::High,
            Self::BlockNone => false,
        }
    }
}

str_enum!(ProviderKind {
    Gemini => "gemini",
    Ollama => "ollama",
});
