//! Supported languages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A language the site publishes in, identified by its ISO 639-1 code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ko,
    En,
    Ja,
    Zh,
    Es,
    Fr,
    De,
    Ru,
    Vi,
}

impl Language {
    /// Every supported language, in display order.
    pub const ALL: [Language; 9] = [
        Language::Ko,
        Language::En,
        Language::Ja,
        Language::Zh,
        Language::Es,
        Language::Fr,
        Language::De,
        Language::Ru,
        Language::Vi,
    ];

    /// Returns the ISO code used on the wire.
    pub fn code(self) -> &'static str {
        match self {
            Language::Ko => "ko",
            Language::En => "en",
            Language::Ja => "ja",
            Language::Zh => "zh",
            Language::Es => "es",
            Language::Fr => "fr",
            Language::De => "de",
            Language::Ru => "ru",
            Language::Vi => "vi",
        }
    }

    /// Returns `languages` without `source`, keeping order.
    pub fn targets(languages: &[Language], source: Language) -> Vec<Language> {
        languages
            .iter()
            .copied()
            .filter(|&lang| lang != source)
            .collect()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Returned when a code is not one of the supported languages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported language code: {0}")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_lowercase();
        Language::ALL
            .into_iter()
            .find(|lang| lang.code() == code)
            .ok_or(UnknownLanguage(s.to_string()))
    }
}
