//! Language identifiers

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{constants::languages, error::JudgeError};

/// Closed set of languages the engine can judge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageId {
    C,
    Cpp,
    Java,
    Python,
    Rust,
    Go,
}

impl LanguageId {
    /// Every supported language, in registry order
    pub const ALL: [LanguageId; 6] = [
        LanguageId::C,
        LanguageId::Cpp,
        LanguageId::Java,
        LanguageId::Python,
        LanguageId::Rust,
        LanguageId::Go,
    ];

    /// Canonical identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::C => languages::C,
            Self::Cpp => languages::CPP,
            Self::Java => languages::JAVA,
            Self::Python => languages::PYTHON,
            Self::Rust => languages::RUST,
            Self::Go => languages::GO,
        }
    }
}

impl FromStr for LanguageId {
    type Err = JudgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "c" => Ok(Self::C),
            "cpp" | "c++" | "cxx" => Ok(Self::Cpp),
            "java" => Ok(Self::Java),
            "python" | "python3" | "py" => Ok(Self::Python),
            "rust" | "rs" => Ok(Self::Rust),
            "go" | "golang" => Ok(Self::Go),
            _ => Err(JudgeError::UnsupportedLanguage(s.to_string())),
        }
    }
}

impl std::fmt::Display for LanguageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("C++".parse::<LanguageId>().unwrap(), LanguageId::Cpp);
        assert_eq!(" python3 ".parse::<LanguageId>().unwrap(), LanguageId::Python);
        assert_eq!("golang".parse::<LanguageId>().unwrap(), LanguageId::Go);
        assert_eq!("JAVA".parse::<LanguageId>().unwrap(), LanguageId::Java);
    }

    #[test]
    fn test_unknown_language_is_rejected() {
        let err = "cobol".parse::<LanguageId>().unwrap_err();
        assert!(matches!(err, JudgeError::UnsupportedLanguage(ref l) if l == "cobol"));
    }

    #[test]
    fn test_canonical_ids_round_trip() {
        for language in LanguageId::ALL {
            assert_eq!(language.as_str().parse::<LanguageId>().unwrap(), language);
        }
        assert_eq!(languages::ALL.len(), LanguageId::ALL.len());
    }
}
