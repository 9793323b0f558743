use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use unicode_segmentation::UnicodeSegmentation;

const MAX_LEN: usize = 256;

/// A validated name of a participant or contact person
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct PersonName(String);

impl AsRef<str> for PersonName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PersonName {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        lazy_static::lazy_static! {
            static ref INVALID_CHARS: HashSet<char> =
                vec!['/', '(', ')', '"', '<', '>', '\\', '{', '}'].into_iter().collect();
        }

        let value = value.trim();
        if value.is_empty() {
            return Err("Name cannot be empty".into());
        }
        if value.graphemes(true).count() > MAX_LEN {
            return Err("Name too long".into());
        }
        if value.chars().any(|c| INVALID_CHARS.contains(&c)) {
            return Err("Name contains invalid characters".into());
        }
        Ok(Self(value.to_string()))
    }
}

impl TryFrom<String> for PersonName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
