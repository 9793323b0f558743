use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Who a participant is registered as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Member of the hosting club
    Member,
    /// Participant from outside the club
    External,
    Trainer,
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Member => "member",
            Role::External => "external",
            Role::Trainer => "trainer",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "member" => Ok(Self::Member),
            "external" => Ok(Self::External),
            "trainer" => Ok(Self::Trainer),
            other => Err(format!("{} is not a valid participant role", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
