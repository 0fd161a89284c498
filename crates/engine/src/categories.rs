//! Fixed expense categories.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Category of an expense. The set is closed: extraction results are mapped
/// onto it and the stored value is always [`Category::as_str`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Housing,
    Transportation,
    Food,
    Utilities,
    Insurance,
    #[serde(rename = "Medical/Healthcare")]
    MedicalHealthcare,
    Savings,
    Debt,
    Education,
    Entertainment,
    Other,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Self::Housing,
        Self::Transportation,
        Self::Food,
        Self::Utilities,
        Self::Insurance,
        Self::MedicalHealthcare,
        Self::Savings,
        Self::Debt,
        Self::Education,
        Self::Entertainment,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Housing => "Housing",
            Self::Transportation => "Transportation",
            Self::Food => "Food",
            Self::Utilities => "Utilities",
            Self::Insurance => "Insurance",
            Self::MedicalHealthcare => "Medical/Healthcare",
            Self::Savings => "Savings",
            Self::Debt => "Debt",
            Self::Education => "Education",
            Self::Entertainment => "Entertainment",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive lookup by display name.
impl TryFrom<&str> for Category {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| EngineError::InvalidCategory(trimmed.to_string()))
    }
}
