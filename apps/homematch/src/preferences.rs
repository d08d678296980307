//! Buyer Preferences: ordered question/answer pairs flattened into the text
//! used both as the search query and as personalization context.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceAnswer {
    pub question: String,
    pub answer: String,
}

/// Immutable once built; order is the questionnaire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyerPreferences {
    answers: Vec<PreferenceAnswer>,
}

impl BuyerPreferences {
    pub fn new<Q, A>(pairs: impl IntoIterator<Item = (Q, A)>) -> Self
    where
        Q: Into<String>,
        A: Into<String>,
    {
        Self {
            answers: pairs
                .into_iter()
                .map(|(q, a)| PreferenceAnswer {
                    question: q.into(),
                    answer: a.into(),
                })
                .collect(),
        }
    }

    /// Reads a JSON array of `{"question": ..., "answer": ...}` objects.
    pub async fn load(path: &Path) -> Result<Self, AppError> {
        let bytes = tokio::fs::read(path).await?;
        let answers: Vec<PreferenceAnswer> = serde_json::from_slice(&bytes)?;
        Ok(Self { answers })
    }

    pub fn answers(&self) -> &[PreferenceAnswer] {
        &self.answers
    }

    /// One `question: answer` line per pair.
    pub fn to_text(&self) -> String {
        self.answers
            .iter()
            .map(|a| format!("{}: {}", a.question, a.answer))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for BuyerPreferences {
    fn default() -> Self {
        Self::new([
            (
                "How big do you want your house to be?",
                "At least 3 bedrooms & 2 bathrooms",
            ),
            (
                "Which amenities would you like?",
                "Would like to have a large swimming pool",
            ),
            (
                "What is the most important thing you wish your neighborhood had?",
                "Great schools and parks nearby",
            ),
        ])
    }
}
