//! Assessment questions that carry generated media.
//!
//! Only the media columns are read and written by tooling; the rest of the
//! question is owned by the application.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::ids::QuestionId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AssessmentQuestion {
    pub id: QuestionId,
    pub title: String,
    pub dimension: Option<String>,
    pub age_group: Option<String>,
    pub image_url: Option<String>,
    pub image_prompt: Option<String>,
    pub audio_url: Option<String>,
    pub audio_text: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl AssessmentQuestion {
    /// Prompt to generate an illustration from, when one is still needed.
    pub fn pending_image_prompt(&self) -> Option<&str> {
        if present(&self.image_url).is_some() {
            return None;
        }
        present(&self.image_prompt)
    }

    /// Narration text, when audio is still needed.
    pub fn pending_audio_text(&self) -> Option<&str> {
        if present(&self.audio_url).is_some() {
            return None;
        }
        present(&self.audio_text)
    }

    /// Storage key for the question's illustration.
    pub fn image_key(&self) -> String {
        format!("assessment-images/question-{}.png", self.id)
    }

    /// Storage key for the question's narration.
    pub fn audio_key(&self) -> String {
        format!("assessment-audio/question-{}.mp3", self.id)
    }
}
