use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoachError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionTopic {
    Project,
    Progress,
    User,
    Constraints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
}

impl QuestionStatus {
    /// Completed and skipped questions survive a backlog replacement.
    pub fn is_settled(self) -> bool {
        matches!(self, QuestionStatus::Completed | QuestionStatus::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionStatus::Pending => "pending",
            QuestionStatus::InProgress => "in_progress",
            QuestionStatus::Completed => "completed",
            QuestionStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionItem {
    pub id: String,
    pub question: String,
    pub topic: QuestionTopic,
    pub status: QuestionStatus,
    #[serde(default, rename = "memoryField", skip_serializing_if = "Option::is_none")]
    pub memory_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

const DEFAULT_QUESTIONS: &[(&str, &str, QuestionTopic, &str)] = &[
    (
        "q-project-desc",
        "Can you tell me more about your project idea?",
        QuestionTopic::Project,
        "project.description",
    ),
    (
        "q-progress",
        "What have you already accomplished on this project?",
        QuestionTopic::Progress,
        "progress.activities",
    ),
    (
        "q-user-skills",
        "What skills or expertise do you bring to this project?",
        QuestionTopic::User,
        "user.skills",
    ),
    (
        "q-user-assets",
        "What other assets do you have? (network, partners, data...)",
        QuestionTopic::User,
        "user.assets",
    ),
    (
        "q-constraints-lacking",
        "What are you lacking to succeed in this project?",
        QuestionTopic::Constraints,
        "user.constraints.lacking",
    ),
    (
        "q-constraints-time",
        "How much time can you dedicate to this project?",
        QuestionTopic::Constraints,
        "user.constraints.time",
    ),
    (
        "q-constraints-budget",
        "What budget do you have available?",
        QuestionTopic::Constraints,
        "user.constraints.budget",
    ),
];

/// The backlog every new session starts with, all pending.
pub fn default_backlog() -> Vec<QuestionItem> {
    DEFAULT_QUESTIONS
        .iter()
        .map(|(id, question, topic, field)| QuestionItem {
            id: (*id).to_string(),
            question: (*question).to_string(),
            topic: *topic,
            status: QuestionStatus::Pending,
            memory_field: Some((*field).to_string()),
            answer: None,
        })
        .collect()
}

/// Replace every open question with `new_questions`.
///
/// Completed and skipped items keep their ids and order. The first new
/// question becomes `in_progress`, the rest `pending`. `stamp` makes the
/// generated ids (`q-dynamic-<stamp>-<i>`) unique across replacements.
pub fn replace_pending(
    questions: &[QuestionItem],
    new_questions: &[String],
    stamp: i64,
) -> Vec<QuestionItem> {
    let mut out: Vec<QuestionItem> = questions
        .iter()
        .filter(|q| q.status.is_settled())
        .cloned()
        .collect();

    let fresh = new_questions
        .iter()
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .enumerate()
        .map(|(i, question)| QuestionItem {
            id: format!("q-dynamic-{stamp}-{i}"),
            question: question.to_string(),
            topic: QuestionTopic::Project,
            status: if i == 0 {
                QuestionStatus::InProgress
            } else {
                QuestionStatus::Pending
            },
            memory_field: None,
            answer: None,
        });
    out.extend(fresh);
    out
}

/// Mark `id` completed, recording the answer when one is given.
pub fn complete(questions: &mut [QuestionItem], id: &str, answer: Option<String>) -> Result<()> {
    let item = questions
        .iter_mut()
        .find(|q| q.id == id)
        .ok_or_else(|| CoachError::QuestionNotFound(id.to_string()))?;
    item.status = QuestionStatus::Completed;
    if answer.is_some() {
        item.answer = answer;
    }
    Ok(())
}

/// Questions still to be asked, the in-progress one included.
pub fn pending(questions: &[QuestionItem]) -> Vec<&QuestionItem> {
    questions
        .iter()
        .filter(|q| matches!(q.status, QuestionStatus::Pending | QuestionStatus::InProgress))
        .collect()
}

pub fn current(questions: &[QuestionItem]) -> Option<&QuestionItem> {
    questions
        .iter()
        .find(|q| q.status == QuestionStatus::InProgress)
}
