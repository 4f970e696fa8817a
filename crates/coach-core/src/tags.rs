//! The tag protocol: machine-readable payloads the model embeds in its reply.
//!
//! Two tags are understood. `<memory_update>` carries a JSON object of memory
//! paths and is hidden from the user. `<question_backlog>` carries a JSON
//! array of questions and stays visible, as do `<thinking>` blocks.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::backlog::replace_pending;
use crate::error::{CoachError, Result};
use crate::memory::MemoryPatch;
use crate::session::Session;

pub const MEMORY_UPDATE: &str = "memory_update";
pub const QUESTION_BACKLOG: &str = "question_backlog";

static MEMORY_BLOCK_RE: OnceLock<Regex> = OnceLock::new();

fn memory_block_re() -> &'static Regex {
    MEMORY_BLOCK_RE.get_or_init(|| Regex::new(r"(?s)<memory_update>.*?</memory_update>").unwrap())
}

/// Body of the first `<tag>...</tag>` block, if the text has a closed one.
pub fn extract<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let len = text[start..].find(&close)?;
    Some(&text[start..start + len])
}

/// `None` when the text has no `<memory_update>` block.
pub fn parse_memory_update(text: &str) -> Option<Result<MemoryPatch>> {
    let body = extract(text, MEMORY_UPDATE)?;
    Some(
        serde_json::from_str::<Value>(body.trim())
            .map_err(|e| CoachError::malformed("memory_update", e.to_string()))
            .and_then(|value| MemoryPatch::from_json(&value)),
    )
}

/// `None` when the text has no `<question_backlog>` block.
pub fn parse_question_backlog(text: &str) -> Option<Result<Vec<String>>> {
    let body = extract(text, QUESTION_BACKLOG)?;
    Some(
        serde_json::from_str::<Vec<String>>(body.trim())
            .map_err(|e| CoachError::malformed("question_backlog", e.to_string())),
    )
}

/// Remove every `<memory_update>` block and trim the result.
pub fn strip_memory_updates(text: &str) -> String {
    memory_block_re().replace_all(text, "").trim().to_string()
}

/// What applying one model reply did to a session.
#[derive(Debug, Default)]
pub struct ProcessOutcome {
    pub clean_response: String,
    pub memory_updated: bool,
    pub backlog_updated: bool,
    /// Malformed tags, and memory fields dropped from an otherwise valid patch.
    /// A malformed tag leaves its part of the session untouched.
    pub errors: Vec<CoachError>,
}

/// Apply the tags found in `text` to `session`.
pub fn process_response(session: &mut Session, text: &str, stamp: i64) -> ProcessOutcome {
    let mut outcome = ProcessOutcome {
        clean_response: strip_memory_updates(text),
        ..ProcessOutcome::default()
    };

    match parse_memory_update(text) {
        Some(Ok(patch)) => {
            outcome.errors.extend(
                patch
                    .skipped
                    .iter()
                    .map(|reason| CoachError::malformed(MEMORY_UPDATE, reason.clone())),
            );
            if !patch.is_empty() {
                session.memory.apply(&patch);
                outcome.memory_updated = true;
            }
        }
        Some(Err(e)) => outcome.errors.push(e),
        None => {}
    }

    match parse_question_backlog(text) {
        Some(Ok(questions)) => {
            session.questions = replace_pending(&session.questions, &questions, stamp);
            outcome.backlog_updated = true;
        }
        Some(Err(e)) => outcome.errors.push(e),
        None => {}
    }

    if outcome.memory_updated || outcome.backlog_updated {
        session.touch();
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::QuestionStatus;

    const REPLY: &str = r#"<thinking>
- learned the project is a bakery tool
</thinking>
<memory_update>
{"project.description": "Scheduling tool for bakeries", "user.skills": ["baking"]}
</memory_update>
<question_backlog>
["Who would pay for it?", "Have you talked to bakers?"]
</question_backlog>

Great, tell me who would pay for it?"#;

    #[test]
    fn extract_takes_first_block() {
        let text = "<a>one</a> and <a>two</a>";
        assert_eq!(extract(text, "a"), Some("one"));
        assert_eq!(extract("<a>unclosed", "a"), None);
        assert_eq!(extract("nothing here", "a"), None);
    }

    #[test]
    fn strip_keeps_thinking_and_backlog() {
        let clean = strip_memory_updates(REPLY);
        assert!(!clean.contains("memory_update"));
        assert!(clean.starts_with("<thinking>"));
        assert!(clean.contains("<question_backlog>"));
        assert!(clean.ends_with("who would pay for it?"));
    }

    #[test]
    fn strip_removes_every_block() {
        let text = "<memory_update>{}</memory_update>hi<memory_update>\n{\"a\":1}\n</memory_update>";
        assert_eq!(strip_memory_updates(text), "hi");
    }

    #[test]
    fn process_applies_both_tags() {
        let mut session = Session::new("p1");
        let outcome = process_response(&mut session, REPLY, 99);

        assert!(outcome.memory_updated);
        assert!(outcome.backlog_updated);
        assert!(outcome.errors.is_empty());
        assert_eq!(
            session.memory.project.description.as_deref(),
            Some("Scheduling tool for bakeries")
        );
        assert_eq!(session.questions.len(), 2);
        assert_eq!(session.questions[0].id, "q-dynamic-99-0");
        assert_eq!(session.questions[0].status, QuestionStatus::InProgress);
    }

    #[test]
    fn invalid_memory_json_is_a_no_op() {
        let mut session = Session::new("p1");
        let before = session.memory.clone();
        let outcome = process_response(
            &mut session,
            "<memory_update>{\"project.name\": </memory_update>Hello",
            1,
        );

        assert!(!outcome.memory_updated);
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(
            outcome.errors[0],
            CoachError::MalformedTag { tag: "memory_update", .. }
        ));
        assert_eq!(session.memory, before);
        assert_eq!(outcome.clean_response, "Hello");
    }

    #[test]
    fn unknown_phase_keeps_the_rest_of_the_update() {
        let mut session = Session::new("p1");
        let outcome = process_response(
            &mut session,
            r#"<memory_update>{"project.description": "Bakery scheduling app", "user.skills": ["sales"], "project.phase": "MVP"}</memory_update>Noted."#,
            1,
        );

        assert!(outcome.memory_updated);
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(
            &outcome.errors[0],
            CoachError::MalformedTag { tag: "memory_update", reason } if reason.contains("MVP")
        ));
        assert_eq!(
            session.memory.project.description.as_deref(),
            Some("Bakery scheduling app")
        );
        assert_eq!(session.memory.user.skills, vec!["sales"]);
        assert_eq!(session.memory.project.phase, None);
    }

    #[test]
    fn malformed_backlog_keeps_questions() {
        let mut session = Session::new("p1");
        let before = session.questions.clone();
        let outcome = process_response(
            &mut session,
            "<question_backlog>[\"a\", 3]</question_backlog>",
            1,
        );
        assert!(!outcome.backlog_updated);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(session.questions, before);
    }

    #[test]
    fn unknown_memory_path_is_reported() {
        let parsed = parse_memory_update("<memory_update>{\"mood\": \"ok\"}</memory_update>");
        assert!(matches!(parsed, Some(Err(CoachError::UnknownMemoryPath(_)))));
        assert!(parse_memory_update("plain text").is_none());
    }
}
