use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backlog::{default_backlog, QuestionItem};
use crate::memory::SessionMemory;

/// Memory and question backlog for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub project_id: String,
    pub memory: SessionMemory,
    pub questions: Vec<QuestionItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// A fresh session with empty memory and the default backlog.
    pub fn new(project_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            project_id: project_id.into(),
            memory: SessionMemory::default(),
            questions: default_backlog(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
