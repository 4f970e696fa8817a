//! Persistence for projects, conversations, challenges and per-project memory.
//!
//! [`Store`] is either an in-process store (tests, `--in-memory`) or a
//! Postgres pool. Tables are expected to exist already.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use chrono::{DateTime, Utc};
use coach_core::session::Session;
use coach_core::types::DocumentType;
use coach_core::workflow::ConversationState;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Topic {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub project_id: Uuid,
    pub topic_id: Option<Uuid>,
    pub name: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Challenge {
    pub id: Uuid,
    pub project_id: Uuid,
    pub document_type: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
}

/// Challenges stay open for a week.
pub const CHALLENGE_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct NewConversation {
    pub project_id: Uuid,
    pub topic_id: Option<Uuid>,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NewChallenge {
    pub project_id: Uuid,
    pub document_type: DocumentType,
    pub title: String,
    pub content: String,
}

/// Which conversation a history request is about. `id` wins over
/// `project_id`; `session_id` narrows either.
#[derive(Debug, Clone, Default)]
pub struct ConversationLookup {
    pub id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub session_id: Option<String>,
}

impl ConversationLookup {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.project_id.is_none() && self.session_id.is_none()
    }

    fn matches(&self, c: &Conversation) -> bool {
        if let Some(id) = self.id {
            if c.id != id {
                return false;
            }
        } else if let Some(project_id) = self.project_id {
            if c.project_id != project_id {
                return false;
            }
        }
        match &self.session_id {
            Some(session_id) => &c.session_id == session_id,
            None => true,
        }
    }
}

/// `conv_<ms>_<9 random base36 chars>`.
pub fn new_session_id() -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("conv_{}_{}", Utc::now().timestamp_millis(), suffix)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Postgres(PgStore),
}

macro_rules! dispatch {
    ($self:ident, $method:ident ( $($arg:expr),* )) => {
        match $self {
            Store::Memory(s) => s.$method($($arg),*).await,
            Store::Postgres(s) => s.$method($($arg),*).await,
        }
    };
}

impl Store {
    pub fn in_memory() -> Self {
        Store::Memory(MemoryStore::default())
    }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        Ok(Store::Postgres(PgStore::connect(database_url).await?))
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Postgres(_) => "postgres",
        }
    }

    // Projects

    pub async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        dispatch!(self, list_projects())
    }

    pub async fn get_project(&self, id: Uuid) -> StoreResult<Option<Project>> {
        dispatch!(self, get_project(id))
    }

    pub async fn create_project(&self, name: &str) -> StoreResult<Project> {
        dispatch!(self, create_project(name))
    }

    pub async fn rename_project(&self, id: Uuid, name: &str) -> StoreResult<Project> {
        dispatch!(self, rename_project(id, name))
    }

    pub async fn delete_project(&self, id: Uuid) -> StoreResult<()> {
        dispatch!(self, delete_project(id))
    }

    // Topics

    pub async fn list_topics(&self, project_id: Option<Uuid>) -> StoreResult<Vec<Topic>> {
        dispatch!(self, list_topics(project_id))
    }

    pub async fn create_topic(&self, project_id: Uuid, name: &str) -> StoreResult<Topic> {
        dispatch!(self, create_topic(project_id, name))
    }

    pub async fn rename_topic(&self, id: Uuid, name: &str) -> StoreResult<Topic> {
        dispatch!(self, rename_topic(id, name))
    }

    pub async fn delete_topic(&self, id: Uuid) -> StoreResult<()> {
        dispatch!(self, delete_topic(id))
    }

    // Conversations and messages

    pub async fn list_conversations(&self, project_id: Uuid) -> StoreResult<Vec<Conversation>> {
        dispatch!(self, list_conversations(project_id))
    }

    pub async fn get_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        dispatch!(self, get_conversation(id))
    }

    pub async fn find_conversation(
        &self,
        lookup: &ConversationLookup,
    ) -> StoreResult<Option<Conversation>> {
        dispatch!(self, find_conversation(lookup))
    }

    pub async fn create_conversation(&self, new: NewConversation) -> StoreResult<Conversation> {
        dispatch!(self, create_conversation(new))
    }

    pub async fn rename_conversation(&self, id: Uuid, name: &str) -> StoreResult<Conversation> {
        dispatch!(self, rename_conversation(id, name))
    }

    pub async fn delete_conversation(&self, id: Uuid) -> StoreResult<()> {
        dispatch!(self, delete_conversation(id))
    }

    pub async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        dispatch!(self, list_messages(conversation_id))
    }

    /// Append a message and bump the conversation's `updated_at`.
    pub async fn add_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> StoreResult<Message> {
        dispatch!(self, add_message(conversation_id, role, content))
    }

    // Challenges

    pub async fn list_challenges(&self, project_id: Uuid) -> StoreResult<Vec<Challenge>> {
        dispatch!(self, list_challenges(project_id))
    }

    pub async fn create_challenge(&self, new: NewChallenge) -> StoreResult<Challenge> {
        dispatch!(self, create_challenge(new))
    }

    pub async fn validate_challenge(&self, id: Uuid) -> StoreResult<Challenge> {
        dispatch!(self, validate_challenge(id))
    }

    // Memory and workflow state

    pub async fn load_session(&self, project_id: &str) -> StoreResult<Option<Session>> {
        dispatch!(self, load_session(project_id))
    }

    pub async fn save_session(&self, session: &Session) -> StoreResult<()> {
        dispatch!(self, save_session(session))
    }

    pub async fn load_state(&self, conversation_id: Uuid) -> StoreResult<Option<ConversationState>> {
        dispatch!(self, load_state(conversation_id))
    }

    pub async fn save_state(
        &self,
        conversation_id: Uuid,
        state: &ConversationState,
    ) -> StoreResult<()> {
        dispatch!(self, save_state(conversation_id, state))
    }
}
