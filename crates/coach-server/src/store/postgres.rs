use chrono::{Duration, Utc};
use coach_core::backlog::QuestionItem;
use coach_core::memory::SessionMemory;
use coach_core::session::Session;
use coach_core::workflow::ConversationState;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::{
    new_session_id, Challenge, Conversation, ConversationLookup, Message, MessageRole,
    NewChallenge, NewConversation, Project, StoreError, StoreResult, Topic, CHALLENGE_TTL_DAYS,
};

#[derive(sqlx::FromRow)]
struct SessionRow {
    project_id: String,
    memory: Json<SessionMemory>,
    questions: Json<Vec<QuestionItem>>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            project_id: row.project_id,
            memory: row.memory.0,
            questions: row.questions.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Postgres-backed store. The tables are created out of band.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        info!("connected to postgres");
        Ok(Self { pool })
    }

    // Projects

    pub(super) async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        Ok(
            sqlx::query_as::<_, Project>("SELECT * FROM projects ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub(super) async fn get_project(&self, id: Uuid) -> StoreResult<Option<Project>> {
        Ok(
            sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub(super) async fn create_project(&self, name: &str) -> StoreResult<Project> {
        Ok(sqlx::query_as::<_, Project>(
            "INSERT INTO projects (id, name) VALUES ($1, $2) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&self.pool)
        .await?)
    }

    pub(super) async fn rename_project(&self, id: Uuid, name: &str) -> StoreResult<Project> {
        sqlx::query_as::<_, Project>(
            "UPDATE projects SET name = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("project", id))
    }

    pub(super) async fn delete_project(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for statement in [
            "DELETE FROM messages WHERE conversation_id IN
                (SELECT id FROM conversations WHERE project_id = $1)",
            "DELETE FROM conversation_states WHERE conversation_id IN
                (SELECT id FROM conversations WHERE project_id = $1)",
            "DELETE FROM conversations WHERE project_id = $1",
            "DELETE FROM topics WHERE project_id = $1",
            "DELETE FROM challenges WHERE project_id = $1",
        ] {
            sqlx::query(statement).bind(id).execute(&mut *tx).await?;
        }
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("project", id));
        }
        sqlx::query("DELETE FROM project_memory WHERE project_id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    // Topics

    pub(super) async fn list_topics(&self, project_id: Option<Uuid>) -> StoreResult<Vec<Topic>> {
        let topics = match project_id {
            Some(project_id) => {
                sqlx::query_as::<_, Topic>(
                    "SELECT * FROM topics WHERE project_id = $1 ORDER BY created_at DESC",
                )
                .bind(project_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Topic>("SELECT * FROM topics ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(topics)
    }

    pub(super) async fn create_topic(&self, project_id: Uuid, name: &str) -> StoreResult<Topic> {
        if self.get_project(project_id).await?.is_none() {
            return Err(StoreError::not_found("project", project_id));
        }
        Ok(sqlx::query_as::<_, Topic>(
            "INSERT INTO topics (id, project_id, name) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?)
    }

    pub(super) async fn rename_topic(&self, id: Uuid, name: &str) -> StoreResult<Topic> {
        sqlx::query_as::<_, Topic>(
            "UPDATE topics SET name = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("topic", id))
    }

    pub(super) async fn delete_topic(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE conversations SET topic_id = NULL WHERE topic_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM topics WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("topic", id));
        }
        tx.commit().await?;
        Ok(())
    }

    // Conversations and messages

    pub(super) async fn list_conversations(
        &self,
        project_id: Uuid,
    ) -> StoreResult<Vec<Conversation>> {
        Ok(sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE project_id = $1 ORDER BY updated_at DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub(super) async fn get_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        Ok(
            sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub(super) async fn find_conversation(
        &self,
        lookup: &ConversationLookup,
    ) -> StoreResult<Option<Conversation>> {
        if lookup.is_empty() {
            return Ok(None);
        }
        // NULL parameters disable their predicate; id takes precedence over project.
        Ok(sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations
             WHERE ($1::uuid IS NULL OR id = $1)
               AND ($1::uuid IS NOT NULL OR $2::uuid IS NULL OR project_id = $2)
               AND ($3::text IS NULL OR session_id = $3)
             ORDER BY updated_at DESC
             LIMIT 1",
        )
        .bind(lookup.id)
        .bind(lookup.project_id)
        .bind(lookup.session_id.as_deref())
        .fetch_optional(&self.pool)
        .await?)
    }

    pub(super) async fn create_conversation(
        &self,
        new: NewConversation,
    ) -> StoreResult<Conversation> {
        if self.get_project(new.project_id).await?.is_none() {
            return Err(StoreError::not_found("project", new.project_id));
        }
        Ok(sqlx::query_as::<_, Conversation>(
            "INSERT INTO conversations (id, project_id, topic_id, name, session_id)
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new.project_id)
        .bind(new.topic_id)
        .bind(&new.name)
        .bind(new_session_id())
        .fetch_one(&self.pool)
        .await?)
    }

    pub(super) async fn rename_conversation(
        &self,
        id: Uuid,
        name: &str,
    ) -> StoreResult<Conversation> {
        sqlx::query_as::<_, Conversation>(
            "UPDATE conversations SET name = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("conversation", id))
    }

    pub(super) async fn delete_conversation(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM messages WHERE conversation_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM conversation_states WHERE conversation_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("conversation", id));
        }
        tx.commit().await?;
        Ok(())
    }

    pub(super) async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        Ok(sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE conversation_id = $1 ORDER BY created_at ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub(super) async fn add_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> StoreResult<Message> {
        let mut tx = self.pool.begin().await?;
        let touched = sqlx::query("UPDATE conversations SET updated_at = now() WHERE id = $1")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(StoreError::not_found("conversation", conversation_id));
        }
        let message = sqlx::query_as::<_, Message>(
            "INSERT INTO messages (id, conversation_id, role, content)
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(message)
    }

    // Challenges

    pub(super) async fn list_challenges(&self, project_id: Uuid) -> StoreResult<Vec<Challenge>> {
        Ok(sqlx::query_as::<_, Challenge>(
            "SELECT * FROM challenges WHERE project_id = $1 ORDER BY created_at DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub(super) async fn create_challenge(&self, new: NewChallenge) -> StoreResult<Challenge> {
        if self.get_project(new.project_id).await?.is_none() {
            return Err(StoreError::not_found("project", new.project_id));
        }
        let expires_at = Utc::now() + Duration::days(CHALLENGE_TTL_DAYS);
        Ok(sqlx::query_as::<_, Challenge>(
            "INSERT INTO challenges (id, project_id, document_type, title, content, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new.project_id)
        .bind(new.document_type.as_str())
        .bind(&new.title)
        .bind(&new.content)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?)
    }

    pub(super) async fn validate_challenge(&self, id: Uuid) -> StoreResult<Challenge> {
        sqlx::query_as::<_, Challenge>(
            "UPDATE challenges SET validated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("challenge", id))
    }

    // Memory and workflow state

    pub(super) async fn load_session(&self, project_id: &str) -> StoreResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT project_id, memory, questions, created_at, updated_at
             FROM project_memory WHERE project_id = $1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    pub(super) async fn save_session(&self, session: &Session) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO project_memory (project_id, memory, questions, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (project_id) DO UPDATE
             SET memory = EXCLUDED.memory,
                 questions = EXCLUDED.questions,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(&session.project_id)
        .bind(Json(&session.memory))
        .bind(Json(&session.questions))
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub(super) async fn load_state(
        &self,
        conversation_id: Uuid,
    ) -> StoreResult<Option<ConversationState>> {
        let row: Option<(Json<ConversationState>,)> =
            sqlx::query_as("SELECT state FROM conversation_states WHERE conversation_id = $1")
                .bind(conversation_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(state,)| state.0))
    }

    pub(super) async fn save_state(
        &self,
        conversation_id: Uuid,
        state: &ConversationState,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO conversation_states (conversation_id, state, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (conversation_id) DO UPDATE
             SET state = EXCLUDED.state, updated_at = now()",
        )
        .bind(conversation_id)
        .bind(Json(state))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
