use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use coach_core::session::Session;
use coach_core::workflow::ConversationState;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    new_session_id, Challenge, Conversation, ConversationLookup, Message, MessageRole,
    NewChallenge, NewConversation, Project, StoreError, StoreResult, Topic, CHALLENGE_TTL_DAYS,
};

#[derive(Default)]
struct Tables {
    projects: Vec<Project>,
    topics: Vec<Topic>,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    challenges: Vec<Challenge>,
    sessions: HashMap<String, Session>,
    states: HashMap<Uuid, ConversationState>,
}

/// Process-local store. Everything is lost on restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub(super) async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        let t = self.tables.read().await;
        let mut out = t.projects.clone();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    pub(super) async fn get_project(&self, id: Uuid) -> StoreResult<Option<Project>> {
        let t = self.tables.read().await;
        Ok(t.projects.iter().find(|p| p.id == id).cloned())
    }

    pub(super) async fn create_project(&self, name: &str) -> StoreResult<Project> {
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.projects.push(project.clone());
        Ok(project)
    }

    pub(super) async fn rename_project(&self, id: Uuid, name: &str) -> StoreResult<Project> {
        let mut t = self.tables.write().await;
        let project = t
            .projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::not_found("project", id))?;
        project.name = name.to_string();
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    pub(super) async fn delete_project(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let before = t.projects.len();
        t.projects.retain(|p| p.id != id);
        if t.projects.len() == before {
            return Err(StoreError::not_found("project", id));
        }
        let conv_ids: Vec<Uuid> = t
            .conversations
            .iter()
            .filter(|c| c.project_id == id)
            .map(|c| c.id)
            .collect();
        t.messages.retain(|m| !conv_ids.contains(&m.conversation_id));
        t.conversations.retain(|c| c.project_id != id);
        t.topics.retain(|topic| topic.project_id != id);
        t.challenges.retain(|c| c.project_id != id);
        for conv_id in conv_ids {
            t.states.remove(&conv_id);
        }
        t.sessions.remove(&id.to_string());
        Ok(())
    }

    pub(super) async fn list_topics(&self, project_id: Option<Uuid>) -> StoreResult<Vec<Topic>> {
        let t = self.tables.read().await;
        let mut out: Vec<Topic> = t
            .topics
            .iter()
            .filter(|topic| project_id.map_or(true, |p| topic.project_id == p))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    pub(super) async fn create_topic(&self, project_id: Uuid, name: &str) -> StoreResult<Topic> {
        let mut t = self.tables.write().await;
        if !t.projects.iter().any(|p| p.id == project_id) {
            return Err(StoreError::not_found("project", project_id));
        }
        let now = Utc::now();
        let topic = Topic {
            id: Uuid::new_v4(),
            project_id,
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        t.topics.push(topic.clone());
        Ok(topic)
    }

    pub(super) async fn rename_topic(&self, id: Uuid, name: &str) -> StoreResult<Topic> {
        let mut t = self.tables.write().await;
        let topic = t
            .topics
            .iter_mut()
            .find(|topic| topic.id == id)
            .ok_or_else(|| StoreError::not_found("topic", id))?;
        topic.name = name.to_string();
        topic.updated_at = Utc::now();
        Ok(topic.clone())
    }

    pub(super) async fn delete_topic(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let before = t.topics.len();
        t.topics.retain(|topic| topic.id != id);
        if t.topics.len() == before {
            return Err(StoreError::not_found("topic", id));
        }
        for conv in t.conversations.iter_mut().filter(|c| c.topic_id == Some(id)) {
            conv.topic_id = None;
        }
        Ok(())
    }

    pub(super) async fn list_conversations(
        &self,
        project_id: Uuid,
    ) -> StoreResult<Vec<Conversation>> {
        let t = self.tables.read().await;
        let mut out: Vec<Conversation> = t
            .conversations
            .iter()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(out)
    }

    pub(super) async fn get_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        let t = self.tables.read().await;
        Ok(t.conversations.iter().find(|c| c.id == id).cloned())
    }

    pub(super) async fn find_conversation(
        &self,
        lookup: &ConversationLookup,
    ) -> StoreResult<Option<Conversation>> {
        if lookup.is_empty() {
            return Ok(None);
        }
        let t = self.tables.read().await;
        Ok(t.conversations
            .iter()
            .filter(|c| lookup.matches(c))
            .max_by_key(|c| c.updated_at)
            .cloned())
    }

    pub(super) async fn create_conversation(
        &self,
        new: NewConversation,
    ) -> StoreResult<Conversation> {
        let mut t = self.tables.write().await;
        if !t.projects.iter().any(|p| p.id == new.project_id) {
            return Err(StoreError::not_found("project", new.project_id));
        }
        let now = Utc::now();
        let conv = Conversation {
            id: Uuid::new_v4(),
            project_id: new.project_id,
            topic_id: new.topic_id,
            name: new.name,
            session_id: new_session_id(),
            created_at: now,
            updated_at: now,
        };
        t.conversations.push(conv.clone());
        Ok(conv)
    }

    pub(super) async fn rename_conversation(
        &self,
        id: Uuid,
        name: &str,
    ) -> StoreResult<Conversation> {
        let mut t = self.tables.write().await;
        let conv = t
            .conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::not_found("conversation", id))?;
        conv.name = name.to_string();
        conv.updated_at = Utc::now();
        Ok(conv.clone())
    }

    pub(super) async fn delete_conversation(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let before = t.conversations.len();
        t.conversations.retain(|c| c.id != id);
        if t.conversations.len() == before {
            return Err(StoreError::not_found("conversation", id));
        }
        t.messages.retain(|m| m.conversation_id != id);
        t.states.remove(&id);
        Ok(())
    }

    pub(super) async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        let t = self.tables.read().await;
        // Insertion order is chronological; a stable sort keeps ties in order.
        let mut out: Vec<Message> = t
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    pub(super) async fn add_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> StoreResult<Message> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        let conv = t
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(|| StoreError::not_found("conversation", conversation_id))?;
        conv.updated_at = now;
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            role: role.as_str().to_string(),
            content: content.to_string(),
            created_at: now,
        };
        t.messages.push(message.clone());
        Ok(message)
    }

    pub(super) async fn list_challenges(&self, project_id: Uuid) -> StoreResult<Vec<Challenge>> {
        let t = self.tables.read().await;
        let mut out: Vec<Challenge> = t
            .challenges
            .iter()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    pub(super) async fn create_challenge(&self, new: NewChallenge) -> StoreResult<Challenge> {
        let mut t = self.tables.write().await;
        if !t.projects.iter().any(|p| p.id == new.project_id) {
            return Err(StoreError::not_found("project", new.project_id));
        }
        let now = Utc::now();
        let challenge = Challenge {
            id: Uuid::new_v4(),
            project_id: new.project_id,
            document_type: new.document_type.as_str().to_string(),
            title: new.title,
            content: new.content,
            created_at: now,
            expires_at: now + Duration::days(CHALLENGE_TTL_DAYS),
            validated_at: None,
        };
        t.challenges.push(challenge.clone());
        Ok(challenge)
    }

    pub(super) async fn validate_challenge(&self, id: Uuid) -> StoreResult<Challenge> {
        let mut t = self.tables.write().await;
        let challenge = t
            .challenges
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::not_found("challenge", id))?;
        challenge.validated_at = Some(Utc::now());
        Ok(challenge.clone())
    }

    pub(super) async fn load_session(&self, project_id: &str) -> StoreResult<Option<Session>> {
        Ok(self.tables.read().await.sessions.get(project_id).cloned())
    }

    pub(super) async fn save_session(&self, session: &Session) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .sessions
            .insert(session.project_id.clone(), session.clone());
        Ok(())
    }

    pub(super) async fn load_state(
        &self,
        conversation_id: Uuid,
    ) -> StoreResult<Option<ConversationState>> {
        Ok(self.tables.read().await.states.get(&conversation_id).cloned())
    }

    pub(super) async fn save_state(
        &self,
        conversation_id: Uuid,
        state: &ConversationState,
    ) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .states
            .insert(conversation_id, state.clone());
        Ok(())
    }
}
