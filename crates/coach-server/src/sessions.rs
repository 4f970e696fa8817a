use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use coach_core::backlog;
use coach_core::session::Session;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::store::{Store, StoreResult};

type LockMap = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Per-project sessions on top of the store.
///
/// Updates for one project are serialized through [`Sessions::lock`] so a
/// read-modify-write of memory never interleaves with another.
#[derive(Clone)]
pub struct Sessions {
    store: Store,
    locks: LockMap,
}

/// Held while a project's session is being modified. Dropping the last guard
/// for a project removes its entry from the lock map.
pub struct ProjectGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockMap,
    project_id: String,
}

impl Drop for ProjectGuard {
    fn drop(&mut self) {
        // Release the mutex first so its Arc no longer counts as a holder.
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(&self.project_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.project_id);
        }
    }
}

impl Sessions {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Exclusive access to one project's session until the guard drops.
    pub async fn lock(&self, project_id: &str) -> ProjectGuard {
        // Waiters clone the Arc under the map lock, which keeps the entry alive
        // until they are done with it.
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(project_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        ProjectGuard {
            guard: Some(lock.lock_owned().await),
            locks: self.locks.clone(),
            project_id: project_id.to_string(),
        }
    }

    /// Projects that currently have a holder or a waiter.
    pub fn active_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Load the session, creating and persisting a fresh one on first use.
    /// Creation happens under the project lock.
    pub async fn load_or_create(&self, project_id: &str) -> StoreResult<Session> {
        if let Some(session) = self.store.load_session(project_id).await? {
            return Ok(session);
        }
        let guard = self.lock(project_id).await;
        self.load_or_create_locked(&guard, project_id).await
    }

    /// [`Sessions::load_or_create`] for callers already holding the lock.
    pub async fn load_or_create_locked(
        &self,
        _guard: &ProjectGuard,
        project_id: &str,
    ) -> StoreResult<Session> {
        if let Some(session) = self.store.load_session(project_id).await? {
            return Ok(session);
        }
        debug!(project_id, "creating session");
        let session = Session::new(project_id);
        self.store.save_session(&session).await?;
        Ok(session)
    }

    pub async fn save(&self, session: &Session) -> StoreResult<()> {
        self.store.save_session(session).await
    }

    /// Mark a backlog question answered or skipped and persist.
    pub async fn complete_question(
        &self,
        project_id: &str,
        question_id: &str,
        answer: Option<String>,
    ) -> anyhow::Result<Session> {
        let guard = self.lock(project_id).await;
        let mut session = self.load_or_create_locked(&guard, project_id).await?;
        backlog::complete(&mut session.questions, question_id, answer)?;
        session.touch();
        self.save(&session).await?;
        Ok(session)
    }
}
