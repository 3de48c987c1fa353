// TBX - Traceback Explorer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Session registry for reconstructed tracebacks being viewed
//!
//! Each fetched traceback becomes a session that the web viewer renders by id.
//! All operations run inside one critical section and never perform I/O.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::reconstruct::{Frame, FrameId, Traceback, TracebackView};

/// Identifier of a viewing session
pub type SessionId = u64;

/// Errors of the session registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No session with the given id exists
    #[error("no session with id {0}")]
    NotFound(SessionId),
}

/// A registered traceback
#[derive(Debug, Clone)]
pub struct Session {
    /// Id under which the session is registered
    pub id: SessionId,
    /// Id of the dump the traceback was loaded from
    pub tb_id: String,
    /// Registration time
    pub created_at: DateTime<Local>,
    /// Reconstructed traceback
    pub traceback: Arc<Traceback>,
}

/// Listing entry of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Session id
    pub id: SessionId,
    /// Dump id
    pub tb_id: String,
    /// Registration time
    pub created_at: DateTime<Local>,
    /// Summary line of the exception
    pub exception: String,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            tb_id: session.tb_id.clone(),
            created_at: session.created_at,
            exception: session.traceback.exception_line(),
        }
    }
}

/// Storage backing a [`SessionRegistry`]
pub trait SessionStore: Send {
    /// Store `session` under its id
    fn insert(&mut self, session: Session);
    /// Session with the given id
    fn get(&self, id: SessionId) -> Option<&Session>;
    /// All sessions, in ascending id order
    fn sessions(&self) -> Box<dyn Iterator<Item = &Session> + '_>;
    /// Remove and return every session
    fn drain(&mut self) -> Vec<Session>;
}

/// Sessions kept in memory, ordered by id
#[derive(Debug, Default)]
pub struct InMemorySessions {
    sessions: BTreeMap<SessionId, Session>,
}

impl SessionStore for InMemorySessions {
    fn insert(&mut self, session: Session) {
        self.sessions.insert(session.id, session);
    }

    fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    fn sessions(&self) -> Box<dyn Iterator<Item = &Session> + '_> {
        Box::new(self.sessions.values())
    }

    fn drain(&mut self) -> Vec<Session> {
        std::mem::take(&mut self.sessions).into_values().collect()
    }
}

#[derive(Debug)]
struct Inner<S> {
    store: S,
    next_id: SessionId,
}

/// Registry of viewing sessions
///
/// Created once when the server starts and shared with every handler. Session
/// ids grow monotonically and are never reused, even after [`clear`].
///
/// [`clear`]: SessionRegistry::clear
#[derive(Debug)]
pub struct SessionRegistry<S = InMemorySessions> {
    inner: Mutex<Inner<S>>,
}

impl SessionRegistry {
    /// Creates an empty in-memory registry
    pub fn new() -> Self {
        Self::with_store(InMemorySessions::default())
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SessionStore> SessionRegistry<S> {
    /// Creates a registry backed by `store`
    pub fn with_store(store: S) -> Self {
        Self { inner: Mutex::new(Inner { store, next_id: 1 }) }
    }

    /// Registers a traceback loaded from dump `tb_id`
    ///
    /// # Returns
    /// The id of the new session
    pub fn register(&self, tb_id: impl Into<String>, traceback: Arc<Traceback>) -> SessionId {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;

        let tb_id = tb_id.into();
        info!("Registered session {id} for traceback {tb_id}");
        inner.store.insert(Session { id, tb_id, created_at: Local::now(), traceback });
        id
    }

    /// Looks up the traceback of a session
    pub fn lookup(&self, id: SessionId) -> Result<Arc<Traceback>, RegistryError> {
        self.inner
            .lock()
            .store
            .get(id)
            .map(|session| Arc::clone(&session.traceback))
            .ok_or(RegistryError::NotFound(id))
    }

    /// Most recently registered session
    pub fn latest(&self) -> Option<Session> {
        self.inner.lock().store.sessions().max_by_key(|session| session.id).cloned()
    }

    /// Summaries of all sessions, most recent first
    pub fn list(&self) -> Vec<SessionSummary> {
        let inner = self.inner.lock();
        let mut summaries: Vec<SessionSummary> =
            inner.store.sessions().map(SessionSummary::from).collect();
        summaries.sort_by(|a, b| b.id.cmp(&a.id));
        summaries
    }

    /// Finds a frame of any session by its id
    pub fn find_frame(&self, frame_id: FrameId) -> Option<Arc<Frame>> {
        let inner = self.inner.lock();
        let frame =
            inner.store.sessions().find_map(|session| session.traceback.frame(frame_id).cloned());
        frame
    }

    /// Number of sessions
    pub fn len(&self) -> usize {
        self.inner.lock().store.sessions().count()
    }

    /// Whether no session is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every session after releasing the values its frames hold
    ///
    /// Handlers still holding one of the tracebacks see empty variable maps
    /// afterwards.
    ///
    /// # Returns
    /// The number of sessions removed
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let sessions = inner.store.drain();
        for session in &sessions {
            debug!("Releasing session {}", session.id);
            session.traceback.release();
        }
        info!("Cleared {} sessions", sessions.len());
        sessions.len()
    }
}
