//! Conversation memory: bounded per-session turn logs.
//!
//! Each session sits behind its own mutex. The session map lock is held only
//! long enough to look up or insert a slot, so turns in unrelated sessions
//! never wait on each other.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::worker::WorkerKind;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Worker,
    System,
}

/// One recorded message. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub role: TurnRole,
    pub author: Option<WorkerKind>,
    pub content: String,
    /// Position within the session; strictly increasing and contiguous.
    pub ordinal: u64,
    pub created_at: DateTime<Utc>,
}

/// A turn before memory assigns its ordinal.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTurn {
    pub role: TurnRole,
    pub author: Option<WorkerKind>,
    pub content: String,
}

impl NewTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            author: None,
            content: content.into(),
        }
    }

    pub fn worker(kind: WorkerKind, content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Worker,
            author: Some(kind),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::System,
            author: None,
            content: content.into(),
        }
    }
}

/// Storage seam for the engine.
pub trait MemoryStore: Send + Sync {
    /// Append a turn, creating the session if needed. Returns the stored turn.
    fn append(&self, session_id: &str, turn: NewTurn) -> Turn;

    /// All retained turns, oldest first. Empty for unknown sessions.
    fn read(&self, session_id: &str) -> Vec<Turn>;

    /// Drop a session. No-op if it does not exist.
    fn clear(&self, session_id: &str);

    /// Metadata for one session, if it exists.
    fn session_info(&self, session_id: &str) -> Option<SessionInfo>;

    fn session_count(&self) -> usize;

    fn total_turn_count(&self) -> usize;
}

#[derive(Debug)]
struct Session {
    turns: VecDeque<Turn>,
    next_ordinal: u64,
    created_at: DateTime<Utc>,
    last_active_at: DateTime<Utc>,
    /// Set by `clear` after the slot is unlinked from the map; a writer that
    /// raced with the clear must retry against a fresh slot.
    closed: bool,
}

impl Session {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            turns: VecDeque::new(),
            next_ordinal: 0,
            created_at: now,
            last_active_at: now,
            closed: false,
        }
    }

    fn push(&mut self, new: NewTurn, max_turns: usize) -> Turn {
        let now = Utc::now();
        let turn = Turn {
            role: new.role,
            author: new.author,
            content: new.content,
            ordinal: self.next_ordinal,
            created_at: now,
        };
        self.next_ordinal += 1;
        self.last_active_at = now;
        self.turns.push_back(turn.clone());

        while self.turns.len() > max_turns {
            self.turns.pop_front();
        }
        turn
    }
}

/// Summary of a session, for inspection endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub turn_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

/// In-process conversation memory.
pub struct ConversationMemory {
    max_turns: usize,
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns: max_turns.max(1),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    fn existing_slot(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    fn slot(&self, session_id: &str) -> Arc<Mutex<Session>> {
        if let Some(slot) = self.existing_slot(session_id) {
            return slot;
        }
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id = %session_id, "Session created");
                Arc::new(Mutex::new(Session::new()))
            })
            .clone()
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(50)
    }
}

impl MemoryStore for ConversationMemory {
    fn append(&self, session_id: &str, turn: NewTurn) -> Turn {
        loop {
            let slot = self.slot(session_id);
            let mut session = lock(&slot);
            if session.closed {
                continue;
            }
            return session.push(turn, self.max_turns);
        }
    }

    fn read(&self, session_id: &str) -> Vec<Turn> {
        match self.existing_slot(session_id) {
            Some(slot) => lock(&slot).turns.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    fn clear(&self, session_id: &str) {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
        if let Some(slot) = removed {
            lock(&slot).closed = true;
            tracing::debug!(session_id = %session_id, "Session cleared");
        }
    }

    fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        let slot = self.existing_slot(session_id)?;
        let session = lock(&slot);
        Some(SessionInfo {
            id: session_id.to_string(),
            turn_count: session.turns.len(),
            created_at: session.created_at,
            last_active_at: session.last_active_at,
        })
    }

    fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn total_turn_count(&self) -> usize {
        let slots: Vec<_> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        slots.iter().map(|slot| lock(slot).turns.len()).sum()
    }
}

fn lock(slot: &Mutex<Session>) -> MutexGuard<'_, Session> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
