use dashmap::DashMap;

use crate::data_models::Category;

pub type UserId = i64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingQuery,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub state: ConversationState,
    pub category: Option<Category>,
}

/// Per-user conversation state. Users with no entry are idle with no
/// category pinned.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<UserId, Session>,
}

impl SessionStore {
    pub fn new() -> SessionStore {
        SessionStore::default()
    }

    pub fn get(&self, user: UserId) -> Session {
        self.sessions
            .get(&user)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    /// Enter (or stay in) the awaiting-query state, keeping any pinned category.
    pub fn await_query(&self, user: UserId) {
        self.sessions.entry(user).or_default().state = ConversationState::AwaitingQuery;
    }

    /// Pin a category for the next query and wait for it.
    pub fn pin_category(&self, user: UserId, category: Category) {
        let mut session = self.sessions.entry(user).or_default();
        session.category = Some(category);
        session.state = ConversationState::AwaitingQuery;
    }

    /// Back to idle with nothing pinned. Returns the session as it was.
    pub fn reset(&self, user: UserId) -> Session {
        self.sessions
            .remove(&user)
            .map(|(_, s)| s)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
