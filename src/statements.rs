// Statement text lookup by sql id (the "cursor" cache consulted when ranking top SQL)

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Text and leading command keyword of one statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    pub sql_text: String,
    pub command: Option<String>,
}

impl Statement {
    pub fn from_text(sql_text: impl Into<String>) -> Self {
        let sql_text = sql_text.into();
        let command = command_of(&sql_text);
        Self { sql_text, command }
    }
}

pub trait StatementCache: Send + Sync {
    fn lookup(&self, sql_id: &str) -> Option<Statement>;
}

/// Cache that never resolves anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStatements;

impl StatementCache for NoStatements {
    fn lookup(&self, _sql_id: &str) -> Option<Statement> {
        None
    }
}

/// Bounded in-memory cache; the oldest inserted sql id is evicted first.
pub struct InMemoryStatementCache {
    inner: RwLock<Entries>,
    capacity: usize,
}

#[derive(Default)]
struct Entries {
    by_id: HashMap<String, Statement>,
    order: VecDeque<String>,
}

impl InMemoryStatementCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Entries::default()),
            capacity: capacity.max(1),
        }
    }

    /// Inserts or replaces the statement for `sql_id`.
    pub fn insert(&self, sql_id: impl Into<String>, statement: Statement) {
        let sql_id = sql_id.into();
        let mut entries = self.write();
        if entries.by_id.insert(sql_id.clone(), statement).is_none() {
            entries.order.push_back(sql_id);
        }
        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.by_id.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        match self.inner.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        match self.inner.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl StatementCache for InMemoryStatementCache {
    fn lookup(&self, sql_id: &str) -> Option<Statement> {
        self.read().by_id.get(sql_id).cloned()
    }
}

/// Upper-cased leading keyword of a statement (e.g. `SELECT`); `None` for blank text.
pub fn command_of(sql_text: &str) -> Option<String> {
    let word: String = sql_text
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if word.is_empty() {
        None
    } else {
        Some(word.to_ascii_uppercase())
    }
}
