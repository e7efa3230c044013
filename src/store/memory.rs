use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use tokio::sync::RwLock;

use crate::error::{PulseError, Result};
use crate::store::LivenessStore;

#[derive(Debug, Default)]
struct MemoryState {
    values: HashMap<String, String>,
    sets: HashMap<String, BTreeSet<String>>,
}

/// In-process store with Redis-like semantics.
///
/// A key holds either a string or a set. `set` overwrites a key of either
/// kind, adding a member to a string key fails, and a set disappears once its
/// last member is removed.
///
/// [`MemoryStore::set_unavailable`] makes every operation fail with
/// [`PulseError::StoreUnavailable`] until it is switched back.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing (or regaining) the connection to the store
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn is_unavailable(&self) -> bool {
        self.unavailable.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.is_unavailable() {
            Err(PulseError::StoreUnavailable)
        } else {
            Ok(())
        }
    }

    /// Number of keys of either kind
    pub async fn len(&self) -> usize {
        let state = self.state.read().await;
        state.values.len() + state.sets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl LivenessStore for MemoryStore {
    async fn add_to_set(&self, set_key: &str, member: &str) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.values.contains_key(set_key) {
            return Err(PulseError::Store(format!(
                "key {} holds a string, not a set",
                set_key
            )));
        }
        state
            .sets
            .entry(set_key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn remove_from_set(&self, set_key: &str, member: &str) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if let Some(members) = state.sets.get_mut(set_key) {
            members.remove(member);
            if members.is_empty() {
                state.sets.remove(set_key);
            }
        }
        Ok(())
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .sets
            .get(set_key)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        let state = self.state.read().await;
        if state.sets.contains_key(key) {
            return Err(PulseError::Store(format!(
                "key {} holds a set, not a string",
                key
            )));
        }
        Ok(state.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state.sets.remove(key);
        state.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state.values.remove(key);
        state.sets.remove(key);
        Ok(())
    }

    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.check_available()?;
        let matcher = redis_pattern_matcher(pattern)?;
        let state = self.state.read().await;
        let mut keys: Vec<String> = state
            .values
            .keys()
            .chain(state.sets.keys())
            .filter(|key| matcher.is_match(key.as_str()))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Compile a Redis `KEYS` pattern.
///
/// Redis negates a class with `[^...]` and has no brace alternation, so
/// `^` becomes globset's `!` and braces outside a class are escaped.
fn redis_pattern_matcher(pattern: &str) -> Result<GlobMatcher> {
    let mut glob = String::with_capacity(pattern.len() + 4);
    let mut chars = pattern.chars().peekable();
    let mut in_class = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                glob.push(c);
                if let Some(escaped) = chars.next() {
                    glob.push(escaped);
                }
            }
            '[' if !in_class => {
                in_class = true;
                glob.push('[');
                if chars.peek() == Some(&'^') {
                    chars.next();
                    glob.push('!');
                }
                // A leading `]` is a member, not the end of the class
                if chars.peek() == Some(&']') {
                    chars.next();
                    glob.push(']');
                }
            }
            ']' if in_class => {
                in_class = false;
                glob.push(']');
            }
            '{' | '}' if !in_class => {
                glob.push('\\');
                glob.push(c);
            }
            _ => glob.push(c),
        }
    }
    let matcher = GlobBuilder::new(&glob)
        .literal_separator(false)
        .backslash_escape(true)
        .build()?
        .compile_matcher();
    Ok(matcher)
}
