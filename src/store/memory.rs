//! In-memory store
//!
//! HashMap-based store with lazy expiry, behind a parking_lot RwLock.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;

use super::{ItemResult, Store};
use crate::error::{CacheError, Result};
use crate::protocol::{Command, Expiry, Reply};

/// A stored value and when it stops being visible
#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-process store with Redis-like command semantics
///
/// Besides GET/SET/DEL/PING it understands EXISTS, EXPIRE, PEXPIRE, TTL,
/// PTTL, PERSIST, EXPIRETIME, DBSIZE, KEYS and FLUSHDB.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, Entry>>,

    /// When set, every call fails as if the store were unreachable
    offline: AtomicBool,

    /// Keys whose commands fail individually
    poisoned: RwLock<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing (or regaining) the connection
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every command touching `key` fail with an error reply
    pub fn poison_key(&self, key: impl Into<String>) {
        self.poisoned.write().insert(key.into());
    }

    pub fn clear_poison(&self) {
        self.poisoned.write().clear();
    }

    /// Live keys matching a glob pattern (`*` and `?`)
    pub fn keys_matching(&self, pattern: &str) -> Vec<String> {
        let now = Utc::now();
        let mut keys: Vec<String> = self
            .data
            .read()
            .iter()
            .filter(|(k, e)| e.is_live(now) && glob_match(pattern.as_bytes(), k.as_bytes()))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.data.read().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes stored under a key, bypassing any decoding
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        let now = Utc::now();
        self.data
            .read()
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
    }

    /// Overwrite the raw bytes under a key, keeping its expiry
    pub fn poke(&self, key: &str, value: Vec<u8>) {
        let mut data = self.data.write();
        match data.get_mut(key) {
            Some(entry) => entry.value = value,
            None => {
                data.insert(
                    key.to_string(),
                    Entry {
                        value,
                        expires_at: None,
                    },
                );
            }
        }
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::Connectivity("memory store is offline".into()));
        }
        Ok(())
    }

    fn poisoned_key(&self, command: &Command) -> Option<String> {
        let poisoned = self.poisoned.read();
        command
            .keys()
            .into_iter()
            .find(|k| poisoned.contains(*k))
            .map(str::to_string)
    }

    fn apply(&self, command: Command) -> Reply {
        if let Some(key) = self.poisoned_key(&command) {
            return Reply::Error(format!("ERR injected failure for key {}", key));
        }

        let now = Utc::now();
        match command {
            Command::Get { key } => match self.live(&key, now) {
                Some(entry) => Reply::Bulk(entry.value),
                None => Reply::Nil,
            },
            Command::Set { key, value, expiry } => {
                let mut data = self.data.write();
                let previous = data
                    .get(&key)
                    .filter(|e| e.is_live(now))
                    .and_then(|e| e.expires_at);
                let expires_at = match expiry {
                    None => None,
                    Some(Expiry::KeepTtl) => previous,
                    Some(other) => match expiry_instant(other, now) {
                        Some(at) => Some(at),
                        None => return invalid_expire("set"),
                    },
                };
                data.insert(key, Entry { value, expires_at });
                Reply::ok()
            }
            Command::Del { keys } => {
                let mut data = self.data.write();
                let removed = keys
                    .iter()
                    .filter(|k| match data.remove(k.as_str()) {
                        Some(entry) => entry.is_live(now),
                        None => false,
                    })
                    .count();
                Reply::Integer(removed as i64)
            }
            Command::Ping => Reply::Status("PONG".into()),
            Command::Raw { name, args } => self.apply_raw(&name, &args, now),
        }
    }

    fn apply_raw(&self, name: &str, args: &[Vec<u8>], now: DateTime<Utc>) -> Reply {
        let text = |i: usize| args.get(i).map(|a| String::from_utf8_lossy(a).into_owned());
        let number = |i: usize| text(i).and_then(|t| t.parse::<i64>().ok());
        let wrong_args = || {
            Reply::Error(format!(
                "ERR wrong number of arguments for '{}' command",
                name.to_ascii_lowercase()
            ))
        };

        match name.to_ascii_uppercase().as_str() {
            "EXISTS" => {
                if args.is_empty() {
                    return wrong_args();
                }
                let count = (0..args.len())
                    .filter_map(|i| text(i))
                    .filter(|k| self.live(k, now).is_some())
                    .count();
                Reply::Integer(count as i64)
            }
            "EXPIRE" | "PEXPIRE" => {
                let (Some(key), Some(amount)) = (text(0), number(1)) else {
                    return wrong_args();
                };
                let delta = if name.eq_ignore_ascii_case("EXPIRE") {
                    TimeDelta::try_seconds(amount)
                } else {
                    TimeDelta::try_milliseconds(amount)
                };
                let Some(at) = delta.and_then(|d| now.checked_add_signed(d)) else {
                    return invalid_expire(name);
                };
                let mut data = self.data.write();
                match data.get_mut(&key).filter(|e| e.is_live(now)) {
                    Some(entry) => {
                        entry.expires_at = Some(at);
                        Reply::Integer(1)
                    }
                    None => Reply::Integer(0),
                }
            }
            "TTL" | "PTTL" => {
                let Some(key) = text(0) else {
                    return wrong_args();
                };
                let millis = name.eq_ignore_ascii_case("PTTL");
                match self.live(&key, now) {
                    None => Reply::Integer(-2),
                    Some(Entry {
                        expires_at: None, ..
                    }) => Reply::Integer(-1),
                    Some(Entry {
                        expires_at: Some(at),
                        ..
                    }) => {
                        let remaining = (at - now).num_milliseconds();
                        if millis {
                            Reply::Integer(remaining)
                        } else {
                            Reply::Integer((remaining + 500) / 1000)
                        }
                    }
                }
            }
            "PERSIST" => {
                let Some(key) = text(0) else {
                    return wrong_args();
                };
                let mut data = self.data.write();
                match data.get_mut(&key).filter(|e| e.is_live(now)) {
                    Some(entry) if entry.expires_at.is_some() => {
                        entry.expires_at = None;
                        Reply::Integer(1)
                    }
                    _ => Reply::Integer(0),
                }
            }
            "EXPIRETIME" => {
                let Some(key) = text(0) else {
                    return wrong_args();
                };
                match self.live(&key, now) {
                    None => Reply::Integer(-2),
                    Some(entry) => Reply::Integer(entry.expires_at.map_or(-1, |at| at.timestamp())),
                }
            }
            "DBSIZE" => Reply::Integer(self.len() as i64),
            "KEYS" => {
                let Some(pattern) = text(0) else {
                    return wrong_args();
                };
                Reply::Array(
                    self.keys_matching(&pattern)
                        .into_iter()
                        .map(|k| Reply::Bulk(k.into_bytes()))
                        .collect(),
                )
            }
            "FLUSHDB" | "FLUSHALL" => {
                self.data.write().clear();
                Reply::ok()
            }
            other => Reply::Error(format!("ERR unknown command '{}'", other)),
        }
    }

    fn live(&self, key: &str, now: DateTime<Utc>) -> Option<Entry> {
        self.data
            .read()
            .get(key)
            .filter(|e| e.is_live(now))
            .cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn execute(&self, command: Command) -> Result<Reply> {
        self.check_online()?;
        tracing::trace!("memory store: {}", command.name());
        Ok(self.apply(command))
    }

    async fn pipeline(&self, commands: Vec<Command>) -> Result<Vec<ItemResult>> {
        self.check_online()?;
        Ok(commands
            .into_iter()
            .map(|command| self.apply(command).into_result())
            .collect())
    }
}

fn invalid_expire(command: &str) -> Reply {
    Reply::Error(format!(
        "ERR invalid expire time in '{}' command",
        command.to_ascii_lowercase()
    ))
}

/// Absolute expiry for a write option
///
/// `None` when the amount is zero or out of range; relative expiries
/// must be positive.
fn expiry_instant(expiry: Expiry, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match expiry {
        Expiry::Ex(0) | Expiry::Px(0) => None,
        Expiry::Ex(secs) => i64::try_from(secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|d| now.checked_add_signed(d)),
        Expiry::Px(ms) => i64::try_from(ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .and_then(|d| now.checked_add_signed(d)),
        Expiry::ExAt(secs) => i64::try_from(secs)
            .ok()
            .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0)),
        Expiry::PxAt(ms) => i64::try_from(ms)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        Expiry::KeepTtl => None,
    }
}

/// Glob match supporting `*` and `?`
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            glob_match(&pattern[1..], text) || (!text.is_empty() && glob_match(pattern, &text[1..]))
        }
        (Some(b'?'), Some(_)) => glob_match(&pattern[1..], &text[1..]),
        (Some(p), Some(t)) if p == t => glob_match(&pattern[1..], &text[1..]),
        _ => false,
    }
}
