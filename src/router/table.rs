//! Command table
//!
//! Static mapping of command names to roles.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::CacheConfig;

/// What the proxy does with a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandRole {
    Write,
    Read,
    Delete,
    Passthrough,
}

/// How one command name is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub role: CommandRole,

    /// Whether the first argument is a key descriptor to hash
    pub hash_key: bool,
}

/// Command name to route, built once per proxy
///
/// Role maps are checked by [`CacheConfig::validate`] before a table is
/// built from them.
#[derive(Debug, Clone)]
pub struct CommandTable {
    routes: HashMap<String, Route>,
}

impl CommandTable {
    pub fn from_config(config: &CacheConfig) -> Self {
        let mut routes = HashMap::new();

        for (name, role) in &config.command_roles {
            let name = name.to_ascii_lowercase();
            let hash_key = match role {
                CommandRole::Passthrough => config.hash_commands.contains(&name),
                _ => true,
            };
            routes.insert(name, Route { role: *role, hash_key });
        }

        for name in &config.hash_commands {
            let name = name.to_ascii_lowercase();
            routes.entry(name).or_insert(Route {
                role: CommandRole::Passthrough,
                hash_key: true,
            });
        }

        Self { routes }
    }

    /// Route for a command; unknown commands pass through unhashed
    pub fn route(&self, name: &str) -> Route {
        self.routes
            .get(&name.to_ascii_lowercase())
            .copied()
            .unwrap_or(Route {
                role: CommandRole::Passthrough,
                hash_key: false,
            })
    }

    /// Command names mapped to `role`, sorted
    pub fn names_for(&self, role: CommandRole) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .routes
            .iter()
            .filter(|(_, r)| r.role == role)
            .map(|(n, _)| n.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}
