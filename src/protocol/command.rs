//! Command definitions
//!
//! Represents commands sent to the store.

use crate::error::{CacheError, Result};

/// Expiration option attached to a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Relative, in seconds
    Ex(u64),

    /// Relative, in milliseconds
    Px(u64),

    /// Absolute unix time, in seconds
    ExAt(u64),

    /// Absolute unix time, in milliseconds
    PxAt(u64),

    /// Keep whatever TTL the key already had
    KeepTtl,
}

impl Expiry {
    /// Parse trailing write options such as `["EX", "60"]`
    ///
    /// Option names are case-insensitive. At most one expiry may be given.
    pub fn parse(tokens: &[String]) -> Result<Option<Expiry>> {
        let mut expiry = None;
        let mut iter = tokens.iter();

        while let Some(token) = iter.next() {
            let upper = token.to_ascii_uppercase();
            let parsed = match upper.as_str() {
                "KEEPTTL" => Expiry::KeepTtl,
                "EX" | "PX" | "EXAT" | "PXAT" => {
                    let amount = iter
                        .next()
                        .ok_or_else(|| {
                            CacheError::InvalidArgument(format!("{} needs a value", upper))
                        })?
                        .parse::<u64>()
                        .map_err(|e| CacheError::InvalidArgument(format!("{}: {}", upper, e)))?;
                    match upper.as_str() {
                        "EX" => Expiry::Ex(amount),
                        "PX" => Expiry::Px(amount),
                        "EXAT" => Expiry::ExAt(amount),
                        _ => Expiry::PxAt(amount),
                    }
                }
                _ => {
                    return Err(CacheError::InvalidArgument(format!(
                        "unsupported write option: {}",
                        token
                    )))
                }
            };

            if expiry.replace(parsed).is_some() {
                return Err(CacheError::InvalidArgument(
                    "more than one expiry option".into(),
                ));
            }
        }

        Ok(expiry)
    }

    /// Wire arguments for this option
    pub fn to_args(&self) -> Vec<Vec<u8>> {
        let (name, amount) = match self {
            Expiry::Ex(n) => ("EX", *n),
            Expiry::Px(n) => ("PX", *n),
            Expiry::ExAt(n) => ("EXAT", *n),
            Expiry::PxAt(n) => ("PXAT", *n),
            Expiry::KeepTtl => return vec![b"KEEPTTL".to_vec()],
        };
        vec![name.as_bytes().to_vec(), amount.to_string().into_bytes()]
    }
}

/// A command for the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Get a value by key
    Get { key: String },

    /// Set a key-value pair
    Set {
        key: String,
        value: Vec<u8>,
        expiry: Option<Expiry>,
    },

    /// Delete keys, replying with how many existed
    Del { keys: Vec<String> },

    /// Ping (health check)
    Ping,

    /// Any other command, forwarded as-is
    Raw { name: String, args: Vec<Vec<u8>> },
}

impl Command {
    /// Upper-case command name as sent on the wire
    pub fn name(&self) -> String {
        match self {
            Command::Get { .. } => "GET".to_string(),
            Command::Set { .. } => "SET".to_string(),
            Command::Del { .. } => "DEL".to_string(),
            Command::Ping => "PING".to_string(),
            Command::Raw { name, .. } => name.to_ascii_uppercase(),
        }
    }

    /// Full argument vector, command name first
    pub fn to_args(&self) -> Vec<Vec<u8>> {
        let mut args = vec![self.name().into_bytes()];
        match self {
            Command::Get { key } => args.push(key.as_bytes().to_vec()),
            Command::Set { key, value, expiry } => {
                args.push(key.as_bytes().to_vec());
                args.push(value.clone());
                if let Some(expiry) = expiry {
                    args.extend(expiry.to_args());
                }
            }
            Command::Del { keys } => {
                args.extend(keys.iter().map(|k| k.as_bytes().to_vec()));
            }
            Command::Ping => {}
            Command::Raw { args: raw, .. } => args.extend(raw.iter().cloned()),
        }
        args
    }

    /// Parse an argument vector (command name first)
    ///
    /// GET, SET, DEL and PING become typed commands, everything else is
    /// kept as [`Command::Raw`].
    pub fn from_args(mut args: Vec<Vec<u8>>) -> Result<Self> {
        if args.is_empty() {
            return Err(CacheError::Protocol("empty command".into()));
        }
        let name = String::from_utf8_lossy(&args.remove(0)).to_ascii_uppercase();

        let arity = |n: usize, args: &Vec<Vec<u8>>| {
            if args.len() < n {
                Err(CacheError::InvalidArgument(format!(
                    "{} expects at least {} arguments, got {}",
                    name,
                    n,
                    args.len()
                )))
            } else {
                Ok(())
            }
        };

        match name.as_str() {
            "GET" => {
                arity(1, &args)?;
                Ok(Command::Get { key: lossy(&args[0]) })
            }
            "SET" => {
                arity(2, &args)?;
                let options: Vec<String> = args[2..].iter().map(|a| lossy(a)).collect();
                Ok(Command::Set {
                    key: lossy(&args[0]),
                    value: args[1].clone(),
                    expiry: Expiry::parse(&options)?,
                })
            }
            "DEL" => {
                arity(1, &args)?;
                Ok(Command::Del {
                    keys: args.iter().map(|a| lossy(a)).collect(),
                })
            }
            "PING" => Ok(Command::Ping),
            _ => Ok(Command::Raw {
                name: name.clone(),
                args,
            }),
        }
    }

    /// Keys this command touches
    ///
    /// For raw commands the first argument is assumed to be the key.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Command::Get { key } | Command::Set { key, .. } => vec![key.as_str()],
            Command::Del { keys } => keys.iter().map(String::as_str).collect(),
            Command::Ping => Vec::new(),
            Command::Raw { args, .. } => args
                .first()
                .and_then(|a| std::str::from_utf8(a).ok())
                .into_iter()
                .collect(),
        }
    }
}

fn lossy(arg: &[u8]) -> String {
    String::from_utf8_lossy(arg).into_owned()
}
