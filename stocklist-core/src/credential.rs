//! API credential resolution.
//!
//! Each candidate variable is looked up in the process environment first and
//! then in an optional key=value credential file. The file is parsed into a
//! local map; nothing is written back into the process environment.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

use crate::config::JobConfig;

/// Opaque API token. The value never appears in `Debug` or `Display` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<redacted, {} chars>)", self.0.len())
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Read-only view of environment variables.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Where a resolved credential came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Environment { var: String },
    EnvFile { var: String },
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Environment { var } => write!(f, "environment variable {var}"),
            CredentialSource::EnvFile { var } => write!(f, "{var} from credential file"),
        }
    }
}

/// A credential together with its origin.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub credential: Credential,
    pub source: CredentialSource,
}

/// Parse a key=value credential file into a map.
///
/// A missing file yields an empty map. Lines that fail to parse are skipped.
pub fn load_env_file(path: &Path) -> HashMap<String, String> {
    let mut vars = HashMap::new();

    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => {
            warn!(path = %path.display(), "credential file not found");
            return vars;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "credential file unreadable");
            return vars;
        }
    };

    info!(path = %path.display(), "reading credential file");
    for item in iter {
        match item {
            Ok((key, value)) => {
                vars.insert(key, value);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed line"),
        }
    }
    vars
}

/// Resolve the API credential.
///
/// The primary variable wins over the fallback. For each variable the process
/// environment wins over the credential file. Empty or whitespace-only values
/// count as unset. Returns `None` when nothing usable is found.
pub fn resolve(
    env: &dyn EnvSource,
    file_vars: &HashMap<String, String>,
    primary: &str,
    fallback: &str,
) -> Option<ResolvedCredential> {
    [primary, fallback]
        .into_iter()
        .filter(|var| !var.is_empty())
        .find_map(|var| lookup(env, file_vars, var))
}

fn lookup(
    env: &dyn EnvSource,
    file_vars: &HashMap<String, String>,
    var: &str,
) -> Option<ResolvedCredential> {
    let non_blank = |v: String| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };

    if let Some(token) = env.var(var).and_then(non_blank) {
        return Some(ResolvedCredential {
            credential: Credential::new(token),
            source: CredentialSource::Environment {
                var: var.to_string(),
            },
        });
    }

    file_vars
        .get(var)
        .cloned()
        .and_then(non_blank)
        .map(|token| ResolvedCredential {
            credential: Credential::new(token),
            source: CredentialSource::EnvFile {
                var: var.to_string(),
            },
        })
}

/// Resolve using the variable names and credential file named in `config`.
pub fn resolve_for(config: &JobConfig, env: &dyn EnvSource) -> Option<ResolvedCredential> {
    let file_vars = config
        .env_file
        .as_deref()
        .map(load_env_file)
        .unwrap_or_default();
    resolve(env, &file_vars, &config.token_var, &config.fallback_token_var)
}
