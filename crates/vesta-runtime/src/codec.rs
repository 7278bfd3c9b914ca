//! Metadata codec between [`ExecutorConfig`] and the VM's key/value blob.
//!
//! The default [`GuestInfoCodec`] flattens the configuration into dotted keys
//! under a fixed prefix:
//!
//! ```text
//! guestinfo.vesta.id                         = <container id>
//! guestinfo.vesta.name                       = <name>
//! guestinfo.vesta.sessions.<sid>.cmd.path    = /bin/sh
//! guestinfo.vesta.sessions.<sid>.cmd.args    = ["sh","-c","..."]
//! guestinfo.vesta.sessions.<sid>.stop_signal = USR1
//! guestinfo.vesta.sessions.<sid>.started     = true
//! ```
//!
//! List values are JSON arrays. Keys outside the prefix are ignored.

use thiserror::Error;
use vesta_common::constants::DEFAULT_METADATA_PREFIX;
use vesta_common::types::ContainerId;

use crate::executor::{ExecutorConfig, Session};
use crate::infra::OptionValue;

const TOP_FIELDS: &[&str] = &["id", "name"];
const SESSION_FIELDS: &[&str] = &[
    "cmd.path",
    "cmd.args",
    "env",
    "working_dir",
    "stop_signal",
    "started",
    "exit_status",
];

/// Error produced while decoding metadata or resolving a key path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A value could not be parsed into its typed field.
    #[error("malformed metadata value for {key}: {message}")]
    Malformed {
        /// Offending metadata key.
        key: String,
        /// Parse failure description.
        message: String,
    },

    /// A key path does not name a field of the executor configuration.
    #[error("unknown metadata path {path}")]
    UnknownPath {
        /// Path as given by the caller.
        path: String,
    },
}

/// Translates the executor configuration to and from VM metadata.
pub trait MetadataCodec: Send + Sync {
    /// Decodes an executor configuration from metadata entries.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Malformed`] if a known key holds a value that
    /// cannot be parsed.
    fn decode(&self, entries: &[OptionValue]) -> Result<ExecutorConfig, CodecError>;

    /// Encodes an executor configuration as metadata entries.
    fn encode(&self, config: &ExecutorConfig) -> Vec<OptionValue>;

    /// Computes the metadata key for a field path such as
    /// `Sessions.<id>.Started`, optionally followed by `suffix`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownPath`] if the path names no field.
    fn calculate_key(
        &self,
        config: &ExecutorConfig,
        path: &str,
        suffix: &str,
    ) -> Result<String, CodecError>;
}

/// Codec storing the configuration as flat `guestinfo` keys.
#[derive(Debug, Clone)]
pub struct GuestInfoCodec {
    prefix: String,
}

impl GuestInfoCodec {
    /// Creates a codec using the given key prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn key(&self, field: &str) -> String {
        format!("{}.{field}", self.prefix)
    }

    fn session_key(&self, sid: &str, field: &str) -> String {
        format!("{}.sessions.{sid}.{field}", self.prefix)
    }
}

impl Default for GuestInfoCodec {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_PREFIX)
    }
}

impl MetadataCodec for GuestInfoCodec {
    fn decode(&self, entries: &[OptionValue]) -> Result<ExecutorConfig, CodecError> {
        let mut config = ExecutorConfig::default();
        let prefix = format!("{}.", self.prefix);

        for entry in entries {
            let Some(rest) = entry.key.strip_prefix(&prefix) else {
                continue;
            };
            match rest {
                "id" => config.id = ContainerId::new(entry.value.clone()),
                "name" => config.name.clone_from(&entry.value),
                _ => {
                    let Some((sid, field)) = rest
                        .strip_prefix("sessions.")
                        .and_then(|s| s.split_once('.'))
                    else {
                        continue;
                    };
                    let session = config
                        .sessions
                        .entry(sid.to_string())
                        .or_insert_with(|| Session {
                            id: sid.to_string(),
                            ..Session::default()
                        });
                    decode_session_field(session, field, entry)?;
                }
            }
        }

        Ok(config)
    }

    fn encode(&self, config: &ExecutorConfig) -> Vec<OptionValue> {
        let mut entries = vec![
            OptionValue::new(self.key("id"), config.id.as_str()),
            OptionValue::new(self.key("name"), config.name.as_str()),
        ];

        for (sid, session) in &config.sessions {
            entries.push(OptionValue::new(
                self.session_key(sid, "cmd.path"),
                session.cmd.path.as_str(),
            ));
            entries.push(OptionValue::new(
                self.session_key(sid, "cmd.args"),
                json_list(&session.cmd.args),
            ));
            entries.push(OptionValue::new(
                self.session_key(sid, "env"),
                json_list(&session.env),
            ));
            let optional = [
                ("working_dir", session.working_dir.clone()),
                ("stop_signal", session.stop_signal.clone()),
                ("started", session.started.clone()),
                ("exit_status", session.exit_status.map(|s| s.to_string())),
            ];
            for (field, value) in optional.into_iter().filter_map(|(f, v)| v.map(|v| (f, v))) {
                entries.push(OptionValue::new(self.session_key(sid, field), value));
            }
        }

        entries
    }

    fn calculate_key(
        &self,
        config: &ExecutorConfig,
        path: &str,
        suffix: &str,
    ) -> Result<String, CodecError> {
        let unknown = || CodecError::UnknownPath {
            path: path.to_string(),
        };
        let segments: Vec<&str> = path.split('.').collect();

        let mut key = match segments.as_slice() {
            [field] => {
                let field = canonical_field(TOP_FIELDS, &[*field]).ok_or_else(unknown)?;
                self.key(field)
            }
            [sessions, sid, fields @ ..] if normalize(sessions) == "sessions" && !sid.is_empty() => {
                if fields.is_empty() {
                    format!("{}.sessions.{sid}", self.prefix)
                } else {
                    let field = canonical_field(SESSION_FIELDS, fields).ok_or_else(unknown)?;
                    self.session_key(sid, field)
                }
            }
            _ => return Err(unknown()),
        };

        if !suffix.is_empty() {
            key.push('.');
            key.push_str(suffix);
        }
        tracing::trace!(id = %config.id, path, key = %key, "calculated metadata key");
        Ok(key)
    }
}

fn decode_session_field(
    session: &mut Session,
    field: &str,
    entry: &OptionValue,
) -> Result<(), CodecError> {
    let value = &entry.value;
    match field {
        "cmd.path" => session.cmd.path.clone_from(value),
        "cmd.args" => session.cmd.args = parse_list(entry)?,
        "env" => session.env = parse_list(entry)?,
        "working_dir" => session.working_dir = non_empty(value),
        "stop_signal" => session.stop_signal = non_empty(value),
        "started" => session.started = non_empty(value),
        "exit_status" if value.is_empty() => session.exit_status = None,
        "exit_status" => {
            let status = value.parse::<i32>().map_err(|e| CodecError::Malformed {
                key: entry.key.clone(),
                message: e.to_string(),
            })?;
            session.exit_status = Some(status);
        }
        _ => {}
    }
    Ok(())
}

fn parse_list(entry: &OptionValue) -> Result<Vec<String>, CodecError> {
    if entry.value.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&entry.value).map_err(|e| CodecError::Malformed {
        key: entry.key.clone(),
        message: e.to_string(),
    })
}

fn json_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Lower-cases and drops underscores so `StopSignal` matches `stop_signal`.
fn normalize(segment: &str) -> String {
    segment
        .chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn canonical_field(table: &[&'static str], segments: &[&str]) -> Option<&'static str> {
    let wanted: Vec<String> = segments.iter().map(|s| normalize(s)).collect();
    table.iter().copied().find(|field| {
        let candidate: Vec<String> = field.split('.').map(normalize).collect();
        candidate == wanted
    })
}
