use std::path::Path;

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use exectrace_common::flags::{Flag, Flags};
use serde::{de::Visitor, Deserialize, Deserializer, Serialize, Serializer};

use crate::correlate::Correlated;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtcDateTime(DateTime<Utc>);

impl From<DateTime<Utc>> for UtcDateTime {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

impl From<DateTime<FixedOffset>> for UtcDateTime {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self(value.naive_utc().and_utc())
    }
}

impl UtcDateTime {
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

#[inline(always)]
fn serialize_utc_ts<S>(ts: &UtcDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&ts.0.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

struct UtcDateTimeVisitor;

impl<'de> Visitor<'de> for UtcDateTimeVisitor {
    type Value = UtcDateTime;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("expecting a rfc3339 formatted timestamp")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        DateTime::parse_from_rfc3339(v)
            .map_err(|e| E::custom(e.to_string()))
            .map(UtcDateTime::from)
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D>(deserializer: D) -> Result<UtcDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(UtcDateTimeVisitor)
    }
}

/// Flags of the basic record, raw and decoded
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagsSection {
    pub value: u32,
    pub fail_arg: bool,
    pub fail_env: bool,
    pub fail_path: bool,
    pub incomplete_args: bool,
    pub incomplete_envs: bool,
}

impl From<Flags> for FlagsSection {
    fn from(value: Flags) -> Self {
        Self {
            value: value.bits(),
            fail_arg: value.contains(Flag::FailArg),
            fail_env: value.contains(Flag::FailEnv),
            fail_path: value.contains(Flag::FailPath),
            incomplete_args: value.contains(Flag::IncompleteArgs),
            incomplete_envs: value.contains(Flag::IncompleteEnvs),
        }
    }
}

impl FlagsSection {
    #[inline]
    pub fn flags(&self) -> Flags {
        Flags::from_bits(self.value)
    }
}

/// Execution event rebuilt out of all the records sharing a
/// correlation id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecEvent {
    pub id: String,
    #[serde(serialize_with = "serialize_utc_ts")]
    pub utc_time: UtcDateTime,
    pub host_uuid: Option<uuid::Uuid>,
    pub process_name: String,
    pub executed_path: String,
    pub resolved_path: String,
    pub arguments: Vec<String>,
    pub environment: Vec<String>,
    pub working_directory: String,
    pub flags: FlagsSection,
    pub complete: bool,
}

/// Working directory out of path segments ordered innermost first
pub fn working_directory<S: AsRef<str>>(segments: &[S]) -> String {
    let inner = segments
        .iter()
        .rev()
        .map(|s| s.as_ref())
        .collect::<Vec<&str>>()
        .join("/");
    format!("/{inner}")
}

/// Makes a relative executable path absolute using the working
/// directory of the caller
pub fn resolve_path(executed: &str, cwd: &str) -> String {
    if executed.is_empty() || executed.starts_with('/') {
        return executed.into();
    }
    Path::new(cwd).join(executed).to_string_lossy().into_owned()
}

impl ExecEvent {
    pub fn from_correlated(c: Correlated, host_uuid: Option<uuid::Uuid>) -> Self {
        let flags = c.basic.flags;
        let process_name = c.basic.comm.to_string();
        let executed_path = c.basic.filename.to_string();
        let working_directory = working_directory(&c.segments);
        let resolved_path = resolve_path(&executed_path, &working_directory);

        // a missing path segment cannot be told apart from a process
        // running at the root, only a path failure tells us
        let complete = !process_name.is_empty()
            && !executed_path.is_empty()
            && !c.arguments.is_empty()
            && flags.failure().is_none();

        Self {
            id: c.basic.id.to_string(),
            utc_time: UtcDateTime::now(),
            host_uuid,
            process_name,
            executed_path,
            resolved_path,
            arguments: c.arguments,
            environment: c.environment,
            working_directory,
            flags: flags.into(),
            complete,
        }
    }

    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.flags.incomplete_args || self.flags.incomplete_envs
    }

    /// Command line as a single string
    pub fn command_line(&self) -> String {
        self.arguments.join(" ")
    }
}
