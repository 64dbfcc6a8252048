use core::fmt::{Display, LowerHex};
use thiserror::Error;

use super::{
    ArgumentRecord, BasicRecord, CorrelationId, EnvironmentRecord, PathSegmentRecord, RecordKind,
};

impl Display for RecordKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Display for CorrelationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl LowerHex for CorrelationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        LowerHex::fmt(&self.0, f)
    }
}

impl From<CorrelationId> for u64 {
    fn from(value: CorrelationId) -> Self {
        value.0
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecoderError {
    #[error("not enough bytes to decode {kind} record: got={got} expected={expected}")]
    NotEnoughBytes {
        kind: RecordKind,
        got: usize,
        expected: usize,
    },
}

/// A record decoded from one of the output channels. Text records are
/// more than a page big so every variant is boxed.
#[derive(Debug, Clone)]
pub enum Record {
    Basic(Box<BasicRecord>),
    Argument(Box<ArgumentRecord>),
    Environment(Box<EnvironmentRecord>),
    PathSegment(Box<PathSegmentRecord>),
}

impl From<BasicRecord> for Record {
    fn from(value: BasicRecord) -> Self {
        Self::Basic(Box::new(value))
    }
}

impl From<ArgumentRecord> for Record {
    fn from(value: ArgumentRecord) -> Self {
        Self::Argument(Box::new(value))
    }
}

impl From<EnvironmentRecord> for Record {
    fn from(value: EnvironmentRecord) -> Self {
        Self::Environment(Box::new(value))
    }
}

impl From<PathSegmentRecord> for Record {
    fn from(value: PathSegmentRecord) -> Self {
        Self::PathSegment(Box::new(value))
    }
}

impl Record {
    /// Decodes the bytes read from the channel carrying `kind` records.
    /// Trailing bytes (ring buffer alignment) are ignored.
    pub fn from_bytes(kind: RecordKind, bytes: &[u8]) -> Result<Self, DecoderError> {
        macro_rules! decode {
            ($record:ty) => {{
                if bytes.len() < <$record>::size_of() {
                    return Err(DecoderError::NotEnoughBytes {
                        kind,
                        got: bytes.len(),
                        expected: <$record>::size_of(),
                    });
                }
                // every bit pattern is a valid record, string lengths
                // are bounded at access time
                let r = unsafe { core::ptr::read_unaligned(bytes.as_ptr() as *const $record) };
                Box::new(r)
            }};
        }

        Ok(match kind {
            RecordKind::Basic => Self::Basic(decode!(BasicRecord)),
            RecordKind::Argument => Self::Argument(decode!(ArgumentRecord)),
            RecordKind::Environment => Self::Environment(decode!(EnvironmentRecord)),
            RecordKind::PathSegment => Self::PathSegment(decode!(PathSegmentRecord)),
        })
    }

    #[inline]
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Basic(_) => RecordKind::Basic,
            Self::Argument(_) => RecordKind::Argument,
            Self::Environment(_) => RecordKind::Environment,
            Self::PathSegment(_) => RecordKind::PathSegment,
        }
    }

    #[inline]
    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            Self::Basic(r) => r.id,
            Self::Argument(r) => r.id,
            Self::Environment(r) => r.id,
            Self::PathSegment(r) => r.id,
        }
    }
}
