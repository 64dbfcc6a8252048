use crate::consts::{COMM_SIZE, FILENAME_SIZE, MAX_STR_SIZE, PATH_SEGMENT_SIZE};
use crate::flags::Flags;
use crate::string::String;
use exectrace_macros::StrEnum;

crate::not_bpf_target_code! {
    mod user;
    pub use user::*;
}

// ring buffer map names, a probe and userland must agree on these
pub const BASIC_MAP: &str = "EXECTRACE_BASIC";
pub const ARGUMENT_MAP: &str = "EXECTRACE_ARGS";
pub const ENVIRONMENT_MAP: &str = "EXECTRACE_ENVS";
pub const PATH_SEGMENT_MAP: &str = "EXECTRACE_PATH";

/// Identifier grouping all the records produced for one execution event.
///
/// It is obtained by mixing the task identifier with a nanosecond
/// timestamp so it is only best-effort unique: two tasks executing at
/// the same clock tick may collide.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(u64);

impl CorrelationId {
    #[inline(always)]
    pub const fn derive(task_id: u64, timestamp_ns: u64) -> Self {
        Self(task_id ^ timestamp_ns)
    }

    #[inline(always)]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline(always)]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

#[repr(u32)]
#[derive(StrEnum, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKind {
    #[str("basic")]
    Basic = 0,
    #[str("argument")]
    Argument,
    #[str("environment")]
    Environment,
    #[str("path_segment")]
    PathSegment,
}

impl RecordKind {
    pub const fn map_name(&self) -> &'static str {
        match self {
            Self::Basic => BASIC_MAP,
            Self::Argument => ARGUMENT_MAP,
            Self::Environment => ENVIRONMENT_MAP,
            Self::PathSegment => PATH_SEGMENT_MAP,
        }
    }

    pub const fn record_size(&self) -> usize {
        match self {
            Self::Basic => BasicRecord::size_of(),
            Self::Argument => ArgumentRecord::size_of(),
            Self::Environment => EnvironmentRecord::size_of(),
            Self::PathSegment => PathSegmentRecord::size_of(),
        }
    }
}

/// Header record of an execution event, always the last one
/// published for its correlation id.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicRecord {
    pub id: CorrelationId,
    pub flags: Flags,
    pub comm: String<COMM_SIZE>,
    pub filename: String<FILENAME_SIZE>,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ArgumentRecord {
    pub id: CorrelationId,
    pub text: String<MAX_STR_SIZE>,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvironmentRecord {
    pub id: CorrelationId,
    pub text: String<MAX_STR_SIZE>,
}

/// One directory name of the working directory, the innermost
/// directory comes first.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct PathSegmentRecord {
    pub id: CorrelationId,
    pub name: String<PATH_SEGMENT_SIZE>,
}

/// Records holding one entry of an argument or environment vector
pub trait TextRecord {
    fn tag(&mut self, id: CorrelationId);
    fn text_mut(&mut self) -> &mut String<MAX_STR_SIZE>;
}

macro_rules! impl_record {
    ($record:ty, $kind:expr) => {
        impl $record {
            pub const KIND: RecordKind = $kind;

            #[inline]
            pub const fn size_of() -> usize {
                core::mem::size_of::<$record>()
            }

            #[inline]
            pub fn correlation_id(&self) -> CorrelationId {
                self.id
            }

            /// Raw bytes of the record as they cross the ring buffer
            #[inline]
            pub fn encode(&self) -> &[u8] {
                // records are plain old data made of integers and byte arrays
                unsafe {
                    core::slice::from_raw_parts(
                        (self as *const Self) as *const u8,
                        core::mem::size_of::<$record>(),
                    )
                }
            }
        }
    };
}

macro_rules! impl_text_record {
    ($record:ty) => {
        impl TextRecord for $record {
            #[inline(always)]
            fn tag(&mut self, id: CorrelationId) {
                self.id = id
            }

            #[inline(always)]
            fn text_mut(&mut self) -> &mut String<MAX_STR_SIZE> {
                &mut self.text
            }
        }
    };
}

impl_record!(BasicRecord, RecordKind::Basic);
impl_record!(ArgumentRecord, RecordKind::Argument);
impl_record!(EnvironmentRecord, RecordKind::Environment);
impl_record!(PathSegmentRecord, RecordKind::PathSegment);

impl_text_record!(ArgumentRecord);
impl_text_record!(EnvironmentRecord);
