use exectrace_macros::BpfError;

use crate::channel::{reserve_retry_once, ChannelSet, RingChannel};
use crate::flags::{Flag, Flags};
use crate::path::PathWalker;
use crate::records::{
    ArgumentRecord, BasicRecord, CorrelationId, EnvironmentRecord, PathSegmentRecord,
};
use crate::snapshot::ExecSnapshot;
use crate::streams::{ArgumentStream, EnvironmentStream};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum State {
    #[default]
    Init,
    BasicReserved,
    ArgsDone,
    EnvsDone,
    PathDone,
    Submitted,
    Aborted,
}

#[repr(C)]
#[derive(BpfError, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("basic channel is full")]
    BasicChannelFull,
    #[error("argument channel is full")]
    ArgumentChannelFull,
    #[error("environment channel is full")]
    EnvironmentChannelFull,
    #[error("path segment channel is full")]
    PathChannelFull,
}

impl Error {
    /// Flag reporting the error in the basic record, a full basic
    /// channel cannot be reported
    #[inline(always)]
    pub const fn flag(&self) -> Option<Flag> {
        match self {
            Self::BasicChannelFull => None,
            Self::ArgumentChannelFull => Some(Flag::FailArg),
            Self::EnvironmentChannelFull => Some(Flag::FailEnv),
            Self::PathChannelFull => Some(Flag::FailPath),
        }
    }
}

/// What a session did with an event
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub state: State,
    pub id: Option<CorrelationId>,
    pub flags: Flags,
    pub error: Option<Error>,
    pub args: usize,
    pub envs: usize,
    pub segments: usize,
}

impl Outcome {
    /// Returns true if a basic record was published
    #[inline(always)]
    pub fn basic_submitted(&self) -> bool {
        match self.state {
            State::Submitted => true,
            State::Aborted => self.id.is_some(),
            _ => false,
        }
    }
}

/// Encodes one execution event into the channels. The basic record is
/// reserved first and published last so that its arrival tells
/// consumers every other record of the event has been attempted.
pub struct EventSession<'s, B, A, E, P> {
    channels: &'s ChannelSet<B, A, E, P>,
}

impl<'s, B, A, E, P> EventSession<'s, B, A, E, P>
where
    B: RingChannel<BasicRecord>,
    A: RingChannel<ArgumentRecord>,
    E: RingChannel<EnvironmentRecord>,
    P: RingChannel<PathSegmentRecord>,
{
    #[inline(always)]
    pub fn new(channels: &'s ChannelSet<B, A, E, P>) -> Self {
        Self { channels }
    }

    pub fn run<S: ExecSnapshot + ?Sized>(&self, snap: &S) -> Outcome {
        let mut out = Outcome::default();

        let mut basic = match reserve_retry_once(&self.channels.basic) {
            Ok(slot) => slot,
            Err(_) => {
                out.state = State::Aborted;
                out.error = Some(Error::BasicChannelFull);
                return out;
            }
        };
        out.state = State::BasicReserved;

        let id = CorrelationId::derive(snap.task_id(), snap.timestamp_ns());
        basic.id = id;
        basic.flags = Flags::empty();
        snap.read_comm(&mut basic.comm);
        snap.read_filename(&mut basic.filename);
        out.id = Some(id);

        match ArgumentStream::new(&self.channels.args).run(id, snap.argv()) {
            Ok(s) => {
                if s.truncated {
                    basic.flags.set(Flag::IncompleteArgs);
                }
                out.args = s.emitted;
                out.state = State::ArgsDone;
            }
            Err(_) => return self.abort(basic, out, Error::ArgumentChannelFull),
        }

        match EnvironmentStream::new(&self.channels.envs).run(id, snap.envp()) {
            Ok(s) => {
                if s.truncated {
                    basic.flags.set(Flag::IncompleteEnvs);
                }
                out.envs = s.emitted;
                out.state = State::EnvsDone;
            }
            Err(_) => return self.abort(basic, out, Error::EnvironmentChannelFull),
        }

        match PathWalker::new(&self.channels.paths).run(id, snap.cwd()) {
            Ok(n) => {
                out.segments = n;
                out.state = State::PathDone;
            }
            Err(_) => return self.abort(basic, out, Error::PathChannelFull),
        }

        out.flags = basic.flags;
        self.channels.basic.submit(basic);
        out.state = State::Submitted;
        out
    }

    #[inline(always)]
    fn abort(&self, mut basic: B::Slot<'s>, mut out: Outcome, err: Error) -> Outcome {
        if let Some(f) = err.flag() {
            basic.flags.set(f);
        }
        out.flags = basic.flags;
        self.channels.basic.submit(basic);
        out.state = State::Aborted;
        out.error = Some(err);
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::channel::{MemoryRing, MemorySlot};
    use crate::consts::{MAX_ARGS, MAX_ENVS};
    use crate::records::RecordKind;
    use crate::snapshot::{OwnedSnapshot, PathChain};
    use std::sync::Mutex;

    /// Ring remembering the global order in which records were submitted
    struct Journaled<'j, T> {
        ring: MemoryRing<T>,
        kind: RecordKind,
        journal: &'j Mutex<Vec<RecordKind>>,
    }

    impl<'j, T> Journaled<'j, T> {
        fn new(kind: RecordKind, cap: usize, journal: &'j Mutex<Vec<RecordKind>>) -> Self {
            Self {
                ring: MemoryRing::with_capacity(cap),
                kind,
                journal,
            }
        }
    }

    impl<T: Default> RingChannel<T> for Journaled<'_, T> {
        type Slot<'a> = MemorySlot<'a, T> where Self: 'a;

        fn reserve(&self) -> Result<Self::Slot<'_>, crate::channel::CapacityExhausted> {
            self.ring.reserve()
        }

        fn submit<'a>(&'a self, slot: Self::Slot<'a>) {
            self.journal.lock().unwrap().push(self.kind);
            self.ring.submit(slot)
        }

        fn discard<'a>(&'a self, slot: Self::Slot<'a>) {
            self.ring.discard(slot)
        }
    }

    type TestChannels<'j> = ChannelSet<
        Journaled<'j, BasicRecord>,
        Journaled<'j, ArgumentRecord>,
        Journaled<'j, EnvironmentRecord>,
        Journaled<'j, PathSegmentRecord>,
    >;

    fn channels(
        journal: &Mutex<Vec<RecordKind>>,
        args: usize,
        envs: usize,
        paths: usize,
    ) -> TestChannels<'_> {
        ChannelSet::new(
            Journaled::new(RecordKind::Basic, 8, journal),
            Journaled::new(RecordKind::Argument, args, journal),
            Journaled::new(RecordKind::Environment, envs, journal),
            Journaled::new(RecordKind::PathSegment, paths, journal),
        )
    }

    fn ls_snapshot() -> OwnedSnapshot {
        OwnedSnapshot::new((1234 << 32) | 1234, 987_654_321)
            .comm("bash")
            .filename("/bin/ls")
            .args(["/bin/ls", "-la"])
            .envs(["PATH=/usr/bin"])
            .cwd(PathChain::new("/home/user/project"))
    }

    fn numbered(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    fn assert_basic_last(journal: &Mutex<Vec<RecordKind>>) {
        let j = journal.lock().unwrap();
        assert_eq!(j.last(), Some(&RecordKind::Basic));
        assert_eq!(j.iter().filter(|k| **k == RecordKind::Basic).count(), 1);
    }

    #[test]
    fn test_full_event() {
        let journal = Mutex::new(vec![]);
        let c = channels(&journal, 64, 128, 32);
        let snap = ls_snapshot();

        let out = EventSession::new(&c).run(&snap);
        assert_eq!(out.state, State::Submitted);
        assert!(out.basic_submitted());
        assert_eq!(out.error, None);
        assert_eq!(out.flags, Flags::empty());
        assert_eq!((out.args, out.envs, out.segments), (2, 1, 3));

        let basic = c.basic.ring.drain();
        assert_eq!(basic.len(), 1);
        let id = CorrelationId::derive(snap.task_id, snap.timestamp_ns);
        assert_eq!(basic[0].id, id);
        assert_eq!(out.id, Some(id));
        assert_eq!(basic[0].comm.to_string(), "bash");
        assert_eq!(basic[0].filename.to_string(), "/bin/ls");
        assert!(basic[0].flags.is_empty());

        let args = c.args.ring.drain();
        assert_eq!(
            args.iter().map(|a| a.text.to_string()).collect::<Vec<_>>(),
            vec!["/bin/ls", "-la"]
        );
        assert!(args.iter().all(|a| a.id == id));

        let envs = c.envs.ring.drain();
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].text.to_string(), "PATH=/usr/bin");

        let segments = c
            .paths
            .ring
            .drain()
            .iter()
            .map(|p| p.name.to_string())
            .collect::<Vec<_>>();
        assert_eq!(segments, vec!["project", "user", "home"]);

        let cwd = format!(
            "/{}",
            segments.iter().rev().cloned().collect::<Vec<_>>().join("/")
        );
        assert_eq!(cwd, "/home/user/project");

        assert_basic_last(&journal);
    }

    #[test]
    fn test_too_many_arguments() {
        let journal = Mutex::new(vec![]);
        let c = channels(&journal, 64, 128, 32);
        let snap = ls_snapshot().args(numbered("a", 40));

        let out = EventSession::new(&c).run(&snap);
        assert_eq!(out.state, State::Submitted);
        assert_eq!(out.args, MAX_ARGS);
        assert!(out.flags.contains(Flag::IncompleteArgs));
        assert_eq!(out.flags.failure(), None);

        assert_eq!(c.args.ring.len(), MAX_ARGS);
        // later stages still ran
        assert_eq!(c.envs.ring.len(), 1);
        assert_eq!(c.paths.ring.len(), 3);
        assert_basic_last(&journal);
    }

    #[test]
    fn test_both_vectors_truncated() {
        let journal = Mutex::new(vec![]);
        let c = channels(&journal, 64, 128, 32);
        let snap = ls_snapshot()
            .args(numbered("a", MAX_ARGS + 1))
            .envs(numbered("E=", MAX_ENVS + 1));

        let out = EventSession::new(&c).run(&snap);
        assert!(out.flags.contains(Flag::IncompleteArgs));
        assert!(out.flags.contains(Flag::IncompleteEnvs));
        assert_eq!(c.envs.ring.len(), MAX_ENVS);
    }

    #[test]
    fn test_basic_single_failure_absorbed() {
        let journal = Mutex::new(vec![]);
        let c = channels(&journal, 64, 128, 32);
        c.basic.ring.fail_next(1);

        let out = EventSession::new(&c).run(&ls_snapshot());
        assert_eq!(out.state, State::Submitted);
        assert_eq!(c.basic.ring.len(), 1);
    }

    #[test]
    fn test_basic_double_failure_emits_nothing() {
        let journal = Mutex::new(vec![]);
        let c = channels(&journal, 64, 128, 32);
        c.basic.ring.fail_next(2);

        let out = EventSession::new(&c).run(&ls_snapshot());
        assert_eq!(out.state, State::Aborted);
        assert_eq!(out.error, Some(Error::BasicChannelFull));
        assert_eq!(out.id, None);
        assert!(!out.basic_submitted());

        assert!(c.basic.ring.is_empty());
        assert!(c.args.ring.is_empty());
        assert!(c.envs.ring.is_empty());
        assert!(c.paths.ring.is_empty());
        assert!(journal.lock().unwrap().is_empty());
    }

    #[test]
    fn test_argument_failure() {
        let journal = Mutex::new(vec![]);
        // room for 5 arguments only
        let c = channels(&journal, 5, 128, 32);
        let snap = ls_snapshot().args(numbered("a", 10));

        let out = EventSession::new(&c).run(&snap);
        assert_eq!(out.state, State::Aborted);
        assert_eq!(out.error, Some(Error::ArgumentChannelFull));
        assert!(out.basic_submitted());
        assert_eq!(out.flags, Flags::empty().with(Flag::FailArg));

        assert_eq!(c.args.ring.len(), 5);
        assert!(c.envs.ring.is_empty());
        assert!(c.paths.ring.is_empty());

        let basic = c.basic.ring.drain();
        assert_eq!(basic.len(), 1);
        assert_eq!(basic[0].flags.failure(), Some(Flag::FailArg));
        assert_basic_last(&journal);
    }

    #[test]
    fn test_first_argument_failure() {
        let journal = Mutex::new(vec![]);
        let c = channels(&journal, 64, 128, 32);
        // the reservation of the very first argument and its retry fail
        c.args.ring.fail_next(2);

        let out = EventSession::new(&c).run(&ls_snapshot());
        assert_eq!(out.state, State::Aborted);
        assert_eq!(out.error, Some(Error::ArgumentChannelFull));
        assert_eq!(out.args, 0);

        assert!(c.args.ring.is_empty());
        assert!(c.envs.ring.is_empty());
        assert!(c.paths.ring.is_empty());

        let basic = c.basic.ring.drain();
        assert_eq!(basic.len(), 1);
        assert_eq!(basic[0].flags, Flags::empty().with(Flag::FailArg));
        assert_eq!(*journal.lock().unwrap(), vec![RecordKind::Basic]);
    }

    #[test]
    fn test_environment_failure_after_truncation() {
        let journal = Mutex::new(vec![]);
        let c = channels(&journal, 64, 128, 32);
        c.envs.ring.fail_next(2);
        let snap = ls_snapshot().args(numbered("a", 40));

        let out = EventSession::new(&c).run(&snap);
        assert_eq!(out.error, Some(Error::EnvironmentChannelFull));
        assert!(out.flags.contains(Flag::IncompleteArgs));
        assert_eq!(out.flags.failure(), Some(Flag::FailEnv));
        assert!(c.paths.ring.is_empty());
        assert_basic_last(&journal);
    }

    #[test]
    fn test_path_failure() {
        let journal = Mutex::new(vec![]);
        let c = channels(&journal, 64, 128, 2);

        let out = EventSession::new(&c).run(&ls_snapshot());
        assert_eq!(out.error, Some(Error::PathChannelFull));
        assert_eq!(out.flags.failure(), Some(Flag::FailPath));
        assert_eq!((out.args, out.envs), (2, 1));
        assert_eq!(c.paths.ring.len(), 2);
        assert_basic_last(&journal);
    }

    #[test]
    fn test_concurrent_sessions() {
        let c = ChannelSet::new(
            MemoryRing::<BasicRecord>::with_capacity(1024),
            MemoryRing::<ArgumentRecord>::with_capacity(4096),
            MemoryRing::<EnvironmentRecord>::with_capacity(4096),
            MemoryRing::<PathSegmentRecord>::with_capacity(4096),
        );

        std::thread::scope(|s| {
            for t in 0..8u64 {
                let c = &c;
                s.spawn(move || {
                    for i in 0..16u64 {
                        let snap = ls_snapshot();
                        let snap = OwnedSnapshot {
                            task_id: (t << 32) | i,
                            timestamp_ns: 1,
                            ..snap
                        };
                        let out = EventSession::new(c).run(&snap);
                        assert_eq!(out.state, State::Submitted);
                    }
                });
            }
        });

        let basic = c.basic.drain();
        assert_eq!(basic.len(), 128);
        assert_eq!(c.args.len(), 256);
        assert_eq!(c.envs.len(), 128);
        assert_eq!(c.paths.len(), 384);

        let mut ids = basic.iter().map(|b| b.id).collect::<Vec<_>>();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 128);
    }

    #[test]
    fn test_error_description() {
        assert_eq!(Error::PathChannelFull.name(), "PathChannelFull");
        assert_eq!(
            Error::ArgumentChannelFull.description(),
            "argument channel is full"
        );
        assert_eq!(Error::BasicChannelFull.flag(), None);
    }
}
