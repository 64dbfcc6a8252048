use std::collections::HashSet;

use exectrace_common::channel::{ChannelSet, MemoryRing};
use exectrace_common::records::{
    ArgumentRecord, BasicRecord, CorrelationId, EnvironmentRecord, PathSegmentRecord, Record,
    RecordKind,
};
use log::{debug, warn};
use lru_st::collections::{LruHashMap, LruHashSet};

pub const DEFAULT_MAX_PENDING: usize = 4096;

/// Source of published records, one queue per record kind
pub trait ChannelReader {
    /// Consumes every record of `kind` published so far, in
    /// publication order
    fn drain(&mut self, kind: RecordKind) -> Vec<Record>;
}

pub type MemoryChannels = ChannelSet<
    MemoryRing<BasicRecord>,
    MemoryRing<ArgumentRecord>,
    MemoryRing<EnvironmentRecord>,
    MemoryRing<PathSegmentRecord>,
>;

/// In memory channels, each one able to hold `ring_size` bytes of records
pub fn memory_channels(ring_size: usize) -> MemoryChannels {
    ChannelSet::new(
        MemoryRing::with_byte_size(ring_size),
        MemoryRing::with_byte_size(ring_size),
        MemoryRing::with_byte_size(ring_size),
        MemoryRing::with_byte_size(ring_size),
    )
}

impl ChannelReader for MemoryChannels {
    fn drain(&mut self, kind: RecordKind) -> Vec<Record> {
        let mut shared: &MemoryChannels = self;
        shared.drain(kind)
    }
}

// in memory channels are drained through shared references so that
// producers can keep on running while records are consumed
impl ChannelReader for &MemoryChannels {
    fn drain(&mut self, kind: RecordKind) -> Vec<Record> {
        match kind {
            RecordKind::Basic => self.basic.drain().into_iter().map(Record::from).collect(),
            RecordKind::Argument => self.args.drain().into_iter().map(Record::from).collect(),
            RecordKind::Environment => self.envs.drain().into_iter().map(Record::from).collect(),
            RecordKind::PathSegment => self.paths.drain().into_iter().map(Record::from).collect(),
        }
    }
}

#[derive(Debug, Default)]
struct Pending {
    arguments: Vec<String>,
    environment: Vec<String>,
    segments: Vec<String>,
}

/// All the records received for a correlation id
#[derive(Debug, Clone)]
pub struct Correlated {
    pub basic: Box<BasicRecord>,
    pub arguments: Vec<String>,
    pub environment: Vec<String>,
    /// innermost directory first
    pub segments: Vec<String>,
}

impl Correlated {
    #[inline]
    pub fn id(&self) -> CorrelationId {
        self.basic.id
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub finalized: u64,
    pub collisions: u64,
    pub evicted: u64,
}

/// Groups records by correlation id. Records of an event are kept
/// pending until the basic record of the event shows up.
pub struct Correlator {
    pending: LruHashMap<CorrelationId, Pending>,
    // ids recently finalized, to detect colliding ids
    finalized: LruHashSet<CorrelationId>,
    max_pending: usize,
    stats: Stats,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::with_max_pending(DEFAULT_MAX_PENDING)
    }
}

impl Correlator {
    pub fn with_max_pending(max_pending: usize) -> Self {
        let max_pending = max_pending.max(1);
        Self {
            pending: LruHashMap::with_max_entries(max_pending),
            finalized: LruHashSet::with_max_entries(max_pending),
            max_pending,
            stats: Stats::default(),
        }
    }

    /// Number of ids waiting for their basic record
    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn stats(&self) -> Stats {
        self.stats
    }

    fn ingest(&mut self, r: Record) {
        let id = r.correlation_id();

        if r.kind() == RecordKind::Basic {
            warn!("unexpected basic record id={id}");
            return;
        }

        let mut p = match self.pending.remove(&id) {
            Some(p) => p,
            None => {
                if self.pending.len() >= self.max_pending {
                    self.stats.evicted += 1;
                    warn!("too many pending events, dropping the least recently updated one");
                }
                Pending::default()
            }
        };

        match r {
            Record::Argument(a) => p.arguments.push(a.text.to_string()),
            Record::Environment(e) => p.environment.push(e.text.to_string()),
            Record::PathSegment(s) => p.segments.push(s.name.to_string()),
            Record::Basic(_) => {}
        }

        self.pending.insert(id, p);
    }

    /// Consumes everything available from `reader` and returns the
    /// events whose basic record was received. Basic records are
    /// drained before any other kind: producers publish them last so
    /// all the records of the returned events have been read.
    pub fn poll<R: ChannelReader + ?Sized>(&mut self, reader: &mut R) -> Vec<Correlated> {
        let basics = reader.drain(RecordKind::Basic);

        for kind in [
            RecordKind::Argument,
            RecordKind::Environment,
            RecordKind::PathSegment,
        ] {
            for r in reader.drain(kind) {
                self.ingest(r);
            }
        }

        let mut out = Vec::with_capacity(basics.len());
        let mut seen = HashSet::with_capacity(basics.len());

        for r in basics {
            let basic = match r {
                Record::Basic(b) => b,
                other => {
                    warn!("unexpected {} record on basic channel", other.kind());
                    continue;
                }
            };

            let id = basic.id;
            if !seen.insert(id) || self.finalized.contains(&id) {
                self.stats.collisions += 1;
                warn!("correlation id collision id={id}");
            }
            self.finalized.insert(id);

            let p = self.pending.remove(&id).unwrap_or_default();
            debug!(
                "finalizing event id={id} args={} envs={} segments={}",
                p.arguments.len(),
                p.environment.len(),
                p.segments.len()
            );

            self.stats.finalized += 1;
            out.push(Correlated {
                basic,
                arguments: p.arguments,
                environment: p.environment,
                segments: p.segments,
            });
        }

        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use exectrace_common::channel::RingChannel;
    use exectrace_common::flags::Flag;
    use exectrace_common::session::EventSession;
    use exectrace_common::snapshot::{OwnedSnapshot, PathChain};

    fn snapshot(task_id: u64) -> OwnedSnapshot {
        OwnedSnapshot::new(task_id, 1000)
            .comm("bash")
            .filename("/bin/ls")
            .args(["/bin/ls", "-la"])
            .envs(["PATH=/usr/bin"])
            .cwd(PathChain::new("/home/user/project"))
    }

    #[test]
    fn test_correlate_session() {
        let mut channels = memory_channels(1 << 20);
        EventSession::new(&channels).run(&snapshot(42));

        let mut c = Correlator::default();
        let events = c.poll(&mut channels);
        assert_eq!(events.len(), 1);

        let e = &events[0];
        assert_eq!(e.id(), CorrelationId::derive(42, 1000));
        assert_eq!(e.arguments, vec!["/bin/ls", "-la"]);
        assert_eq!(e.environment, vec!["PATH=/usr/bin"]);
        assert_eq!(e.segments, vec!["project", "user", "home"]);
        assert_eq!(c.pending(), 0);
        assert_eq!(c.stats().finalized, 1);
    }

    #[test]
    fn test_records_wait_for_basic() {
        let mut channels = memory_channels(1 << 20);
        let id = CorrelationId::from_raw(7);

        // an event still in progress, its basic record is not out yet
        let mut s = channels.args.reserve().unwrap();
        s.id = id;
        s.text = "in-progress".into();
        channels.args.submit(s);

        let mut c = Correlator::default();
        assert!(c.poll(&mut channels).is_empty());
        assert_eq!(c.pending(), 1);

        let mut b = channels.basic.reserve().unwrap();
        b.id = id;
        b.flags.set(Flag::FailEnv);
        channels.basic.submit(b);

        let events = c.poll(&mut channels);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].arguments, vec!["in-progress"]);
        assert!(events[0].basic.flags.contains(Flag::FailEnv));
        assert_eq!(c.pending(), 0);
    }

    #[test]
    fn test_concurrent_events() {
        let mut channels = memory_channels(1 << 22);
        std::thread::scope(|s| {
            for t in 0..4u64 {
                let channels = &channels;
                s.spawn(move || {
                    for i in 0..8u64 {
                        EventSession::new(channels).run(&snapshot((t << 32) | i));
                    }
                });
            }
        });

        let mut c = Correlator::default();
        let events = c.poll(&mut channels);
        assert_eq!(events.len(), 32);
        assert!(events.iter().all(|e| e.arguments.len() == 2
            && e.environment.len() == 1
            && e.segments.len() == 3));
        assert_eq!(c.stats().collisions, 0);
    }

    #[test]
    fn test_collision() {
        let mut channels = memory_channels(1 << 20);
        // same task at the same timestamp
        EventSession::new(&channels).run(&snapshot(1));
        EventSession::new(&channels).run(&snapshot(1));

        let mut c = Correlator::default();
        let events = c.poll(&mut channels);
        assert_eq!(events.len(), 2);
        assert_eq!(c.stats().collisions, 1);
        // first basic record takes all records of the id
        assert_eq!(events[0].arguments.len(), 4);
        assert!(events[1].arguments.is_empty());

        // a late duplicate is reported too
        EventSession::new(&channels).run(&snapshot(1));
        c.poll(&mut channels);
        assert_eq!(c.stats().collisions, 2);
    }

    #[test]
    fn test_orphans_evicted() {
        let mut channels = memory_channels(1 << 20);
        for i in 0..4 {
            let mut s = channels.paths.reserve().unwrap();
            s.id = CorrelationId::from_raw(i);
            channels.paths.submit(s);
        }

        let mut c = Correlator::with_max_pending(2);
        c.poll(&mut channels);
        assert_eq!(c.pending(), 2);
        assert_eq!(c.stats().evicted, 2);
    }
}
