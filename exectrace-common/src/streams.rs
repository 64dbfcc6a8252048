use core::marker::PhantomData;

use crate::channel::{reserve_retry_once, CapacityExhausted, RingChannel};
use crate::consts::{MAX_ARGS, MAX_ENVS};
use crate::records::{ArgumentRecord, CorrelationId, EnvironmentRecord, TextRecord};
use crate::snapshot::ExecVector;

/// Outcome of a stream which did not hit a capacity failure
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Streamed {
    pub emitted: usize,
    /// entries were left in the vector after the cap was reached
    pub truncated: bool,
}

/// Emits one record per entry of an [`ExecVector`], up to `CAP`
/// records.
pub struct VectorStream<'c, T, C, const CAP: usize> {
    channel: &'c C,
    _record: PhantomData<T>,
}

pub type ArgumentStream<'c, C> = VectorStream<'c, ArgumentRecord, C, MAX_ARGS>;
pub type EnvironmentStream<'c, C> = VectorStream<'c, EnvironmentRecord, C, MAX_ENVS>;

impl<'c, T, C, const CAP: usize> VectorStream<'c, T, C, CAP>
where
    T: TextRecord,
    C: RingChannel<T>,
{
    #[inline(always)]
    pub fn new(channel: &'c C) -> Self {
        Self {
            channel,
            _record: PhantomData,
        }
    }

    #[inline(always)]
    pub const fn cap(&self) -> usize {
        CAP
    }

    /// Streams `vector` into the channel. Records already submitted
    /// stay published when a reservation finally fails.
    #[inline(always)]
    pub fn run<V: ExecVector + ?Sized>(
        &self,
        id: CorrelationId,
        vector: &V,
    ) -> Result<Streamed, CapacityExhausted> {
        let mut out = Streamed::default();

        for i in 0..CAP {
            if !vector.has_entry(i) {
                return Ok(out);
            }

            let mut slot = reserve_retry_once(self.channel)?;
            slot.tag(id);
            vector.read_entry(i, slot.text_mut());
            self.channel.submit(slot);
            out.emitted += 1;
        }

        out.truncated = vector.has_entry(CAP);
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::channel::MemoryRing;

    fn args(n: usize) -> Vec<std::string::String> {
        (0..n).map(|i| format!("arg{i}")).collect()
    }

    #[test]
    fn test_under_cap() {
        let ring = MemoryRing::<ArgumentRecord>::with_capacity(64);
        let id = CorrelationId::from_raw(1);

        let s = ArgumentStream::new(&ring).run(id, &args(3)).unwrap();
        assert_eq!(
            s,
            Streamed {
                emitted: 3,
                truncated: false
            }
        );

        let texts = ring
            .drain()
            .iter()
            .map(|r| {
                assert_eq!(r.id, id);
                r.text.to_string()
            })
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["arg0", "arg1", "arg2"]);
    }

    #[test]
    fn test_exactly_cap() {
        let ring = MemoryRing::<ArgumentRecord>::with_capacity(64);
        let s = ArgumentStream::new(&ring)
            .run(CorrelationId::default(), &args(MAX_ARGS))
            .unwrap();
        assert_eq!(s.emitted, MAX_ARGS);
        assert!(!s.truncated);
    }

    #[test]
    fn test_over_cap() {
        let ring = MemoryRing::<EnvironmentRecord>::with_capacity(128);
        let stream = EnvironmentStream::new(&ring);
        assert_eq!(stream.cap(), MAX_ENVS);

        let s = stream
            .run(CorrelationId::default(), &args(MAX_ENVS + 1))
            .unwrap();
        assert_eq!(s.emitted, MAX_ENVS);
        assert!(s.truncated);
        assert_eq!(ring.len(), MAX_ENVS);
    }

    #[test]
    fn test_failure_keeps_published() {
        let ring = MemoryRing::<ArgumentRecord>::with_capacity(4);
        let r = ArgumentStream::new(&ring).run(CorrelationId::default(), &args(10));
        assert_eq!(r, Err(CapacityExhausted));
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn test_long_entry_truncated() {
        let ring = MemoryRing::<ArgumentRecord>::with_capacity(4);
        let long = vec!["x".repeat(10_000)];
        ArgumentStream::new(&ring)
            .run(CorrelationId::default(), &long)
            .unwrap();

        let r = ring.pop().unwrap();
        assert_eq!(r.text.len(), crate::consts::MAX_STR_SIZE - 1);
    }
}
