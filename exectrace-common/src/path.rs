use crate::channel::{reserve_retry_once, CapacityExhausted, RingChannel};
use crate::consts::MAX_PATH_DEPTH;
use crate::records::{CorrelationId, PathSegmentRecord};
use crate::snapshot::DirChain;

/// Walks the working directory up to the task root, emitting one
/// segment per directory, innermost first. The walk stops silently
/// after [`MAX_PATH_DEPTH`] hops.
pub struct PathWalker<'c, C> {
    channel: &'c C,
}

impl<'c, C: RingChannel<PathSegmentRecord>> PathWalker<'c, C> {
    #[inline(always)]
    pub fn new(channel: &'c C) -> Self {
        Self { channel }
    }

    /// Returns the number of segments emitted
    #[inline(always)]
    pub fn run<D: DirChain + ?Sized>(
        &self,
        id: CorrelationId,
        chain: &D,
    ) -> Result<usize, CapacityExhausted> {
        let mut node = chain.pwd();
        let mut emitted = 0;

        for _ in 0..MAX_PATH_DEPTH {
            let parent = chain.parent(node);
            if chain.is_root(node) || node == parent {
                break;
            }

            let mut slot = reserve_retry_once(self.channel)?;
            slot.id = id;
            chain.read_name(node, &mut slot.name);
            self.channel.submit(slot);

            emitted += 1;
            node = parent;
        }

        Ok(emitted)
    }
}
