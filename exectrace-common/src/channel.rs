use core::ops::DerefMut;

use crate::records::{ArgumentRecord, BasicRecord, EnvironmentRecord, PathSegmentRecord};

crate::not_bpf_target_code! {
    mod user;
    pub use user::*;
}

/// Returned when a channel has no room left for a new record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityExhausted;

/// Bounded output queue of fixed size records. Implementations never
/// block: a reservation either succeeds immediately or fails with
/// [`CapacityExhausted`]. Reservations may happen concurrently from
/// several execution contexts.
pub trait RingChannel<T> {
    type Slot<'a>: DerefMut<Target = T>
    where
        Self: 'a;

    /// Reserves room for one zeroed record
    fn reserve(&self) -> Result<Self::Slot<'_>, CapacityExhausted>;

    /// Publishes a reserved record to consumers
    fn submit<'a>(&'a self, slot: Self::Slot<'a>);

    /// Gives a reserved record back without publishing it
    fn discard<'a>(&'a self, slot: Self::Slot<'a>);
}

/// Reservation discipline shared by every stage: one immediate retry,
/// then the failure is reported to the caller.
#[inline(always)]
pub fn reserve_retry_once<T, C: RingChannel<T>>(
    channel: &C,
) -> Result<C::Slot<'_>, CapacityExhausted> {
    match channel.reserve() {
        Ok(slot) => Ok(slot),
        Err(_) => channel.reserve(),
    }
}

/// The four output channels, one per record kind. They are shared by
/// every session running concurrently.
pub struct ChannelSet<B, A, E, P> {
    pub basic: B,
    pub args: A,
    pub envs: E,
    pub paths: P,
}

impl<B, A, E, P> ChannelSet<B, A, E, P>
where
    B: RingChannel<BasicRecord>,
    A: RingChannel<ArgumentRecord>,
    E: RingChannel<EnvironmentRecord>,
    P: RingChannel<PathSegmentRecord>,
{
    pub fn new(basic: B, args: A, envs: E, paths: P) -> Self {
        Self {
            basic,
            args,
            envs,
            paths,
        }
    }
}
