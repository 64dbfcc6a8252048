use std::path::Path;

use aya::maps::{MapData, MapError, RingBuf};
use aya::programs::{ProgramError, TracePoint};
use aya::{Ebpf, EbpfError, EbpfLoader};
use exectrace_common::records::{Record, RecordKind};
use log::{error, info};
use thiserror::Error;

use crate::correlate::ChannelReader;

pub const TRACEPOINT_CATEGORY: &str = "syscalls";
pub const TRACEPOINT_NAME: &str = "sys_enter_execve";

#[derive(Error, Debug)]
pub enum Error {
    #[error("map not found: {0}")]
    MapNotFound(&'static str),
    #[error("program not found: {0}")]
    ProgramNotFound(&'static str),
    #[error("{0}")]
    Map(#[from] MapError),
    #[error("{0}")]
    Program(#[from] ProgramError),
    #[error("{0}")]
    Ebpf(#[from] EbpfError),
}

/// Loads the eBPF object, every channel being sized to `ring_size` bytes
pub fn load<P: AsRef<Path>>(object: P, ring_size: u32) -> Result<Ebpf, Error> {
    let mut loader = EbpfLoader::new();
    for kind in RecordKind::variants() {
        loader.set_max_entries(kind.map_name(), ring_size);
    }
    Ok(loader.load_file(object)?)
}

/// Attaches the probe capturing execution events
pub fn attach(bpf: &mut Ebpf) -> Result<(), Error> {
    let program: &mut TracePoint = bpf
        .program_mut(TRACEPOINT_NAME)
        .ok_or(Error::ProgramNotFound(TRACEPOINT_NAME))?
        .try_into()?;

    program.load()?;
    program.attach(TRACEPOINT_CATEGORY, TRACEPOINT_NAME)?;
    info!("attached {TRACEPOINT_CATEGORY}/{TRACEPOINT_NAME}");
    Ok(())
}

/// Reads records out of the kernel ring buffers
pub struct RingReader {
    basic: RingBuf<MapData>,
    args: RingBuf<MapData>,
    envs: RingBuf<MapData>,
    paths: RingBuf<MapData>,
}

fn take_ring(bpf: &mut Ebpf, kind: RecordKind) -> Result<RingBuf<MapData>, Error> {
    let name = kind.map_name();
    let map = bpf.take_map(name).ok_or(Error::MapNotFound(name))?;
    Ok(RingBuf::try_from(map)?)
}

impl RingReader {
    pub fn from_ebpf(bpf: &mut Ebpf) -> Result<Self, Error> {
        Ok(Self {
            basic: take_ring(bpf, RecordKind::Basic)?,
            args: take_ring(bpf, RecordKind::Argument)?,
            envs: take_ring(bpf, RecordKind::Environment)?,
            paths: take_ring(bpf, RecordKind::PathSegment)?,
        })
    }

    fn ring_mut(&mut self, kind: RecordKind) -> &mut RingBuf<MapData> {
        match kind {
            RecordKind::Basic => &mut self.basic,
            RecordKind::Argument => &mut self.args,
            RecordKind::Environment => &mut self.envs,
            RecordKind::PathSegment => &mut self.paths,
        }
    }
}

impl ChannelReader for RingReader {
    fn drain(&mut self, kind: RecordKind) -> Vec<Record> {
        let ring = self.ring_mut(kind);
        let mut out = vec![];

        while let Some(item) = ring.next() {
            match Record::from_bytes(kind, &item) {
                Ok(r) => out.push(r),
                Err(e) => error!("failed to decode record: {e}"),
            }
        }

        out
    }
}
