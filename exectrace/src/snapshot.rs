use std::fs;
use std::io;
use std::path::PathBuf;

use exectrace_common::snapshot::{OwnedSnapshot, PathChain};
use log::debug;
use procfs::process::{self, Process};
use thiserror::Error;

use crate::util::monotonic_ns;

#[derive(Error, Debug)]
pub enum Error {
    #[error("procfs: {0}")]
    Procfs(#[from] procfs::ProcError),
    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Splits a null terminated procfs vector, keeping entries order.
/// Empty entries are legitimate arguments and are kept.
fn split_nul(raw: &[u8]) -> Vec<Vec<u8>> {
    if raw.is_empty() {
        return vec![];
    }
    let raw = raw.strip_suffix(b"\0").unwrap_or(raw);
    raw.split(|&b| b == 0).map(|s| s.to_vec()).collect()
}

/// Builds the snapshot of a live process, as if it was calling
/// execve on its current command line.
pub fn from_process(p: &Process) -> Result<OwnedSnapshot, Error> {
    let stat = p.stat()?;
    let argv = split_nul(&fs::read(format!("/proc/{}/cmdline", p.pid()))?);
    // procfs parses environ into a map, we need it in order
    let envp = split_nul(&fs::read(format!("/proc/{}/environ", p.pid()))?);

    let cwd = p.cwd()?;
    let root = p.root().unwrap_or_else(|_| PathBuf::from("/"));

    let filename = match p.exe() {
        Ok(exe) => exe.to_string_lossy().as_bytes().to_vec(),
        Err(_) => argv.first().cloned().unwrap_or_default(),
    };

    let tgid = stat.pid as u64;
    let task_id = (tgid << 32) | p.pid() as u64;

    let mut snap = OwnedSnapshot::new(task_id, monotonic_ns()?)
        .comm(stat.comm)
        .filename(filename)
        .cwd(PathChain::with_root(cwd, root));
    snap.argv = argv;
    snap.envp = envp;

    Ok(snap)
}

pub fn from_pid(pid: i32) -> Result<OwnedSnapshot, Error> {
    from_process(&Process::new(pid)?)
}

/// Snapshots of all the processes we can access, kernel threads
/// excepted
pub fn all() -> Result<Vec<OwnedSnapshot>, Error> {
    let mut out = vec![];
    for p in process::all_processes()? {
        let Ok(p) = p else { continue };
        match from_process(&p) {
            // kernel threads have no command line
            Ok(s) if s.argv.is_empty() => {}
            Ok(s) => out.push(s),
            Err(e) => debug!("cannot snapshot pid={}: {e}", p.pid()),
        }
    }
    Ok(out)
}
