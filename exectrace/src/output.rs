use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use log::debug;
use thiserror::Error;

use crate::config::Config;
use crate::correlate::{ChannelReader, Correlated, Correlator};
use crate::dataset::{self, PerfDataset};
use crate::events::ExecEvent;
use crate::filter::Filter;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to write event: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialize event: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Dataset(#[from] dataset::Error),
}

fn open_output(path: &str) -> io::Result<Box<dyn Write + Send>> {
    Ok(match path {
        "stdout" | "/dev/stdout" => Box::new(io::stdout()),
        "stderr" | "/dev/stderr" => Box::new(io::stderr()),
        p => Box::new(BufWriter::new(
            OpenOptions::new().create(true).append(true).open(p)?,
        )),
    })
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub written: u64,
    pub filtered: u64,
}

/// Writes events as json lines, optionally collecting the executables
/// of the events written into a perf dataset
pub struct EventWriter {
    out: Box<dyn Write + Send>,
    filter: Filter,
    host_uuid: Option<uuid::Uuid>,
    dataset: Option<PerfDataset>,
    stats: Stats,
}

impl EventWriter {
    pub fn new(out: Box<dyn Write + Send>, filter: Filter, host_uuid: Option<uuid::Uuid>) -> Self {
        Self {
            out,
            filter,
            host_uuid,
            dataset: None,
            stats: Stats::default(),
        }
    }

    pub fn from_config(conf: &Config) -> io::Result<Self> {
        let mut w = Self::new(
            open_output(&conf.output)?,
            conf.filter.clone(),
            conf.host_uuid(),
        );
        w.dataset = conf.perf_dataset.clone().map(PerfDataset::new);
        Ok(w)
    }

    #[inline]
    pub fn dataset(&self) -> Option<&PerfDataset> {
        self.dataset.as_ref()
    }

    #[inline]
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Writes the event unless it gets filtered out. Returns true if
    /// the event got written.
    pub fn handle(&mut self, c: Correlated) -> Result<bool, Error> {
        let e = ExecEvent::from_correlated(c, self.host_uuid);

        if !self.filter.keep(&e) {
            debug!("filtered out event id={} path={}", e.id, e.resolved_path);
            self.stats.filtered += 1;
            return Ok(false);
        }

        if e.is_truncated() {
            debug!("truncated event id={} cmd={}", e.id, e.command_line());
        }

        if let Some(d) = self.dataset.as_mut() {
            d.insert(&e);
        }

        serde_json::to_writer(&mut self.out, &e)?;
        self.out.write_all(b"\n")?;
        self.stats.written += 1;
        Ok(true)
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        Ok(self.out.flush()?)
    }

    /// Flushes the output and writes the perf dataset if one is
    /// collected. Returns the path of the dataset written.
    pub fn finish(&mut self) -> Result<Option<PathBuf>, Error> {
        self.flush()?;
        match &self.dataset {
            Some(d) => Ok(Some(d.write()?)),
            None => Ok(None),
        }
    }

    /// Writes all the events `correlator` can complete out of what
    /// `reader` has available and returns how many were completed
    pub fn forward<R: ChannelReader + ?Sized>(
        &mut self,
        correlator: &mut Correlator,
        reader: &mut R,
    ) -> Result<usize, Error> {
        let events = correlator.poll(reader);
        let n = events.len();

        for c in events {
            self.handle(c)?;
        }

        if n > 0 {
            self.flush()?;
        }
        Ok(n)
    }
}
