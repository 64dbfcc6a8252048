use exectrace_common::consts::{PAGE_SIZE, RING_PAGES};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::correlate::DEFAULT_MAX_PENDING;
use crate::dataset::DatasetConfig;
use crate::filter::Filter;

pub const DEFAULT_OUTPUT: &str = "/dev/stdout";

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read configuration: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("ring size must be a power of two number of pages: {0}")]
    InvalidRingPages(u32),
    #[error("ring size does not fit in 32 bits: {0} pages")]
    RingTooLarge(u32),
    #[error("perf dataset needs a package name and version")]
    InvalidDataset,
    #[error("max pending events must be greater than zero")]
    InvalidMaxPending,
}

/// Exectrace configuration structure to be used in userland
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    host_uuid: Option<uuid::Uuid>,
    pub output: String,
    /// size of every channel in pages
    pub ring_pages: u32,
    pub max_pending: usize,
    pub ebpf_object: Option<PathBuf>,
    pub filter: Filter,
    pub perf_dataset: Option<DatasetConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host_uuid: None,
            output: DEFAULT_OUTPUT.into(),
            ring_pages: RING_PAGES as u32,
            max_pending: DEFAULT_MAX_PENDING,
            ebpf_object: None,
            filter: Filter::default(),
            perf_dataset: None,
        }
    }
}

fn host_uuid() -> Option<uuid::Uuid> {
    if let Ok(machine_id) = fs::read_to_string("/etc/machine-id") {
        let machine_id = machine_id.trim_end();
        // we do not generate uuid if machine_id is empty string
        if machine_id.is_empty() {
            return None;
        }
        return Some(uuid::Uuid::new_v5(
            &uuid::Uuid::NAMESPACE_OID,
            machine_id.as_bytes(),
        ));
    }
    None
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let conf: Self = serde_yaml::from_str(&fs::read_to_string(p)?)?;
        conf.validate()?;
        Ok(conf)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !self.ring_pages.is_power_of_two() {
            return Err(Error::InvalidRingPages(self.ring_pages));
        }
        self.ring_size()?;
        if self.max_pending == 0 {
            return Err(Error::InvalidMaxPending);
        }
        if let Some(d) = &self.perf_dataset {
            if d.package.is_empty() || d.version.is_empty() {
                return Err(Error::InvalidDataset);
            }
        }
        Ok(())
    }

    pub fn host_uuid(&self) -> Option<uuid::Uuid> {
        // host_uuid in config supersedes system host_uuid
        self.host_uuid.or(host_uuid())
    }

    pub fn generate_host_uuid(mut self) -> Self {
        self.host_uuid = host_uuid().or(Some(uuid::Uuid::new_v4()));
        self
    }

    pub fn output<P: AsRef<Path>>(mut self, p: P) -> Self {
        self.output = p.as_ref().to_string_lossy().to_string();
        self
    }

    /// Size in bytes of every channel, kernel ring buffers take it as
    /// a 32 bits value
    pub fn ring_size(&self) -> Result<u32, Error> {
        (self.ring_pages as usize)
            .checked_mul(PAGE_SIZE)
            .and_then(|s| u32::try_from(s).ok())
            .ok_or(Error::RingTooLarge(self.ring_pages))
    }
}
