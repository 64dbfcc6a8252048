use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::ExecEvent;
use crate::filter::Filter;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("failed to serialize dataset: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

/// Package whose build is being traced
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatasetConfig {
    pub package: String,
    pub version: String,
    /// directory the dataset is written to
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
}

impl DatasetConfig {
    pub fn new<P: Into<String>, V: Into<String>>(package: P, version: V) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
            directory: default_directory(),
        }
    }
}

/// Deduplicated set of the executables run while building a package,
/// identified by their resolved path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerfDataset {
    config: DatasetConfig,
    paths: BTreeSet<String>,
}

impl PerfDataset {
    pub fn new(config: DatasetConfig) -> Self {
        Self {
            config,
            paths: BTreeSet::new(),
        }
    }

    /// File name of the dataset: `{package}-{version}-perf`
    pub fn name(&self) -> String {
        format!("{}-{}-perf", self.config.package, self.config.version)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(|p| p.as_str())
    }

    /// Adds the executable of an event. Events missing one of their
    /// mandatory fields cannot be replayed and are ignored. Returns
    /// true if the path was not already known.
    pub fn insert(&mut self, e: &ExecEvent) -> bool {
        if !e.complete || e.resolved_path.is_empty() {
            return false;
        }
        self.paths.insert(e.resolved_path.clone())
    }

    /// Adds the events kept by `filter` out of a json lines event stream
    /// and returns the number of events read. Lines which are not events
    /// are skipped.
    pub fn extend_from_reader<R: BufRead>(
        &mut self,
        filter: &Filter,
        reader: R,
    ) -> Result<usize, Error> {
        let mut n = 0;
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let e: ExecEvent = match serde_json::from_str(&line) {
                Ok(e) => e,
                Err(err) => {
                    warn!("skipping line {}: {err}", i + 1);
                    continue;
                }
            };
            n += 1;

            if filter.keep(&e) {
                self.insert(&e);
            } else {
                debug!("filtered out {}", e.resolved_path);
            }
        }
        Ok(n)
    }

    /// Writes the dataset as a yaml list in the configured directory
    /// and returns the path of the file written
    pub fn write(&self) -> Result<PathBuf, Error> {
        let path = self.config.directory.join(self.name());
        self.write_to(&path)?;
        Ok(path)
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let mut w = BufWriter::new(File::create(path)?);
        serde_yaml::to_writer(&mut w, &self.paths)?;
        w.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::correlate::Correlated;
    use exectrace_common::flags::{Flag, Flags};
    use exectrace_common::records::{BasicRecord, CorrelationId};
    use std::fs;
    use std::io::Cursor;

    fn event(exe: &str, cwd: &[&str], flags: Flags) -> ExecEvent {
        ExecEvent::from_correlated(
            Correlated {
                basic: Box::new(BasicRecord {
                    id: CorrelationId::from_raw(1),
                    flags,
                    comm: "make".into(),
                    filename: exe.into(),
                }),
                arguments: vec![exe.into()],
                environment: vec![],
                segments: cwd.iter().map(|s| s.to_string()).collect(),
            },
            None,
        )
    }

    fn build_filter() -> Filter {
        Filter {
            exclude_prefixes: vec!["/usr/".into()],
            exclude_suffixes: vec!["/configure".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_name() {
        let d = PerfDataset::new(DatasetConfig::new("zlib", "1.3.1"));
        assert_eq!(d.name(), "zlib-1.3.1-perf");
    }

    #[test]
    fn test_insert_deduplicates() {
        let mut d = PerfDataset::new(DatasetConfig::new("zlib", "1.3.1"));
        assert!(d.insert(&event("./minigzip", &["zlib", "src"], Flags::empty())));
        // same executable from the same directory
        assert!(!d.insert(&event("./minigzip", &["zlib", "src"], Flags::empty())));
        // same absolute path, spelled differently by the caller
        assert!(!d.insert(&event("/src/zlib/./minigzip", &[], Flags::empty())));
        assert!(d.insert(&event("./example", &["zlib", "src"], Flags::empty())));
        // failed stages make an event unusable
        assert!(!d.insert(&event("./other", &["zlib", "src"], Flags::empty().with(Flag::FailArg))));

        assert_eq!(
            d.paths().collect::<Vec<_>>(),
            vec!["/src/zlib/./example", "/src/zlib/./minigzip"]
        );
    }

    #[test]
    fn test_from_events() {
        let lines = [
            event("./minigzip", &["zlib", "src"], Flags::empty()),
            event("/usr/bin/cc", &["zlib", "src"], Flags::empty()),
            event("./configure", &["zlib", "src"], Flags::empty()),
            event("./minigzip", &["zlib", "src"], Flags::empty()),
        ]
        .iter()
        .map(|e| serde_json::to_string(e).unwrap())
        .collect::<Vec<_>>()
        .join("\n");
        let input = format!("{lines}\nnot an event\n\n");

        let mut d = PerfDataset::new(DatasetConfig::new("zlib", "1.3.1"));
        let n = d
            .extend_from_reader(&build_filter(), Cursor::new(input))
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(d.len(), 1);
        assert_eq!(d.paths().next(), Some("/src/zlib/./minigzip"));
    }

    #[test]
    fn test_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut conf = DatasetConfig::new("zlib", "1.3.1");
        conf.directory = dir.path().to_path_buf();

        let mut d = PerfDataset::new(conf);
        d.insert(&event("./minigzip", &["zlib", "src"], Flags::empty()));
        d.insert(&event("./example", &["zlib", "src"], Flags::empty()));

        let path = d.write().unwrap();
        assert_eq!(path, dir.path().join("zlib-1.3.1-perf"));

        let paths: Vec<String> = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(paths, vec!["/src/zlib/./example", "/src/zlib/./minigzip"]);
    }
}
