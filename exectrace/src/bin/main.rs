#![deny(unused_imports)]

use anyhow::anyhow;
use clap::builder::styling;
use clap::{Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use env_logger::Builder;
use exectrace::config::Config;
use exectrace::correlate::{memory_channels, Correlator};
use exectrace::dataset::{DatasetConfig, PerfDataset};
use exectrace::output::EventWriter;
use exectrace::snapshot;
use exectrace::trace::{self, RingReader};
use exectrace::util::{bump_memlock_rlimit, get_current_uid};
use exectrace_common::session::EventSession;
use exectrace_common::snapshot::OwnedSnapshot;
use log::{debug, info, warn, LevelFilter};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

const ABOUT_EXECTRACE: &str = "Captures process executions and rebuilds them from bounded records";

#[derive(Parser)]
#[command(author, version, about = ABOUT_EXECTRACE, long_about = None)]
struct Cli {
    /// Enable debugging
    #[arg(short, long)]
    debug: bool,

    /// Silents out debug, info, error logging.
    #[arg(short, long)]
    silent: bool,

    /// Set verbosity level, repeat option for more verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct OutputOpt {
    /// Specify a configuration file to use. Command line options supersede the ones specified in the configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// File where events are written. Supersedes configuration file.
    #[arg(short, long, value_name = "FILE")]
    output: Option<String>,

    /// Drop events which are incomplete or had a failing stage
    #[arg(long)]
    drop_incomplete: bool,

    #[clap(flatten)]
    dataset: DatasetOpt,
}

#[derive(Debug, Args)]
struct DatasetOpt {
    /// Package being built, collects a perf dataset of the executables
    /// run. Supersedes configuration file.
    #[arg(long, value_name = "NAME", requires = "package_version")]
    package: Option<String>,

    /// Version of the package being built
    #[arg(long, value_name = "VERSION", requires = "package")]
    package_version: Option<String>,

    /// Directory where the perf dataset is written
    #[arg(long, value_name = "DIR")]
    dataset_dir: Option<PathBuf>,
}

impl DatasetOpt {
    fn apply(self, conf: &mut Config) {
        if let (Some(package), Some(version)) = (self.package, self.package_version) {
            conf.perf_dataset = Some(DatasetConfig::new(package, version));
        }

        if let (Some(dir), Some(d)) = (self.dataset_dir, conf.perf_dataset.as_mut()) {
            d.directory = dir;
        }
    }
}

impl TryFrom<OutputOpt> for Config {
    type Error = anyhow::Error;

    fn try_from(opt: OutputOpt) -> Result<Self, Self::Error> {
        let mut conf = match opt.config {
            Some(p) => Config::from_file(p)?,
            None => Config::default(),
        };

        // command line supersedes configuration
        if let Some(output) = opt.output {
            conf = conf.output(output);
        }

        if opt.drop_incomplete {
            conf.filter.drop_incomplete = true;
        }

        opt.dataset.apply(&mut conf);
        conf.validate()?;

        Ok(conf)
    }
}

#[derive(Debug, Args)]
struct SnapshotOpt {
    #[clap(flatten)]
    output: OutputOpt,

    /// Pid of the process to snapshot, can be repeated. Defaults to
    /// the current process.
    #[arg(short, long)]
    pid: Vec<i32>,

    /// Snapshot all the processes
    #[arg(long, conflicts_with = "pid")]
    all: bool,

    /// Number of worker threads encoding events
    #[arg(short, long, default_value_t = 4)]
    workers: usize,
}

#[derive(Debug, Args)]
struct TraceOpt {
    #[clap(flatten)]
    output: OutputOpt,

    /// eBPF object to load. Supersedes configuration file.
    #[arg(long, value_name = "FILE")]
    object: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct AnalyzeOpt {
    /// Configuration file providing the filter and the dataset settings
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[clap(flatten)]
    dataset: DatasetOpt,

    /// Event files, one json event per line
    #[arg(short, long, value_name = "FILE", required = true, num_args = 1..)]
    files: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct ConfigOpt {
    /// Dump a default configuration on the terminal
    #[arg(long, exclusive = true)]
    dump: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Encode live processes as execution events and print them
    Snapshot(SnapshotOpt),
    /// Trace process executions with an eBPF object
    Trace(TraceOpt),
    /// Build the perf dataset of previously written event files
    Analyze(AnalyzeOpt),
    /// Dump a default configuration
    Config(ConfigOpt),
}

impl Command {
    fn snapshot(o: SnapshotOpt) -> anyhow::Result<()> {
        let conf: Config = o.output.try_into()?;

        let snaps: Vec<OwnedSnapshot> = if o.all {
            snapshot::all()?
        } else if o.pid.is_empty() {
            vec![snapshot::from_pid(process::id() as i32)?]
        } else {
            o.pid
                .iter()
                .map(|&pid| snapshot::from_pid(pid))
                .collect::<Result<_, _>>()?
        };
        info!("encoding {} snapshots", snaps.len());

        let channels = memory_channels(conf.ring_size()? as usize);
        let mut correlator = Correlator::with_max_pending(conf.max_pending);
        let mut writer = EventWriter::from_config(&conf)?;

        let chunk_size = snaps.len().div_ceil(o.workers.max(1)).max(1);

        thread::scope(|s| {
            let workers = snaps
                .chunks(chunk_size)
                .map(|chunk| {
                    let channels = &channels;
                    s.spawn(move || {
                        for snap in chunk {
                            let out = EventSession::new(channels).run(snap);
                            match (out.error, out.id) {
                                (Some(e), Some(id)) => {
                                    warn!("partial event id={id}: {}", e.description())
                                }
                                (Some(e), None) => warn!("event dropped: {}", e.description()),
                                _ => {}
                            }
                        }
                    })
                })
                .collect::<Vec<_>>();

            // consuming while producing keeps channels from filling up
            let mut reader = &channels;
            while !workers.iter().all(|w| w.is_finished()) {
                writer.forward(&mut correlator, &mut reader)?;
                thread::sleep(Duration::from_millis(10));
            }
            writer.forward(&mut correlator, &mut reader)?;

            Ok::<_, anyhow::Error>(())
        })?;

        if let Some(p) = writer.finish()? {
            info!("perf dataset written to {}", p.display());
        }
        debug!("correlator: {:?}", correlator.stats());
        debug!("output: {:?}", writer.stats());
        Ok(())
    }

    fn trace(o: TraceOpt) -> anyhow::Result<()> {
        // checking that we are running as root
        if get_current_uid() != 0 {
            return Err(anyhow::Error::msg(
                "You need to be root to run this program, this is necessary to load eBPF programs",
            ));
        }

        let object = o.object;
        let mut conf: Config = o.output.try_into()?;
        if object.is_some() {
            conf.ebpf_object = object;
        }

        let object = conf
            .ebpf_object
            .clone()
            .ok_or(anyhow!("no eBPF object to load"))?;

        if let Err(e) = bump_memlock_rlimit() {
            warn!("failed to bump memlock rlimit: {e}");
        }

        let mut bpf = trace::load(&object, conf.ring_size()?)?;
        // rings are opened before the probe is attached so that no record gets lost
        let mut reader = RingReader::from_ebpf(&mut bpf)?;
        trace::attach(&mut bpf)?;

        let mut correlator = Correlator::with_max_pending(conf.max_pending);
        let mut writer = EventWriter::from_config(&conf)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        runtime.block_on(async {
            let main = async {
                loop {
                    let c = writer.forward(&mut correlator, &mut reader)?;

                    // we adapt sleep time when load increases
                    let millis = match c {
                        0..=500 => 100,
                        501..=1000 => 50,
                        1001.. => 25,
                    };

                    tokio::time::sleep(Duration::from_millis(millis)).await;
                }

                #[allow(unreachable_code)]
                Ok::<_, anyhow::Error>(())
            };

            info!("Waiting for Ctrl-C...");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => Ok(()),
                res = main => res
            }
        })?;

        // what got published before the interruption
        writer.forward(&mut correlator, &mut reader)?;
        if let Some(p) = writer.finish()? {
            info!("perf dataset written to {}", p.display());
        }
        info!("correlator: {:?}", correlator.stats());
        info!("output: {:?}", writer.stats());
        Ok(())
    }

    fn analyze(o: AnalyzeOpt) -> anyhow::Result<()> {
        let mut conf = match o.config {
            Some(p) => Config::from_file(p)?,
            None => Config::default(),
        };
        o.dataset.apply(&mut conf);
        conf.validate()?;

        let mut dataset = conf
            .perf_dataset
            .clone()
            .map(PerfDataset::new)
            .ok_or(anyhow!("no package to build a perf dataset for"))?;

        for f in o.files {
            info!("loading {}", f.display());
            let n = dataset.extend_from_reader(&conf.filter, BufReader::new(File::open(&f)?))?;
            info!("loaded {n} events from {}", f.display());
        }

        let p = dataset.write()?;
        println!("{} executables in perf dataset at {}", dataset.len(), p.display());
        Ok(())
    }

    fn config(co: ConfigOpt) -> anyhow::Result<()> {
        if co.dump {
            let conf = Config::default().generate_host_uuid();
            println!("{}", serde_yaml::to_string(&conf)?);
        }
        Ok(())
    }
}

fn main() -> Result<(), anyhow::Error> {
    let c = {
        let c: clap::Command = Cli::command();
        let styles = styling::Styles::styled()
            .header(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
            .usage(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
            .literal(styling::AnsiColor::Blue.on_default() | styling::Effects::BOLD)
            .placeholder(styling::AnsiColor::Cyan.on_default());

        c.styles(styles)
    };

    let cli: Cli = Cli::from_arg_matches(&c.get_matches())?;

    // setting log level according to the verbosity level
    let mut log_level = LevelFilter::Warn;
    match cli.verbose {
        1 => log_level = LevelFilter::Info,
        2 => log_level = LevelFilter::Debug,
        3..=u8::MAX => log_level = LevelFilter::Trace,
        _ => {}
    }

    // silent out logging if specified in CLI
    if cli.silent {
        log_level = LevelFilter::Off;
    }

    // handling debugging flag
    if cli.debug {
        log_level = LevelFilter::Debug;
    }

    // building the logger
    Builder::new().filter_level(log_level).init();

    match cli.command {
        Command::Snapshot(o) => Command::snapshot(o),
        Command::Trace(o) => Command::trace(o),
        Command::Analyze(o) => Command::analyze(o),
        Command::Config(o) => Command::config(o),
    }
}
