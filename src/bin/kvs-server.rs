//! this binary starts the kvs server
//! to see the list of commands, type: `kvs-server --help`
//!
//! `kvs-server [--config FILE] [--jobs DIR] [--pipe PATH] [--max-sessions N] [--max-threads N]
//! [--max-backups N] [--pool naive|shared|rayon] [--verbose]`
//!
//!     Runs every `.job` file in DIR. If PATH is given, clients are accepted on the FIFO at PATH
//!     while the jobs run, and forever after. Without PATH the server exits once the jobs are done.

use std::path::{Path, PathBuf};
use std::process::exit;
use std::thread;

use clap::{arg_enum, crate_version, value_t, App, Arg, ArgMatches};
use pipekv::job::run_jobs;
use pipekv::{
    Kvs, KvsError, KvsServer, KvStore, NaiveThreadPool, PoolKind, RayonThreadPool, Result,
    ServerConfig, SessionManager, SharedQueueThreadPool, ThreadPool,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

arg_enum! {
    #[allow(non_camel_case_types)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Pool {
        naive,
        shared,
        rayon
    }
}

impl From<Pool> for PoolKind {
    fn from(pool: Pool) -> Self {
        match pool {
            Pool::naive => PoolKind::Naive,
            Pool::shared => PoolKind::Shared,
            Pool::rayon => PoolKind::Rayon,
        }
    }
}

fn main() {
    let matches = App::new("kvs-server")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("a concurrent key-value store served over named pipes")
        .arg(Arg::with_name("config")
            .long("config")
            .value_name("FILE")
            .help("a JSON configuration file, command line options override its values"))
        .arg(Arg::with_name("jobs")
            .long("jobs")
            .value_name("DIR")
            .help("a directory of .job files to run"))
        .arg(Arg::with_name("pipe")
            .long("pipe")
            .value_name("PATH")
            .help("the FIFO clients register on"))
        .arg(Arg::with_name("max-sessions")
            .long("max-sessions")
            .value_name("N")
            .help("the maximum number of concurrently connected clients"))
        .arg(Arg::with_name("max-threads")
            .long("max-threads")
            .value_name("N")
            .help("the number of threads running job files"))
        .arg(Arg::with_name("max-backups")
            .long("max-backups")
            .value_name("N")
            .help("the maximum number of backups written at the same time"))
        .arg(Arg::with_name("pool")
            .long("pool")
            .value_name("POOL")
            .possible_values(&Pool::variants())
            .help("the thread pool implementation"))
        .arg(Arg::with_name("verbose")
            .long("verbose")
            .short("v")
            .help("log everything, down to TRACE level"))
        .get_matches();

    subscriber_config(matches.is_present("verbose"));

    let config = match build_config(&matches) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{:?}", err);
            exit(1);
        }
    };

    if let Err(e) = run(config) {
        eprintln!("{:?}", e);
        exit(1);
    }
}

/// merges the configuration file (if any) with the command line options and validates the result
fn build_config(matches: &ArgMatches) -> Result<ServerConfig> {
    let mut config = match matches.value_of("config") {
        Some(path) => ServerConfig::from_file(Path::new(path))?,
        None => ServerConfig::default(),
    };

    if let Some(dir) = matches.value_of("jobs") {
        config.jobs_dir = Some(PathBuf::from(dir));
    }
    if let Some(pipe) = matches.value_of("pipe") {
        config.registration_pipe = Some(PathBuf::from(pipe));
    }
    if let Some(n) = parse_number(matches, "max-sessions")? {
        config.max_sessions = n;
    }
    if let Some(n) = parse_number(matches, "max-threads")? {
        config.max_threads = u32::try_from(n)
            .map_err(|_| KvsError::Parsing(format!("max-threads is too large: {}", n)))?;
    }
    if let Some(n) = parse_number(matches, "max-backups")? {
        config.max_backups = n;
    }
    if matches.is_present("pool") {
        let pool = value_t!(matches, "pool", Pool)
            .map_err(|e| KvsError::Parsing(format!("invalid pool: {}", e)))?;
        config.pool = pool.into();
    }

    config.validate()?;
    Ok(config)
}

fn parse_number(matches: &ArgMatches, name: &str) -> Result<Option<usize>> {
    matches
        .value_of(name)
        .map(|value| {
            value
                .parse::<usize>()
                .map_err(|_| KvsError::Parsing(format!("{} must be a number, got {}", name, value)))
        })
        .transpose()
}

fn run(config: ServerConfig) -> Result<()> {
    info!("kvs-server {}", env!("CARGO_PKG_VERSION"));
    info!("Thread pool: {:?}", config.pool);

    match config.pool {
        PoolKind::Naive => run_with_pool::<NaiveThreadPool>(config),
        PoolKind::Shared => run_with_pool::<SharedQueueThreadPool>(config),
        PoolKind::Rayon => run_with_pool::<RayonThreadPool>(config),
    }
}

fn run_with_pool<P: ThreadPool + 'static>(config: ServerConfig) -> Result<()> {
    let store = KvStore::with_buckets(config.buckets)?;

    // clients are served while the jobs run, so subscribers see the jobs' writes
    let server = match config.registration_pipe.clone() {
        Some(pipe) => {
            let store = store.clone();
            let max_sessions = config.max_sessions;
            let timeout = config.response_timeout();
            let handle = thread::Builder::new()
                .name("kvs-accept".to_string())
                .spawn(move || -> Result<()> {
                    // one thread per session slot, so an admitted client never waits for a thread
                    let threads = u32::try_from(max_sessions).map_err(|_| {
                        KvsError::Parsing(format!("max_sessions is too large: {}", max_sessions))
                    })?;
                    let pool = P::new(threads)?;
                    let sessions = SessionManager::new(max_sessions)?;
                    KvsServer::new(store, pool, sessions, timeout).run(&pipe)
                })?;
            Some(handle)
        }
        None => None,
    };

    if let Some(dir) = &config.jobs_dir {
        let kvs = Kvs::new(store, config.max_backups)?;
        let workers = P::new(config.max_threads)?;
        let jobs = run_jobs(&kvs, dir, &workers)?;
        info!("{} jobs finished", jobs);
    }

    if let Some(handle) = server {
        handle
            .join()
            .map_err(|_| KvsError::StringErr("the accept thread panicked".to_string()))??;
    }
    Ok(())
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config(verbose: bool) {
    let level = if verbose { Level::TRACE } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        // completes the builder.
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting tracing default subscriber failed: {}", e);
    }
}
