//! Job files: scripts of store operations executed by the server.
//!
//! A job file holds one command per line:
//!
//! ```text
//! # a comment
//! WRITE [(key,value)(key2,value2)]
//! READ [key,key2]
//! DELETE [key,key2]
//! SHOW
//! WAIT 1000
//! BACKUP
//! HELP
//! ```
//!
//! The output of `foo.job` is written to `foo.out` next to it, and its backups are written to
//! `foo-1.bck`, `foo-2.bck`, ... in the same directory.
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crossbeam::sync::WaitGroup;
use tracing::{debug, error, info, instrument};
use walkdir::WalkDir;

use crate::backup::BackupHandle;
use crate::operations::Kvs;
use crate::thread_pool::ThreadPool;
use crate::{KvsEngine, KvsError, Result};

/// extension of the files picked up by [`run_jobs`]
pub const JOB_EXTENSION: &str = "job";
/// extension of the output files
pub const OUT_EXTENSION: &str = "out";

const INVALID: &str = "Invalid command. See HELP for usage\n";
const BACKUP_FAILED: &str = "Failed to perform backup.\n";
const HELP: &str = "Available commands:\n\
                    \x20 WRITE [(key,value)(key2,value2),...]\n\
                    \x20 READ [key,key2,...]\n\
                    \x20 DELETE [key,key2,...]\n\
                    \x20 SHOW\n\
                    \x20 WAIT <delay_ms>\n\
                    \x20 BACKUP\n\
                    \x20 HELP\n";

/// One line of a job file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// write the pairs
    Write(Vec<(String, String)>),
    /// read the keys
    Read(Vec<String>),
    /// delete the keys
    Delete(Vec<String>),
    /// print the whole store
    Show,
    /// sleep for the given number of milliseconds
    Wait(u64),
    /// back up the store
    Backup,
    /// print the list of commands
    Help,
    /// a blank or comment line
    Empty,
    /// anything else
    Invalid,
}

impl Command {
    /// parses one line of a job file
    pub fn parse(line: &str) -> Command {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Command::Empty;
        }

        let (name, args) = match line.find(char::is_whitespace) {
            Some(idx) => (&line[..idx], line[idx..].trim()),
            None => (line, ""),
        };
        let parsed = match name {
            "WRITE" => parse_pairs(args).map(Command::Write),
            "READ" => parse_keys(args).map(Command::Read),
            "DELETE" => parse_keys(args).map(Command::Delete),
            "SHOW" if args.is_empty() => Some(Command::Show),
            "WAIT" => args.parse().ok().map(Command::Wait),
            "BACKUP" if args.is_empty() => Some(Command::Backup),
            "HELP" if args.is_empty() => Some(Command::Help),
            _ => None,
        };
        parsed.unwrap_or(Command::Invalid)
    }
}

// "[(k,v)(k2,v2)]"
fn parse_pairs(args: &str) -> Option<Vec<(String, String)>> {
    let inner = args.strip_prefix('[')?.strip_suffix(']')?;
    let pairs = inner
        .split(')')
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(|piece| {
            let (key, value) = piece.strip_prefix('(')?.split_once(',')?;
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect::<Option<Vec<_>>>()?;
    (!pairs.is_empty()).then(|| pairs)
}

// "[k,k2]"
fn parse_keys(args: &str) -> Option<Vec<String>> {
    let inner = args.strip_prefix('[')?.strip_suffix(']')?;
    let keys: Vec<String> = inner
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(String::from)
        .collect();
    (!keys.is_empty()).then(|| keys)
}

/// the output file of the job at `job`
pub fn out_path(job: &Path) -> PathBuf {
    job.with_extension(OUT_EXTENSION)
}

/// runs every command of the job file at `job`, printing results to its `.out` file.
///
/// Returns once the job's backups are written too.
#[instrument(skip(kvs))]
pub fn run_job<E: KvsEngine>(kvs: &Kvs<E>, job: &Path) -> Result<()> {
    let job_name = job
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| KvsError::Parsing(format!("invalid job file name {:?}", job)))?;
    let dir = job.parent().unwrap_or_else(|| Path::new("."));
    let reader = BufReader::new(File::open(job)?);
    let mut out = BufWriter::new(File::create(out_path(job))?);

    let mut backups: Vec<BackupHandle> = Vec::new();
    // numbers every BACKUP command, including the ones that fail to start
    let mut backup_seq = 0_u64;
    for line in reader.lines() {
        match Command::parse(&line?) {
            Command::Write(pairs) => {
                kvs.write(&pairs)?;
            }
            Command::Read(keys) => kvs.read(&keys, &mut out)?,
            Command::Delete(keys) => kvs.delete(&keys, &mut out)?,
            Command::Show => kvs.show(&mut out)?,
            Command::Wait(delay_ms) => {
                out.write_all(b"Waiting...\n")?;
                kvs.wait(delay_ms);
            }
            Command::Backup => {
                backup_seq += 1;
                let seq = backup_seq;
                match kvs.backup(job_name, seq, dir) {
                    Ok(handle) => backups.push(handle),
                    Err(e) => {
                        error!("backup {} of {} failed: {}", seq, job_name, e);
                        out.write_all(BACKUP_FAILED.as_bytes())?;
                    }
                }
            }
            Command::Help => out.write_all(HELP.as_bytes())?,
            Command::Empty => {}
            Command::Invalid => out.write_all(INVALID.as_bytes())?,
        }
    }

    for handle in backups {
        if let Err(e) = handle.wait() {
            error!("backup of {} failed: {}", job_name, e);
            out.write_all(BACKUP_FAILED.as_bytes())?;
        }
    }
    out.flush()?;
    debug!("job finished");
    Ok(())
}

/// the job files directly inside `dir`, sorted by name
pub fn job_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut jobs = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| KvsError::StringErr(format!("could not list {:?}: {}", dir, e)))?;
        let path = entry.path();
        if entry.file_type().is_file()
            && path.extension().map_or(false, |ext| ext == JOB_EXTENSION)
        {
            jobs.push(path.to_path_buf());
        }
    }
    jobs.sort();
    Ok(jobs)
}

/// runs every job file in `dir` on `pool`, waiting for all of them to finish.
///
/// A failing job is logged and does not stop the others.
/// Returns the number of job files that were run.
pub fn run_jobs<E: KvsEngine, P: ThreadPool>(kvs: &Kvs<E>, dir: &Path, pool: &P) -> Result<usize> {
    let jobs = job_files(dir)?;
    info!("running {} jobs from {:?}", jobs.len(), dir);

    let wg = WaitGroup::new();
    for job in &jobs {
        let kvs = kvs.clone();
        let job = job.clone();
        let wg = wg.clone();
        pool.spawn(move || {
            if let Err(e) = run_job(&kvs, &job) {
                error!("job {:?} failed: {}", job, e);
            }
            drop(wg);
        });
    }
    wg.wait();
    Ok(jobs.len())
}
