//! The kvs-client executable supports the following command line arguments:
//!
//! `kvs-client <CLIENT_ID> <REGISTER_PIPE> [--dir DIR]`
//!
//!     Connects to the server listening on REGISTER_PIPE, using the FIFOs DIR/req<ID>,
//!     DIR/resp<ID> and DIR/notif<ID> (DIR defaults to /tmp). Notifications are printed to
//!     stdout as `(key,value)` as they arrive.
//!
//! Commands are then read from stdin, one per line:
//!
//!     SUBSCRIBE [key]
//!     UNSUBSCRIBE [key]
//!     DELAY <ms>
//!     DISCONNECT
//!
//! `kvs-client -V`
//!
//!     Print the version.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use clap::{crate_version, App, Arg};
use pipekv::{KvsClient, KvsError, Result};
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_DIR: &str = "/tmp";

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    request: PathBuf,
    response: PathBuf,
    notification: PathBuf,
    server: PathBuf,
}

impl Opt {
    /// derives the client's three FIFO paths from its `id`
    fn build(id: &str, server: &str, dir: &str) -> Result<Opt> {
        if id.is_empty() || id.contains('/') {
            return Err(KvsError::Parsing(format!("invalid client id: {:?}", id)));
        }
        let dir = Path::new(dir);
        Ok(Opt {
            request: dir.join(format!("req{}", id)),
            response: dir.join(format!("resp{}", id)),
            notification: dir.join(format!("notif{}", id)),
            server: PathBuf::from(server),
        })
    }
}

/// A line typed on stdin
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Subscribe(String),
    Unsubscribe(String),
    Delay(u64),
    Disconnect,
    Empty,
    Invalid,
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    let (name, args) = match line.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (line, ""),
    };
    let key = || {
        args.strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .map(str::trim)
            .filter(|key| !key.is_empty() && !key.contains(','))
            .map(String::from)
    };
    match name {
        "" => Input::Empty,
        _ if name.starts_with('#') => Input::Empty,
        "SUBSCRIBE" => key().map_or(Input::Invalid, Input::Subscribe),
        "UNSUBSCRIBE" => key().map_or(Input::Invalid, Input::Unsubscribe),
        "DELAY" => args.parse().map_or(Input::Invalid, Input::Delay),
        "DISCONNECT" if args.is_empty() => Input::Disconnect,
        _ => Input::Invalid,
    }
}

fn main() -> Result<()> {
    subscriber_config();

    let matches = App::new("kvs-client")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("subscribes to keys of a kvs-server")
        .arg(Arg::with_name("CLIENT_ID").required(true).index(1))
        .arg(Arg::with_name("REGISTER_PIPE").required(true).index(2))
        .arg(Arg::with_name("dir")
            .long("dir")
            .value_name("DIR")
            .help("the directory the client's FIFOs are created in")
            .default_value(DEFAULT_DIR))
        .get_matches();

    // required and defaulted arguments are always present
    let opt = Opt::build(
        matches.value_of("CLIENT_ID").unwrap_or_default(),
        matches.value_of("REGISTER_PIPE").unwrap_or_default(),
        matches.value_of("dir").unwrap_or(DEFAULT_DIR),
    )?;
    run(opt)
}

fn run(opt: Opt) -> Result<()> {
    let mut client = KvsClient::connect(&opt.request, &opt.response, &opt.notification, &opt.server)?;
    println!("Connected to server");

    let notifications = client.notifications()?;
    thread::Builder::new()
        .name("notifications".to_string())
        .spawn(move || {
            for notification in notifications {
                match notification {
                    Ok(notification) => println!("{}", notification),
                    Err(e) => {
                        error!("could not read notification: {}", e);
                        break;
                    }
                }
            }
        })?;

    for line in io::stdin().lock().lines() {
        match parse_input(&line?) {
            Input::Subscribe(key) => {
                if !client.subscribe(&key)? {
                    eprintln!("Command subscribe failed");
                }
            }
            Input::Unsubscribe(key) => {
                if !client.unsubscribe(&key)? {
                    eprintln!("Command unsubscribe failed");
                }
            }
            Input::Delay(ms) => {
                println!("Waiting...");
                thread::sleep(Duration::from_millis(ms));
            }
            Input::Disconnect => break,
            Input::Empty => {}
            Input::Invalid => eprintln!("Invalid command. See HELP for usage"),
        }
    }

    // end of input counts as a disconnect
    if !client.disconnect()? {
        return Err(KvsError::StringErr("Failed to disconnect from the server".to_string()));
    }
    println!("Disconnected from server");
    Ok(())
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        // completes the builder.
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting tracing default subscriber failed: {}", e);
    }
}
