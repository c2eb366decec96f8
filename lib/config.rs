// Runtime configuration: built-in defaults, then SLOGD_* environment variables
use slogd_core::{CollisionPolicy, DEFAULT_SOCKET_PATH, DEFAULT_TABLE_CAPACITY};
use std::env;
use std::fmt::Display;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

// Environment variables for configuration
// SLOGD_SOCKET: path of the datagram socket (default: /dev/log)
// SLOGD_TABLE_CAPACITY: number of frequency table buckets (default: 999)
// SLOGD_COLLISIONS: faithful | separate (default: faithful)
// SLOGD_ECHO: 1 to print every received datagram on stdout (default: 0)
// SLOGD_PID_FILE: file receiving the daemon pid (default: none)
pub const ENV_SOCKET: &str = "SLOGD_SOCKET";
pub const ENV_TABLE_CAPACITY: &str = "SLOGD_TABLE_CAPACITY";
pub const ENV_COLLISIONS: &str = "SLOGD_COLLISIONS";
pub const ENV_ECHO: &str = "SLOGD_ECHO";
pub const ENV_PID_FILE: &str = "SLOGD_PID_FILE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub socket_path: PathBuf,
    pub table_capacity: NonZeroUsize,
    pub collisions: CollisionPolicy,
    pub echo_raw: bool,
    pub pid_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            table_capacity: NonZeroUsize::new(DEFAULT_TABLE_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
            collisions: CollisionPolicy::default(),
            echo_raw: false,
            pid_file: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source; unset or empty variables
    /// keep the default, invalid ones keep it too and are logged.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        Config {
            socket_path: get(ENV_SOCKET)
                .map(PathBuf::from)
                .unwrap_or(defaults.socket_path),
            table_capacity: parse_or(ENV_TABLE_CAPACITY, get(ENV_TABLE_CAPACITY), defaults.table_capacity),
            collisions: parse_or(ENV_COLLISIONS, get(ENV_COLLISIONS), defaults.collisions),
            echo_raw: get(ENV_ECHO)
                .map(|v| match parse_flag(&v) {
                    Some(on) => on,
                    None => {
                        warn!(variable = ENV_ECHO, value = %v, "expected a boolean, using default");
                        defaults.echo_raw
                    }
                })
                .unwrap_or(defaults.echo_raw),
            pid_file: get(ENV_PID_FILE).map(PathBuf::from).or(defaults.pid_file),
        }
    }
}

fn parse_or<T>(name: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match value {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(e) => {
                warn!(variable = name, value = %raw, "{}, using {}", e, default);
                default
            }
        },
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
