// client: syslog-style sender for slogd, usable from tools and tests
use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;
use std::io::Result;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};

/// `user.notice`, what logger(1) uses by default.
pub const DEFAULT_PRIORITY: u8 = 13;

/// Render `<priority>Mon DD HH:MM:SS host: message`.
pub fn format_line<Tz>(priority: u8, at: &DateTime<Tz>, host: &str, message: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    // %d rather than the space-padded %e: slogd splits the header on single
    // spaces and a padded day would eat one of them
    format!("<{}>{} {}: {}", priority, at.format("%b %d %H:%M:%S"), host, message)
}

pub struct SyslogSender {
    socket: UnixDatagram,
    path: PathBuf,
    priority: u8,
    host: String,
}

impl SyslogSender {
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let socket = UnixDatagram::unbound()?;
        socket.connect(&path)?;

        Ok(SyslogSender {
            socket,
            path,
            priority: DEFAULT_PRIORITY,
            host: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
        })
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Send `message` stamped with the local time.
    pub fn send(&self, message: &str) -> Result<usize> {
        self.send_at(&Local::now(), message)
    }

    pub fn send_at<Tz>(&self, at: &DateTime<Tz>, message: &str) -> Result<usize>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let line = format_line(self.priority, at, &self.host, message);
        self.socket.send(line.as_bytes())
    }

    /// Send bytes exactly as given, header included.
    pub fn send_raw(&self, datagram: &[u8]) -> Result<usize> {
        self.socket.send(datagram)
    }
}
