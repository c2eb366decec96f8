// slogd-send: send syslog-style messages to a slogd socket (a tiny logger(1))
use clap::Parser;
use slogd_client::{SyslogSender, DEFAULT_PRIORITY};
use slogd_core::{DEFAULT_SOCKET_PATH, MAX_DATAGRAM_LEN};
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "slogd-send")]
#[command(about = "Send syslog-style messages to slogd", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    /// Socket to send to
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Syslog priority value written as <N>
    #[arg(short, long, default_value_t = DEFAULT_PRIORITY)]
    priority: u8,

    /// Host (tag) field in front of the message
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Number of times to send the message
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,

    /// Milliseconds to wait between messages
    #[arg(short, long, default_value_t = 0)]
    delay: u64,

    /// Send the message verbatim, without adding a header
    #[arg(long)]
    raw: bool,

    /// Message text
    #[arg(required = true)]
    message: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    let message = cli.message.join(" ");

    let mut sender = match SyslogSender::connect(&cli.socket) {
        Ok(s) => s.priority(cli.priority),
        Err(e) => {
            eprintln!("Failed to connect to {}: {}", cli.socket.display(), e);
            process::exit(1);
        }
    };
    if let Some(host) = cli.host {
        sender = sender.host(host);
    }

    for i in 0..cli.count {
        let sent = if cli.raw {
            sender.send_raw(message.as_bytes())
        } else {
            sender.send(&message)
        };
        match sent {
            Ok(n) if n > MAX_DATAGRAM_LEN => {
                eprintln!("Warning: sent {} bytes, slogd keeps only {}", n, MAX_DATAGRAM_LEN)
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("Failed to send message {}: {}", i, e);
                process::exit(1);
            }
        }
        if cli.delay > 0 && i + 1 < cli.count {
            thread::sleep(Duration::from_millis(cli.delay));
        }
    }
}
