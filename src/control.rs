//! Thin registry-introspection endpoint: a Unix domain socket that
//! accepts one-line commands (`IDS`, `STATS[ <id>]`, `RAW[ <id>]`) and
//! replies with a single JSON line, then closes the connection.
//! Optional; enabled via `--control-socket` on `qa-watch`/`qa-serve`.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::thread;

use crate::error::Error;
use crate::qa::registry;

fn handle_connection(stream: UnixStream) {
    let mut reader = match stream.try_clone() {
        Ok(s) => BufReader::new(s),
        Err(e) => {
            log::warn!(target: "mixrand::control", "failed to clone connection: {}", e);
            return;
        }
    };
    let mut writer = stream;
    let mut line = String::new();

    if reader.read_line(&mut line).unwrap_or(0) == 0 {
        return;
    }

    let trimmed = line.trim();
    let mut parts = trimmed.splitn(2, ' ');
    let command = parts.next().unwrap_or("").to_ascii_uppercase();
    let arg = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let response = match command.as_str() {
        "IDS" => registry::ids(),
        "STATS" => registry::stats(arg),
        "RAW" => registry::raw_data(arg),
        other => format!("{{\"error\":\"unknown command: {}\"}}", other),
    };

    let _ = writer.write_all(response.as_bytes());
    let _ = writer.write_all(b"\n");
}

/// Resolve the control socket path to listen on, if any: an explicit
/// `--control-socket` flag always wins; otherwise fall back to the
/// `qa.control_socket` config file value.
pub fn resolve_path(cli: Option<&PathBuf>, config: Option<&str>) -> Option<PathBuf> {
    cli.cloned().or_else(|| config.map(PathBuf::from))
}

/// Remove any stale socket at `path`, bind a fresh `UnixListener`, and
/// spawn a background thread that serves connections until the process
/// exits. There is no shutdown path for the listener thread itself,
/// since `qa-watch`/`qa-serve` only ever exit the whole process.
pub fn spawn(path: PathBuf) -> Result<(), Error> {
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)?;

    log::info!(target: "mixrand::control", "control socket listening on {}", path.display());

    thread::spawn(move || {
        for incoming in listener.incoming() {
            match incoming {
                Ok(stream) => handle_connection(stream),
                Err(e) => {
                    log::warn!(target: "mixrand::control", "accept failed: {}", e);
                }
            }
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    fn socket_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mixrand_control_test_{}_{}.sock", label, std::process::id()))
    }

    #[test]
    fn test_resolve_path_prefers_cli_over_config() {
        let cli = PathBuf::from("/tmp/cli.sock");
        let resolved = resolve_path(Some(&cli), Some("/tmp/config.sock"));
        assert_eq!(resolved, Some(cli));
    }

    #[test]
    fn test_resolve_path_falls_back_to_config() {
        let resolved = resolve_path(None, Some("/tmp/config.sock"));
        assert_eq!(resolved, Some(PathBuf::from("/tmp/config.sock")));
    }

    #[test]
    fn test_resolve_path_none_when_neither_set() {
        assert_eq!(resolve_path(None, None), None);
    }

    #[test]
    fn test_ids_command_round_trip() {
        let path = socket_path("ids");
        spawn(path.clone()).unwrap();
        thread::sleep(Duration::from_millis(50));

        let mut stream = UnixStream::connect(&path).unwrap();
        stream.write_all(b"IDS\n").unwrap();
        stream.shutdown(std::net::Shutdown::Write).ok();

        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        assert!(response.trim().starts_with('['));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_unknown_command_reports_error() {
        let path = socket_path("unknown");
        spawn(path.clone()).unwrap();
        thread::sleep(Duration::from_millis(50));

        let mut stream = UnixStream::connect(&path).unwrap();
        stream.write_all(b"BOGUS\n").unwrap();
        stream.shutdown(std::net::Shutdown::Write).ok();

        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        assert!(response.contains("error"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_stats_filter_with_no_matching_id() {
        let path = socket_path("stats-filter");
        spawn(path.clone()).unwrap();
        thread::sleep(Duration::from_millis(50));

        let mut stream = UnixStream::connect(&path).unwrap();
        stream.write_all(b"STATS no-such-monitor\n").unwrap();
        stream.shutdown(std::net::Shutdown::Write).ok();

        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        assert_eq!(response.trim(), "{}");

        let _ = std::fs::remove_file(&path);
    }
}
