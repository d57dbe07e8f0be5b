//! `qa-serve`: a UDP responder that replies to each request with a
//! block of QA-gated entropy, regenerating on rejection. Grounded in
//! bit-babbler's `SocketSource::do_server_thread` (`socket-source.h`):
//! `do { r = m_pool->read(rbuf, bytes); } while (!qa.Check(rbuf, r));`
//! followed by a reply send. Each request drives its own retry cycle
//! against a shared generator -- a different shape from the
//! continuous read-forward loop in `qa::gate::run` (used by
//! `qa-watch`), so this loop is spelled out directly instead of
//! reusing that helper.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::cli::QaServeArgs;
use crate::config::{CpuRngConfig, QaConfig};
use crate::entropy::fallback;
use crate::error::Error;
use crate::qa::monitor::HealthMonitor;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = signal_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
        libc::sigaction(libc::SIGINT, &sa, std::ptr::null_mut());
    }
}

fn generate(source: &str, count: usize, cpu_config: &CpuRngConfig) -> Result<Vec<u8>, Error> {
    match source {
        "fallback" => fallback::generate_fallback(count, cpu_config),
        other => Err(Error::InvalidArgs(format!(
            "unsupported qa-serve source: {} (only \"fallback\" generates on demand)",
            other
        ))),
    }
}

pub fn run(args: &QaServeArgs, cpu_config: &CpuRngConfig, qa_config: &QaConfig) -> Result<(), Error> {
    if args.block_size == 0 {
        return Err(Error::InvalidArgs("block-size must be greater than 0".into()));
    }

    install_signal_handlers();

    let monitor = HealthMonitor::new(args.id.clone(), qa_config.assume_ent8_ok, qa_config);

    if let Some(path) = crate::control::resolve_path(
        args.control_socket.as_ref(),
        qa_config.control_socket.as_deref(),
    ) {
        crate::control::spawn(path)?;
    }

    let socket = UdpSocket::bind(&args.bind)?;
    socket.set_read_timeout(Some(Duration::from_millis(250)))?;

    log::info!(
        target: "mixrand::qa_serve",
        "started: id={} bind={} block_size={}",
        args.id, args.bind, args.block_size,
    );

    let mut request = [0u8; 64];

    while !SHUTDOWN.load(Ordering::Relaxed) {
        let peer = match socket.recv_from(&mut request) {
            Ok((_, peer)) => peer,
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let reply = loop {
            let candidate = match generate(&args.source, args.block_size, cpu_config) {
                Ok(data) => data,
                Err(e) => {
                    log::error!(
                        target: "mixrand::qa_serve",
                        "{}: generation failed, dropping request from {}: {}",
                        monitor.id(), peer, e,
                    );
                    break None;
                }
            };
            if monitor.check(&candidate) {
                break Some(candidate);
            }
            log::warn!(
                target: "mixrand::qa_serve",
                "{}: rejected block, regenerating", monitor.id(),
            );
        };

        let Some(reply) = reply else {
            continue;
        };

        if let Err(e) = socket.send_to(&reply, peer) {
            log::error!(target: "mixrand::qa_serve", "send to {} failed: {}", peer, e);
        }
    }

    log::info!(target: "mixrand::qa_serve", "shutting down: {}", monitor.report_json());
    Ok(())
}
