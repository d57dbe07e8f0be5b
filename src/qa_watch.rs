//! `qa-watch`: characterizes one entropy source against the QA gate
//! without forwarding any data anywhere, mirroring bit-babbler's
//! `SecretSink` (`secret-sink.h`), whose only purpose is to drive a
//! `HealthMonitor` against a device's raw output stream.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cli::QaWatchArgs;
use crate::config::{CpuRngConfig, QaConfig};
use crate::entropy::{cpurng, fallback, haveged, hwrng};
use crate::error::Error;
use crate::qa::gate;
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

fn generate(name: &str, count: usize, cpu_config: &CpuRngConfig) -> Result<Vec<u8>, Error> {
    match name {
        "hwrng" => hwrng::read_hwrng(count),
        "rdseed" => cpurng::collect_rdseed(count, cpu_config.rdseed_retries),
        "rdrand" => cpurng::collect_rdrand(count, cpu_config.rdrand_retries),
        "xstore" => cpurng::collect_xstore(count, cpu_config.xstore_quality),
        "haveged" => haveged::read_haveged(count),
        "urandom" => {
            use std::io::Read;
            let mut f = std::fs::File::open("/dev/urandom")
                .map_err(|e| Error::NoEntropy(format!("/dev/urandom not available: {}", e)))?;
            let mut buf = vec![0u8; count];
            f.read_exact(&mut buf)?;
            Ok(buf)
        }
        "fallback" => fallback::generate_fallback(count, cpu_config),
        other => Err(Error::InvalidArgs(format!("unknown entropy source: {}", other))),
    }
}

/// Adapts the pull-based entropy generators (which return a `Vec<u8>`
/// per call) to [`gate::Source`], which the gate loop pulls from like
/// any other reader.
struct GeneratorSource<'a> {
    name: &'a str,
    cpu_config: &'a CpuRngConfig,
}

impl gate::Source for GeneratorSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = generate(self.name, buf.len(), self.cpu_config)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}

pub fn run(args: &QaWatchArgs, cpu_config: &CpuRngConfig, qa_config: &QaConfig) -> Result<(), Error> {
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

    log::info!(
        target: "mixrand::qa_watch",
        "started: id={} source={} block_size={}",
        args.id, args.source, args.block_size,
    );

    let mut source = GeneratorSource {
        name: &args.source,
        cpu_config,
    };
    let mut buf = vec![0u8; args.block_size];

    gate::run(&mut source, &monitor, &mut buf, &SHUTDOWN, |_block| Ok(()))?;

    log::info!(target: "mixrand::qa_watch", "shutting down: {}", monitor.report_json());
    Ok(())
}
