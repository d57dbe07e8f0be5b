//! The gated consumer loop: read a block, check it against a
//! [`HealthMonitor`], retry on rejection, hand accepted blocks
//! onward. Grounded in bit-babbler's `SocketSource::do_server_thread`
//! (`socket-source.h`), whose inner loop is literally
//! `do { r = m_pool->read(rbuf, bytes); } while (!qa.Check(rbuf, r));`.
//!
//! Two concrete hosts drive this loop today: a device-characterization
//! runner that discards every accepted block (mirroring
//! `SecretSink`, which never forwards data anywhere), and a UDP
//! responder that sends each accepted block back to its requester
//! (mirroring `SocketSource`). Both are expressed here as a single
//! generic function parameterized over a [`Source`] and an
//! acceptance callback, rather than as a trait object hierarchy, since
//! this crate favors monomorphized free functions over trait
//! objects at its own I/O boundaries (see `entropy::fallback`).

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::qa::monitor::HealthMonitor;

/// A byte source a gate loop pulls from. `read` returns `Ok(0)` to
/// signal a clean end of stream, matching `std::io::Read`'s contract.
pub trait Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<T: io::Read> Source for T {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(self, buf)
    }
}

/// Run the gated read-check-retry-forward loop until `source` reaches
/// end of stream, `shutdown` is set, or `on_accept` returns an error.
///
/// Each outer iteration retries `source.read` until `monitor.check`
/// accepts the block (or the source/shutdown ends the loop early),
/// then calls `on_accept` exactly once with the accepted bytes. A
/// rejected block is discarded entirely: there is no partial credit
/// for a block that failed QA, only a fresh read.
pub fn run<S: Source>(
    source: &mut S,
    monitor: &HealthMonitor,
    buf: &mut [u8],
    shutdown: &AtomicBool,
    mut on_accept: impl FnMut(&[u8]) -> io::Result<()>,
) -> io::Result<()> {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return Ok(());
        }

        let n = loop {
            if shutdown.load(Ordering::Relaxed) {
                return Ok(());
            }

            let n = source.read(buf)?;
            if n == 0 {
                return Ok(());
            }

            if monitor.check(&buf[..n]) {
                break n;
            }

            log::warn!(
                target: "mixrand::qa::gate",
                "{}: rejected {} byte block, retrying",
                monitor.id(), n,
            );
        };

        on_accept(&buf[..n])?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QaConfig;
    use std::sync::Mutex;

    struct VecSource {
        chunks: Vec<Vec<u8>>,
        pos: usize,
    }

    impl Source for VecSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.chunks.len() {
                return Ok(0);
            }
            let chunk = &self.chunks[self.pos];
            self.pos += 1;
            buf[..chunk.len()].copy_from_slice(chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn test_stops_cleanly_at_source_eof() {
        let monitor = HealthMonitor::new("gate-test-eof", true, &QaConfig::default());
        let mut source = VecSource {
            chunks: vec![vec![0xAAu8; 64]],
            pos: 0,
        };
        let mut buf = vec![0u8; 256];
        let shutdown = AtomicBool::new(false);
        let accepted = Mutex::new(Vec::new());

        let result = run(&mut source, &monitor, &mut buf, &shutdown, |block| {
            accepted.lock().unwrap().push(block.to_vec());
            Ok(())
        });

        assert!(result.is_ok());
        // The single chunk was rejected every time (fips_ok starts
        // false and never accumulates enough blocks), so nothing
        // should have reached on_accept before end of stream.
        assert!(accepted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_shutdown_flag_stops_the_outer_loop() {
        let monitor = HealthMonitor::new("gate-test-shutdown", true, &QaConfig::default());
        struct InfiniteSource;
        impl Source for InfiniteSource {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                buf.fill(0);
                Ok(buf.len())
            }
        }
        let mut source = InfiniteSource;
        let mut buf = vec![0u8; 16];
        let shutdown = AtomicBool::new(true);

        let result = run(&mut source, &monitor, &mut buf, &shutdown, |_| Ok(()));
        assert!(result.is_ok());
    }

    #[test]
    fn test_on_accept_error_propagates_once_a_block_is_accepted() {
        use crate::qa::fips::FIPS_BLOCK;
        use rand_chacha::ChaCha20Rng;
        use rand_core::{RngCore, SeedableRng};

        let monitor = HealthMonitor::new("gate-test-propagate", true, &QaConfig::default());
        let mut rng = ChaCha20Rng::seed_from_u64(123);

        // Two consecutive FIPS-passing blocks are needed before the
        // recovery margin (2) flips fips_ok from its cold-start false
        // to true, so supply three: the first two warm up the
        // monitor, the third is the one that should finally be
        // accepted and trigger on_accept's error.
        let blocks: Vec<Vec<u8>> = (0..3)
            .map(|_| {
                let mut b = vec![0u8; FIPS_BLOCK];
                rng.fill_bytes(&mut b);
                b
            })
            .collect();

        let mut source = VecSource { chunks: blocks, pos: 0 };
        let mut buf = vec![0u8; FIPS_BLOCK];
        let shutdown = AtomicBool::new(false);

        let result = run(&mut source, &monitor, &mut buf, &shutdown, |_| {
            Err(io::Error::new(io::ErrorKind::Other, "sink refused the block"))
        });

        assert!(result.is_err());
    }
}
