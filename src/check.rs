use std::fs::File;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::cli::CheckArgs;
use crate::config::{CpuRngConfig, QaConfig};
use crate::entropy::{cpurng, fallback, haveged, hwrng};
use crate::error::Error;
use crate::qa::monitor::HealthMonitor;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Hwrng,
    Rdseed,
    Rdrand,
    Xstore,
    Haveged,
    Urandom,
    Fallback,
}

impl SourceKind {
    fn name(&self) -> &'static str {
        match self {
            SourceKind::Hwrng => "hwrng",
            SourceKind::Rdseed => "rdseed",
            SourceKind::Rdrand => "rdrand",
            SourceKind::Xstore => "xstore",
            SourceKind::Haveged => "haveged",
            SourceKind::Urandom => "urandom",
            SourceKind::Fallback => "fallback",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            SourceKind::Hwrng => "Hardware RNG (/dev/hwrng)",
            SourceKind::Rdseed => "CPU RDSEED instruction",
            SourceKind::Rdrand => "CPU RDRAND instruction",
            SourceKind::Xstore => "VIA PadLock XSTORE instruction",
            SourceKind::Haveged => "haveged (/dev/random)",
            SourceKind::Urandom => "/dev/urandom",
            SourceKind::Fallback => "Fallback (urandom + procfs + jitter + cpu-rng)",
        }
    }
}

struct SourceStats {
    monitor: std::sync::Arc<HealthMonitor>,
    total_samples: u64,
    total_bytes: u64,
    total_time: Duration,
    overall_pass: u64,
    errors: u64,
}

impl SourceStats {
    fn new(monitor: std::sync::Arc<HealthMonitor>) -> Self {
        Self {
            monitor,
            total_samples: 0,
            total_bytes: 0,
            total_time: Duration::ZERO,
            overall_pass: 0,
            errors: 0,
        }
    }

    fn pass_pct(&self) -> f64 {
        if self.total_samples == 0 {
            return 0.0;
        }
        100.0 * self.overall_pass as f64 / self.total_samples as f64
    }

    fn throughput_bytes_per_sec(&self) -> f64 {
        let secs = self.total_time.as_secs_f64();
        if secs < f64::EPSILON {
            return 0.0;
        }
        self.total_bytes as f64 / secs
    }
}

fn collect_sample(
    source: &SourceKind,
    count: usize,
    config: &CpuRngConfig,
) -> Result<Vec<u8>, Error> {
    match source {
        SourceKind::Hwrng => hwrng::read_hwrng(count),
        SourceKind::Rdseed => cpurng::collect_rdseed(count, config.rdseed_retries),
        SourceKind::Rdrand => cpurng::collect_rdrand(count, config.rdrand_retries),
        SourceKind::Xstore => cpurng::collect_xstore(count, config.xstore_quality),
        SourceKind::Haveged => haveged::read_haveged(count),
        SourceKind::Urandom => read_urandom(count),
        SourceKind::Fallback => fallback::generate_fallback(count, config),
    }
}

fn read_urandom(count: usize) -> Result<Vec<u8>, Error> {
    let mut f = File::open("/dev/urandom")
        .map_err(|e| Error::NoEntropy(format!("/dev/urandom not available: {}", e)))?;
    let mut buf = vec![0u8; count];
    f.read_exact(&mut buf)?;
    Ok(buf)
}

fn parse_duration(s: &str) -> Result<Duration, Error> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidArgs("empty duration".into()));
    }

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix('s') {
        (n, 1u64)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3600)
    } else if let Some(n) = s.strip_suffix('d') {
        (n, 86400)
    } else {
        (s, 60) // bare number = minutes
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| Error::InvalidArgs(format!("invalid duration: {}", s)))?;

    if num == 0 {
        return Err(Error::InvalidArgs("duration must be > 0".into()));
    }

    Ok(Duration::from_secs(num * multiplier))
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        let m = secs / 60;
        let s = secs % 60;
        if s == 0 {
            format!("{}m", m)
        } else {
            format!("{}m {}s", m, s)
        }
    } else {
        let h = secs / 3600;
        let m = (secs % 3600) / 60;
        if m == 0 {
            format!("{}h", h)
        } else {
            format!("{}h {}m", h, m)
        }
    }
}

fn format_throughput(bytes_per_sec: f64) -> String {
    if bytes_per_sec >= 1_000_000.0 {
        format!("{:.2} MB/s", bytes_per_sec / 1_000_000.0)
    } else if bytes_per_sec >= 1_000.0 {
        format!("{:.2} KB/s", bytes_per_sec / 1_000.0)
    } else {
        format!("{:.0} B/s", bytes_per_sec)
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_000_000 {
        format!("{:.2} MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.2} KB", bytes as f64 / 1_000.0)
    } else {
        format!("{} B", bytes)
    }
}

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

fn probe_sources(cpu_config: &CpuRngConfig) -> Vec<SourceKind> {
    let candidates = [
        SourceKind::Hwrng,
        SourceKind::Rdseed,
        SourceKind::Rdrand,
        SourceKind::Xstore,
        SourceKind::Haveged,
        SourceKind::Urandom,
        SourceKind::Fallback,
    ];

    let mut available = Vec::new();

    for &kind in &candidates {
        eprint!("  {:10} ... ", kind.name());
        match collect_sample(&kind, 32, cpu_config) {
            Ok(_) => {
                eprintln!("[ok]");
                available.push(kind);
            }
            Err(e) => {
                eprintln!("[skip] {}", e);
            }
        }
    }

    available
}

fn print_progress(stats_vec: &[(SourceKind, SourceStats)], elapsed: Duration, total: Duration) {
    let pct = 100.0 * elapsed.as_secs_f64() / total.as_secs_f64();
    let mut stderr = std::io::stderr().lock();

    writeln!(
        stderr,
        "--- Progress ({} / {}, {:.1}%) ---",
        format_duration(elapsed),
        format_duration(total),
        pct
    )
    .ok();

    writeln!(
        stderr,
        "{:<12} {:>8} {:>10} {:>8} {:>12} {:>7}",
        "Source", "Samples", "QA Pass%", "Ent8 H", "Throughput", "Errors"
    )
    .ok();

    for (kind, stat) in stats_vec {
        let throughput = format_throughput(stat.throughput_bytes_per_sec());
        let snapshot = stat.monitor.snapshot();
        let ent8_h = snapshot
            .ent8_last
            .map(|s| format!("{:.3}", s.entropy_bits_per_symbol))
            .unwrap_or_else(|| "-".to_string());

        writeln!(
            stderr,
            "{:<12} {:>8} {:>9.1}% {:>8} {:>12} {:>7}",
            kind.name(),
            stat.total_samples,
            stat.pass_pct(),
            ent8_h,
            throughput,
            stat.errors
        )
        .ok();
    }
    writeln!(stderr).ok();
}

fn print_final_report(stats_vec: &[(SourceKind, SourceStats)]) {
    for (kind, stat) in stats_vec {
        println!("--- {} ({}) ---", kind.name(), kind.description());
        println!(
            "  Samples: {} | Bytes: {} | Throughput: {} | Errors: {}",
            stat.total_samples,
            format_bytes(stat.total_bytes),
            format_throughput(stat.throughput_bytes_per_sec()),
            stat.errors
        );

        let snapshot = stat.monitor.snapshot();
        println!(
            "  QA Gate:     Overall {:.1}% ({} / {} bytes passed)",
            stat.pass_pct(),
            snapshot.bytes_passed,
            snapshot.bytes_analysed,
        );

        if snapshot.fips_blocks_analysed > 0 {
            let last = snapshot.fips_last.unwrap();
            println!(
                "  FIPS 140-2:  {}/{} blocks passed  (last: monobit={} poker={} runs={} longrun={})",
                snapshot.fips_blocks_passed,
                snapshot.fips_blocks_analysed,
                last.monobit_pass,
                last.poker_pass,
                last.runs_pass,
                last.longrun_pass,
            );
        } else {
            println!("  FIPS 140-2:  no complete 2500-byte block analysed yet");
        }

        if let Some(ent8) = snapshot.ent8_last {
            println!(
                "  Ent8:        entropy={:.3} bits/sym  chi_p={:.3}  mean={:.2}  pi={:.4}  serial_corr={:.4}",
                ent8.entropy_bits_per_symbol, ent8.chi_probability, ent8.arithmetic_mean,
                ent8.monte_carlo_pi, ent8.serial_correlation,
            );
        } else {
            println!("  Ent8:        window not yet complete");
        }

        if let Some(ent16) = snapshot.ent16_last {
            println!(
                "  Ent16:       entropy={:.3} bits/sym  chi_p={:.3}  mean={:.2}  pi={:.4}  serial_corr={:.4}",
                ent16.entropy_bits_per_symbol, ent16.chi_probability, ent16.arithmetic_mean,
                ent16.monte_carlo_pi, ent16.serial_correlation,
            );
        } else {
            println!("  Ent16:       window not yet complete");
        }

        println!();
    }

    if stats_vec.len() > 1 {
        println!("--- Comparison ---");
        println!(
            "{:<12} {:>12} {:>10}",
            "Source", "Throughput", "QA Pass%"
        );
        for (kind, stat) in stats_vec {
            println!(
                "{:<12} {:>12} {:>9.1}%",
                kind.name(),
                format_throughput(stat.throughput_bytes_per_sec()),
                stat.pass_pct(),
            );
        }
        println!();

        let best_throughput = stats_vec
            .iter()
            .filter(|(_, s)| s.total_samples > 0)
            .max_by(|a, b| {
                a.1.throughput_bytes_per_sec()
                    .partial_cmp(&b.1.throughput_bytes_per_sec())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        println!("Verdict:");
        if let Some((kind, stat)) = best_throughput {
            println!(
                "  Highest throughput:   {} ({})",
                kind.name(),
                format_throughput(stat.throughput_bytes_per_sec())
            );
        }
    }
}

pub fn run(args: &CheckArgs, cpu_config: &CpuRngConfig, qa_config: &QaConfig) -> Result<(), Error> {
    let duration = parse_duration(&args.duration)?;

    if args.sample_size < crate::qa::fips::FIPS_BLOCK {
        eprintln!(
            "Warning: sample_size {} < {} bytes; FIPS blocks will take longer to assemble via the carry buffer",
            args.sample_size,
            crate::qa::fips::FIPS_BLOCK,
        );
    }

    install_signal_handlers();

    eprintln!("Probing entropy sources...");
    let sources = probe_sources(cpu_config);

    let sources: Vec<SourceKind> = if let Some(ref names) = args.sources {
        sources
            .into_iter()
            .filter(|s| names.iter().any(|n| n.eq_ignore_ascii_case(s.name())))
            .collect()
    } else {
        sources
    };

    if sources.is_empty() {
        return Err(Error::NoEntropy("no entropy sources available".into()));
    }

    let source_list: Vec<&str> = sources.iter().map(|s| s.name()).collect();
    eprintln!(
        "\nStatistical check: sources=[{}], duration={}, sample_size={} bytes",
        source_list.join(", "),
        format_duration(duration),
        args.sample_size
    );
    eprintln!();

    let mut stats_vec: Vec<(SourceKind, SourceStats)> = Vec::with_capacity(sources.len());
    for &s in &sources {
        let monitor = HealthMonitor::new(format!("check:{}", s.name()), qa_config.assume_ent8_ok, qa_config);
        stats_vec.push((s, SourceStats::new(monitor)));
    }

    let start = Instant::now();
    let deadline = start + duration;
    let mut last_report = start;

    'outer: loop {
        for i in 0..sources.len() {
            if SHUTDOWN.load(Ordering::Relaxed) || Instant::now() >= deadline {
                break 'outer;
            }

            let source = &sources[i];
            let sample_start = Instant::now();

            match collect_sample(source, args.sample_size, cpu_config) {
                Ok(data) => {
                    let elapsed = sample_start.elapsed();
                    let stat = &mut stats_vec[i].1;
                    stat.total_samples += 1;
                    stat.total_bytes += data.len() as u64;
                    stat.total_time += elapsed;

                    if stat.monitor.check(&data) {
                        stat.overall_pass += 1;
                    }
                }
                Err(_) => {
                    stats_vec[i].1.errors += 1;
                }
            }

            if last_report.elapsed().as_secs() >= args.report_interval {
                print_progress(&stats_vec, start.elapsed(), duration);
                last_report = Instant::now();
            }
        }
    }

    let total_elapsed = start.elapsed();

    if SHUTDOWN.load(Ordering::Relaxed) {
        eprintln!(
            "\nInterrupted after {} -- printing partial results\n",
            format_duration(total_elapsed)
        );
    } else {
        eprintln!("\nCompleted {} check\n", format_duration(total_elapsed));
    }

    print_final_report(&stats_vec);

    Ok(())
}
