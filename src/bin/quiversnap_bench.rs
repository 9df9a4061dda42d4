use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use QuiverSnap::engine::{MemEngine, SnapshotEngine};
use QuiverSnap::metrics::{self, MetricsSnapshot};
use QuiverSnap::{SnapConfig, SnapshotManager, TimestampOracle, WriteUnit};

/// Простой детерминированный PRNG (SplitMix64).
/// Нужен только для разброса "работы" между reserve и commit.
#[derive(Clone)]
struct Rng64 {
    state: u64,
}
impl Rng64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }
    #[inline]
    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

/// QuiverSnap commit-sequencer micro-bench
///
/// Примеры:
///   quiversnap_bench --threads 1,2,4,8 --n 20000
///   quiversnap_bench --threads 8 --spin 200 --snapshot-every 100 --json
#[derive(Parser, Debug)]
#[command(name = "quiversnap_bench", version, about = "QuiverSnap commit-order micro-bench")]
struct Opt {
    /// Comma separated writer thread counts, one phase per value
    #[arg(long, value_delimiter = ',', default_value = "1,2,4,8")]
    threads: Vec<usize>,

    /// Transactions per phase (split across threads)
    #[arg(long, default_value_t = 20_000)]
    n: usize,

    /// Max busy-spin iterations between reserve and commit
    #[arg(long, default_value_t = 0)]
    spin: u64,

    /// Advance the committed snapshot and clean up every N commits (0 = off)
    #[arg(long, default_value_t = 0)]
    snapshot_every: usize,

    /// Random seed
    #[arg(long, default_value_t = 0xA1B2_C3D4_E5F6_7788)]
    seed: u64,

    /// JSON output
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
struct PhaseStats {
    name: String,
    threads: usize,
    ops: u64,
    elapsed_sec: f64,
    tput_ops: f64,
    p50_ms: f64,
    p90_ms: f64,
    p99_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
struct BenchReport {
    phases: Vec<PhaseStats>,
    metrics: MetricsSnapshot,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("bench error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let opt = Opt::parse();
    if opt.threads.iter().any(|&t| t == 0) {
        return Err(anyhow!("--threads values must be > 0"));
    }

    // Сброс метрик перед запуском: отчёт только про текущий прогон.
    metrics::reset();

    let mut phases = Vec::with_capacity(opt.threads.len());
    for &t in &opt.threads {
        if !opt.json {
            println!("==> Phase: commit x{} ({} txns)", t, opt.n);
        }
        let p = phase_commit(&opt, t)?;
        if !opt.json {
            print_phase_summary(&p);
        }
        phases.push(p);
    }

    let report = BenchReport {
        phases,
        metrics: metrics::snapshot(),
    };
    if opt.json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_report_human(&report);
    }
    Ok(())
}

fn phase_commit(opt: &Opt, threads: usize) -> Result<PhaseStats> {
    let mem = Arc::new(MemEngine::new());
    let engine: Arc<dyn SnapshotEngine> = mem.clone();
    let mgr = Arc::new(SnapshotManager::new(engine, SnapConfig::default()));
    let oracle = Arc::new(TimestampOracle::default());

    let per_thread = opt.n / threads;
    let start = Instant::now();

    let mut handles = Vec::with_capacity(threads);
    for t in 0..threads {
        let (mgr, oracle, mem) = (mgr.clone(), oracle.clone(), mem.clone());
        let (spin, every, seed) = (opt.spin, opt.snapshot_every, opt.seed);
        handles.push(thread::spawn(move || -> Result<Vec<Duration>> {
            let mut rng = Rng64::new(seed ^ t as u64);
            let mut lat = Vec::with_capacity(per_thread);
            for i in 0..per_thread {
                let t0 = Instant::now();
                let unit = WriteUnit::new((t * per_thread + i + 1) as u64);
                oracle.reserve(&mgr, &unit)?;
                if spin > 0 {
                    for _ in 0..(rng.next_u64() % spin) {
                        std::hint::spin_loop();
                    }
                }
                let ts = unit.commit(&mgr, |ts| {
                    mem.put(b"k", &ts.as_u64().to_be_bytes());
                    Ok(ts)
                })?;
                // Committed snapshot must not regress: only writer 0 advances it.
                if every > 0 && t == 0 && i % every == 0 {
                    mgr.set_committed_snapshot(ts);
                    mgr.cleanup_unneeded_snapshots();
                }
                lat.push(t0.elapsed());
            }
            Ok(lat)
        }));
    }

    let mut lat: Vec<Duration> = Vec::with_capacity(per_thread * threads);
    for h in handles {
        let part = h.join().map_err(|_| anyhow!("bench writer panicked"))??;
        lat.extend(part);
    }
    let elapsed = start.elapsed();
    Ok(stats(&format!("commit_x{}", threads), threads, elapsed, &mut lat))
}

// ---------- helpers ----------

fn print_phase_summary(p: &PhaseStats) {
    println!(
        "    {:>12} done: ops={} elapsed={:.3}s, tput={:.0} ops/s, p50={:.3}ms p90={:.3}ms p99={:.3}ms",
        p.name, p.ops, p.elapsed_sec, p.tput_ops, p.p50_ms, p.p90_ms, p.p99_ms
    );
}

fn stats(name: &str, threads: usize, elapsed: Duration, lat: &mut [Duration]) -> PhaseStats {
    lat.sort_unstable();
    let to_ms = |d: Duration| d.as_secs_f64() * 1000.0;
    let p = |q: f64| -> f64 {
        if lat.is_empty() {
            return 0.0;
        }
        let idx = ((lat.len() as f64 - 1.0) * q).round() as usize;
        to_ms(lat[idx])
    };
    let ops = lat.len() as u64;
    let secs = elapsed.as_secs_f64();
    PhaseStats {
        name: name.to_string(),
        threads,
        ops,
        elapsed_sec: secs,
        tput_ops: if secs > 0.0 { ops as f64 / secs } else { 0.0 },
        p50_ms: p(0.50),
        p90_ms: p(0.90),
        p99_ms: p(0.99),
    }
}

fn print_report_human(r: &BenchReport) {
    println!("QuiverSnap bench report:");
    for p in &r.phases {
        println!(
            "  {:>12}: ops={} elapsed={:.3}s tput={:.0} ops/s p50={:.3}ms p90={:.3}ms p99={:.3}ms",
            p.name, p.ops, p.elapsed_sec, p.tput_ops, p.p50_ms, p.p90_ms, p.p99_ms
        );
    }
    let m = &r.metrics;
    println!("Metrics snapshot:");
    println!("  commits_registered   = {}", m.commits_registered);
    println!("  commits_admitted     = {}", m.commits_admitted);
    println!("  head_wakeups         = {}", m.head_wakeups);
    println!("  snapshots_captured   = {}", m.snapshots_captured);
    println!("  snapshots_dropped    = {}", m.snapshots_dropped);
    println!("  cleanup_runs         = {}", m.cleanup_runs);
}
