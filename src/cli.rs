use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::SnapConfig;
use crate::engine::{MemEngine, SnapshotEngine};
use crate::metrics::{self, MetricsSnapshot};
use crate::snapshots::SnapshotManager;
use crate::stats::StatsParser;
use crate::timestamp::Timestamp;
use crate::txn::{TimestampOracle, WriteUnit};

#[derive(Parser, Debug)]
#[command(
    name = "quiversnap",
    version,
    about = "Snapshot registry and commit-order sequencer (simulation and tooling)",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Run concurrent writers against an in-memory engine and verify commit order
    Simulate {
        #[arg(long, default_value_t = 4)]
        threads: usize,
        /// Transactions per thread
        #[arg(long, default_value_t = 200)]
        txns: usize,
        /// Probability that a transaction aborts instead of committing
        #[arg(long, default_value_t = 0.1)]
        abort_ratio: f64,
        /// Max simulated work per transaction, microseconds
        #[arg(long, default_value_t = 50)]
        work_us: u64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long)]
        json: bool,
    },
    /// Parse an engine statistics dump (file or stdin) into JSON
    Stats {
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        pretty: bool,
    },
    /// Print the effective configuration (defaults + QS_* env)
    Config,
}

/// Parameters of a simulation run.
#[derive(Clone, Debug)]
pub struct SimOptions {
    pub threads: usize,
    pub txns: usize,
    pub abort_ratio: f64,
    pub work_us: u64,
    pub seed: u64,
    pub cfg: SnapConfig,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            threads: 4,
            txns: 200,
            abort_ratio: 0.1,
            work_us: 50,
            seed: 42,
            cfg: SnapConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SimReport {
    pub threads: usize,
    pub txns_per_thread: usize,
    pub committed: usize,
    pub aborted: usize,
    /// Commit timestamps were observed in strictly increasing order.
    pub ordered: bool,
    pub committed_snapshot: Option<Timestamp>,
    pub majority_reads: u64,
    pub majority_retries: u64,
    pub snapshots_left: usize,
    pub live_views: usize,
    pub elapsed_ms: u128,
    pub metrics: MetricsSnapshot,
}

/// Concurrent writers + a consistency thread advancing the committed snapshot.
pub fn simulate(opts: &SimOptions) -> Result<SimReport> {
    if !(0.0..=1.0).contains(&opts.abort_ratio) {
        return Err(anyhow!("abort_ratio must be within [0, 1], got {}", opts.abort_ratio));
    }

    let mem = Arc::new(MemEngine::new());
    let engine: Arc<dyn SnapshotEngine> = mem.clone();
    let mgr = Arc::new(SnapshotManager::new(engine, opts.cfg.clone()));
    let oracle = Arc::new(TimestampOracle::default());
    let order: Arc<Mutex<Vec<Timestamp>>> = Arc::new(Mutex::new(Vec::new()));
    let done = Arc::new(AtomicBool::new(false));

    let started = Instant::now();
    info!(
        "simulate: threads={} txns={} abort_ratio={} seed={}",
        opts.threads, opts.txns, opts.abort_ratio, opts.seed
    );

    // Consistency side: follow the newest commit, read through it, clean up.
    let majority = {
        let (mgr, order, done) = (mgr.clone(), order.clone(), done.clone());
        thread::spawn(move || -> Result<(u64, u64)> {
            let (mut reads, mut retries) = (0u64, 0u64);
            loop {
                let finished = done.load(Ordering::Acquire);
                let last = order.lock().unwrap().last().copied();
                if let Some(ts) = last {
                    mgr.set_committed_snapshot(ts);
                    mgr.cleanup_unneeded_snapshots();
                }
                match mgr.get_committed_snapshot() {
                    Ok(snap) => {
                        snap.get(b"last").context("majority read")?;
                        reads += 1;
                    }
                    Err(e) if e.is_retryable() => retries += 1,
                    Err(e) => return Err(e.into()),
                }
                if finished {
                    return Ok((reads, retries));
                }
                thread::sleep(Duration::from_micros(200));
            }
        })
    };

    let mut writers = Vec::with_capacity(opts.threads);
    for t in 0..opts.threads {
        let (mgr, oracle, order, mem) = (mgr.clone(), oracle.clone(), order.clone(), mem.clone());
        let opts = opts.clone();
        writers.push(thread::spawn(move || -> Result<(usize, usize)> {
            let mut rng = StdRng::seed_from_u64(opts.seed ^ (t as u64).wrapping_mul(0x9E37_79B9));
            let (mut committed, mut aborted) = (0usize, 0usize);
            for i in 0..opts.txns {
                let unit = WriteUnit::new((t * opts.txns + i + 1) as u64);
                oracle.reserve(&mgr, &unit)?;

                if opts.work_us > 0 {
                    thread::sleep(Duration::from_micros(rng.gen_range(0..=opts.work_us)));
                }
                if rng.gen_bool(opts.abort_ratio) {
                    unit.abort(&mgr);
                    aborted += 1;
                    continue;
                }
                let res = unit.commit(&mgr, |ts| {
                    let bytes = ts.as_u64().to_be_bytes();
                    mem.put(format!("t{t}").as_bytes(), &bytes);
                    mem.put(b"last", &bytes);
                    order.lock().unwrap().push(ts);
                    Ok(())
                });
                match res {
                    Ok(()) => committed += 1,
                    // commit already aborted the unit, the queue moves on
                    Err(e) => {
                        warn!("simulate: {:#}", e);
                        aborted += 1;
                    }
                }
            }
            debug!("simulate: writer {} done ({} committed, {} aborted)", t, committed, aborted);
            Ok((committed, aborted))
        }));
    }

    let (mut committed, mut aborted) = (0usize, 0usize);
    let mut first_err: Option<anyhow::Error> = None;
    for w in writers {
        match w.join() {
            Ok(Ok((c, a))) => {
                committed += c;
                aborted += a;
            }
            Ok(Err(e)) => {
                first_err.get_or_insert(e);
            }
            Err(_) => {
                first_err.get_or_insert(anyhow!("writer thread panicked"));
            }
        }
    }
    done.store(true, Ordering::Release);
    let (majority_reads, majority_retries) = majority
        .join()
        .map_err(|_| anyhow!("majority thread panicked"))??;
    if let Some(e) = first_err {
        return Err(e);
    }

    let order = order.lock().unwrap().clone();
    let ordered = order.windows(2).all(|w| w[0] < w[1]);
    let status = mgr.status();

    Ok(SimReport {
        threads: opts.threads,
        txns_per_thread: opts.txns,
        committed,
        aborted,
        ordered,
        committed_snapshot: status.committed,
        majority_reads,
        majority_retries,
        snapshots_left: status.snapshots.len(),
        live_views: mem.live_views(),
        elapsed_ms: started.elapsed().as_millis(),
        metrics: metrics::snapshot(),
    })
}

fn cmd_simulate(opts: SimOptions, json: bool) -> Result<()> {
    let report = simulate(&opts)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("threads:            {}", report.threads);
        println!("txns/thread:        {}", report.txns_per_thread);
        println!("committed:          {}", report.committed);
        println!("aborted:            {}", report.aborted);
        println!("ordered:            {}", report.ordered);
        println!(
            "committed snapshot: {}",
            report
                .committed_snapshot
                .map(|t| t.to_string())
                .unwrap_or_else(|| "(none)".to_string())
        );
        println!(
            "majority reads:     {} ({} retries)",
            report.majority_reads, report.majority_retries
        );
        println!("snapshots left:     {}", report.snapshots_left);
        println!("live views:         {}", report.live_views);
        println!("head wakeups:       {}", report.metrics.head_wakeups);
        println!("elapsed:            {} ms", report.elapsed_ms);
    }
    if !report.ordered {
        return Err(anyhow!("commit order violated"));
    }
    Ok(())
}

fn cmd_stats(file: Option<PathBuf>, pretty: bool) -> Result<()> {
    let text = match file {
        Some(p) => std::fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?,
        None => {
            let mut s = String::new();
            std::io::stdin().read_to_string(&mut s).context("read stdin")?;
            s
        }
    };
    let doc = StatsParser::parse_str(&text);
    if pretty {
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        println!("{}", serde_json::to_string(&doc)?);
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Simulate {
            threads,
            txns,
            abort_ratio,
            work_us,
            seed,
            json,
        } => {
            let opts = SimOptions {
                threads,
                txns,
                abort_ratio,
                work_us,
                seed,
                cfg: SnapConfig::from_env(),
            };
            cmd_simulate(opts, json)
        }
        Cmd::Stats { file, pretty } => cmd_stats(file, pretty),
        Cmd::Config => {
            println!("{}", SnapConfig::from_env());
            Ok(())
        }
    }
}
