//! StatsParser: построчный разбор текстового дампа статистики движка.
//!
//! Состояния (ParserState) проходятся строго по порядку:
//!   CompactionHeader -> CompactionSeparator -> CompactionLevels -> Flush -> Stalls
//!   -> DbHeader -> Uptime -> CumulativeWrites -> CumulativeWal -> CumulativeCompaction
//!   -> CumulativeStall -> IntervalWrites -> IntervalWal -> IntervalCompaction
//!   -> IntervalStall -> Done
//!
//! Notes:
//! - header/separator states skip lines until they match;
//! - every other state requires its line; a mismatch records "error": <line>
//!   in the current section and parks the parser in Done;
//! - "Cumulative/Interval compaction" lines sit in the DB section of the dump but
//!   are stored under compaction-stats;
//! - counts with K/M/G suffixes are kept as strings.

use regex::{Captures, Regex};
use serde_json::{json, Map, Value};
use std::sync::OnceLock;

const COMPACTION_HEADER: &[&str] = &[
    "Level", "Files", "Size(MB)", "Score", "Read(GB)", "Rn(GB)", "Rnp1(GB)", "Write(GB)",
    "Wnew(GB)", "Moved(GB)", "W-Amp", "Rd(MB/s)", "Wr(MB/s)", "Comp(sec)", "Comp(cnt)",
    "Avg(sec)", "KeyIn", "KeyDrop",
];
const DB_STATS_HEADER: &str = "** DB Stats **";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParserState {
    CompactionHeader,
    CompactionSeparator,
    CompactionLevels,
    Flush,
    Stalls,
    DbHeader,
    Uptime,
    CumulativeWrites,
    CumulativeWal,
    CumulativeCompaction,
    CumulativeStall,
    IntervalWrites,
    IntervalWal,
    IntervalCompaction,
    IntervalStall,
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    Compaction,
    Db,
}

struct Patterns {
    level: Regex,
    flush: Regex,
    stalls: Regex,
    uptime: Regex,
    writes: Regex,
    wal: Regex,
    compaction: Regex,
    stall: Regex,
}

fn patterns() -> &'static Patterns {
    static P: OnceLock<Patterns> = OnceLock::new();
    P.get_or_init(|| {
        let re = |s: &str| Regex::new(s).expect("stats parser pattern");
        Patterns {
            level: re(concat!(
                r"^\s*(\w+)\s+(\d+)/(\d+)\s+(\d+\.\d+)\s+(\d+\.\d+)",
                r"\s+(\d+\.\d+)\s+(\d+\.\d+)\s+(\d+\.\d+)\s+(\d+\.\d+)",
                r"\s+(\d+\.\d+)\s+(\d+\.\d+)\s+(\d+\.\d+)\s+(\d+\.\d+)",
                r"\s+(\d+\.\d+)\s+(\d+)\s+(\d+)\s+(\d+\.\d+)",
                r"\s+(\d+[KMG]?)\s+(\d+[KMG]?)\s*$",
            )),
            flush: re(r"^Flush\(GB\): cumulative (\d+\.\d+), interval (\d+\.\d+)$"),
            stalls: re(concat!(
                r"^Stalls\(count\): ",
                r"(\d+) level0_slowdown, (\d+) level0_slowdown_with_compaction, ",
                r"(\d+) level0_numfiles, (\d+) level0_numfiles_with_compaction, ",
                r"(\d+) stop for pending_compaction_bytes, (\d+) slowdown for pending_compaction_bytes, ",
                r"(\d+) memtable_compaction, (\d+) memtable_slowdown, interval (\d+) total count$",
            )),
            uptime: re(r"^Uptime\(secs\): (\d+\.\d+) total, (\d+\.\d+) interval$"),
            writes: re(concat!(
                r"^(Cumulative|Interval) writes: ",
                r"(\d+[KMG]?) writes, (\d+[KMG]?) keys, (\d+[KMG]?) batches, ",
                r"(\d+\.\d+) writes per batch, ingest: (\d+\.\d+) (GB|MB), (\d+\.\d+) MB/s$",
            )),
            wal: re(concat!(
                r"^(Cumulative|Interval) WAL: ",
                r"(\d+[KMG]?) writes, (\d+[KMG]?) syncs, ",
                r"(\d+\.\d+) writes per sync, written: (\d+\.\d+) (GB|MB), (\d+\.\d+) MB/s$",
            )),
            compaction: re(concat!(
                r"^(Cumulative|Interval) compaction: ",
                r"(\d+\.\d+) GB write, (\d+\.\d+) MB/s write, ",
                r"(\d+\.\d+) GB read, (\d+\.\d+) MB/s read, (\d+\.\d+) seconds$",
            )),
            stall: re(r"^(Cumulative|Interval) stall: (\d+):(\d+):(\d+\.\d+) H:M:S, (\d+\.\d+) percent$"),
        }
    })
}

fn float(c: &Captures, i: usize) -> Option<Value> {
    c.get(i)?.as_str().parse::<f64>().ok().map(Value::from)
}

fn int(c: &Captures, i: usize) -> Option<Value> {
    c.get(i)?.as_str().parse::<i64>().ok().map(Value::from)
}

fn text(c: &Captures, i: usize) -> Option<Value> {
    Some(Value::from(c.get(i)?.as_str()))
}

fn hms_seconds(c: &Captures, first: usize) -> Option<f64> {
    let h = c.get(first)?.as_str().parse::<u64>().ok()?;
    let m = c.get(first + 1)?.as_str().parse::<u64>().ok()?;
    let s = c.get(first + 2)?.as_str().parse::<f64>().ok()?;
    Some(3600.0 * h as f64 + 60.0 * m as f64 + s)
}

/// Cumulative sizes are reported in GB, interval sizes in MB.
fn size_unit(kind: &str) -> &'static str {
    if kind == "Cumulative" {
        "GB"
    } else {
        "MB"
    }
}

/// Line-driven stats parser. Feed lines with `parse_line`, collect with `finish`.
pub struct StatsParser {
    state: ParserState,
    section: Section,
    compaction: Map<String, Value>,
    db: Map<String, Value>,
    levels: Option<Map<String, Value>>,
}

impl Default for StatsParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::CompactionHeader,
            section: Section::Compaction,
            compaction: Map::new(),
            db: Map::new(),
            levels: None,
        }
    }

    /// Parse a whole dump.
    pub fn parse_str(text: &str) -> Value {
        let mut p = Self::new();
        for line in text.lines() {
            p.parse_line(line);
        }
        p.finish()
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn parse_line(&mut self, line: &str) {
        let line = line.trim_end_matches('\r');
        self.state = self.step(line);
    }

    /// Resulting document: {"compaction-stats": {...}, "db-stats": {...}}.
    pub fn finish(mut self) -> Value {
        self.close_levels();
        json!({
            "compaction-stats": Value::Object(self.compaction),
            "db-stats": Value::Object(self.db),
        })
    }

    fn current(&mut self) -> &mut Map<String, Value> {
        match self.section {
            Section::Compaction => &mut self.compaction,
            Section::Db => &mut self.db,
        }
    }

    fn close_levels(&mut self) {
        if let Some(levels) = self.levels.take() {
            self.compaction.insert("level-stats".into(), Value::Object(levels));
        }
    }

    fn error(&mut self, line: &str) -> ParserState {
        self.close_levels();
        self.current().insert("error".into(), Value::from(line));
        ParserState::Done
    }

    /// Transition function: consume `line` in the current state, return the next state.
    fn step(&mut self, line: &str) -> ParserState {
        use ParserState::*;
        let next = match self.state {
            CompactionHeader => {
                let tokens: Vec<&str> = line.split_whitespace().collect();
                if tokens == COMPACTION_HEADER {
                    self.section = Section::Compaction;
                    Some(CompactionSeparator)
                } else {
                    Some(CompactionHeader)
                }
            }
            CompactionSeparator => {
                if !line.is_empty() && line.chars().all(|c| c == '-') {
                    Some(CompactionLevels)
                } else {
                    Some(CompactionSeparator)
                }
            }
            CompactionLevels => self.level_row(line),
            Flush => self.flush(line),
            Stalls => self.stalls(line),
            DbHeader => {
                if line.trim() == DB_STATS_HEADER {
                    self.section = Section::Db;
                    Some(Uptime)
                } else {
                    Some(DbHeader)
                }
            }
            Uptime => self.uptime(line),
            CumulativeWrites => self.writes(line, "Cumulative").map(|_| CumulativeWal),
            CumulativeWal => self.wal(line, "Cumulative").map(|_| CumulativeCompaction),
            CumulativeCompaction => self.compaction(line, "Cumulative").map(|_| CumulativeStall),
            CumulativeStall => self.stall(line, "Cumulative").map(|_| IntervalWrites),
            IntervalWrites => self.writes(line, "Interval").map(|_| IntervalWal),
            IntervalWal => self.wal(line, "Interval").map(|_| IntervalCompaction),
            IntervalCompaction => self.compaction(line, "Interval").map(|_| IntervalStall),
            // per-level latency histograms may follow; they are not parsed
            IntervalStall => self.stall(line, "Interval").map(|_| Done),
            Done => Some(Done),
        };
        match next {
            Some(s) => s,
            None => self.error(line),
        }
    }

    fn level_row(&mut self, line: &str) -> Option<ParserState> {
        // the table exists once the separator matched, even if no row parses
        self.levels.get_or_insert_with(Map::new);
        let c = patterns().level.captures(line)?;
        let mut lob = Map::new();
        let fields: [(&str, fn(&Captures, usize) -> Option<Value>); 18] = [
            ("num-files", int),
            ("being-compacted", int),
            ("total-file-size-MB", float),
            ("score", float),
            ("bytes-read-GB", float),
            ("bytes-read-non-output-levels-GB", float),
            ("bytes-read-output-levels-GB", float),
            ("bytes-written-GB", float),
            ("bytes-new-GB", float),
            ("bytes-moved-GB", float),
            ("w-amp", float),
            ("bytes-read-MB-s", float),
            ("bytes-written-MB-s", float),
            ("compactions-sec", float),
            ("compactions-cnt", int),
            ("compaction-avg-len-sec", float),
            ("num-input-records", text),
            ("num-dropped-records", text),
        ];
        for (i, (name, conv)) in fields.iter().enumerate() {
            lob.insert((*name).to_string(), conv(&c, i + 2)?);
        }
        let level = c.get(1)?.as_str().to_string();
        self.levels
            .get_or_insert_with(Map::new)
            .insert(level.clone(), Value::Object(lob));

        if level == "Int" {
            self.close_levels();
            Some(ParserState::Flush)
        } else {
            Some(ParserState::CompactionLevels)
        }
    }

    fn flush(&mut self, line: &str) -> Option<ParserState> {
        let c = patterns().flush.captures(line)?;
        let (cumulative, interval) = (float(&c, 1)?, float(&c, 2)?);
        let sec = self.current();
        sec.insert("flush-cumulative-GB".into(), cumulative);
        sec.insert("flush-interval-GB".into(), interval);
        Some(ParserState::Stalls)
    }

    fn stalls(&mut self, line: &str) -> Option<ParserState> {
        let c = patterns().stalls.captures(line)?;
        let names = [
            "stalls-level0-slowdown",
            "stalls-level0-slowdown-with-compaction",
            "stalls-level0-numfiles",
            "stalls-level0-numfiles-with-compaction",
            "stalls-stop-for-pending-compaction-bytes",
            "stalls-slowdown-for-pending-compaction-bytes",
            "stalls-memtable-compaction",
            "stalls-memtable-slowdown",
            "stalls-interval-total-count",
        ];
        let mut vals = Vec::with_capacity(names.len());
        for i in 0..names.len() {
            vals.push(int(&c, i + 1)?);
        }
        let sec = self.current();
        for (name, v) in names.iter().zip(vals) {
            sec.insert((*name).to_string(), v);
        }
        Some(ParserState::DbHeader)
    }

    fn uptime(&mut self, line: &str) -> Option<ParserState> {
        let c = patterns().uptime.captures(line)?;
        let (total, interval) = (float(&c, 1)?, float(&c, 2)?);
        let sec = self.current();
        sec.insert("uptime-total-sec".into(), total);
        sec.insert("uptime-interval-sec".into(), interval);
        Some(ParserState::CumulativeWrites)
    }

    fn writes(&mut self, line: &str, kind: &str) -> Option<()> {
        let c = patterns().writes.captures(line)?;
        if &c[1] != kind {
            return None;
        }
        let unit = c.get(7)?.as_str();
        if unit != size_unit(kind) {
            return None;
        }
        let p = kind.to_ascii_lowercase();
        let entries = [
            (format!("{p}-writes-cnt"), text(&c, 2)?),
            (format!("{p}-writes-keys"), text(&c, 3)?),
            (format!("{p}-writes-commit-groups"), text(&c, 4)?),
            (format!("{p}-writes-per-commit-group"), float(&c, 5)?),
            (format!("{p}-writes-ingest-{unit}"), float(&c, 6)?),
            (format!("{p}-writes-ingest-MB-s"), float(&c, 8)?),
        ];
        self.current().extend(entries);
        Some(())
    }

    fn wal(&mut self, line: &str, kind: &str) -> Option<()> {
        let c = patterns().wal.captures(line)?;
        if &c[1] != kind {
            return None;
        }
        let unit = c.get(6)?.as_str();
        if unit != size_unit(kind) {
            return None;
        }
        let p = kind.to_ascii_lowercase();
        let entries = [
            (format!("{p}-WAL-writes"), text(&c, 2)?),
            (format!("{p}-WAL-syncs"), text(&c, 3)?),
            (format!("{p}-WAL-writes-per-sync"), float(&c, 4)?),
            (format!("{p}-WAL-written-{unit}"), float(&c, 5)?),
            (format!("{p}-WAL-written-MB-s"), float(&c, 7)?),
        ];
        self.current().extend(entries);
        Some(())
    }

    fn compaction(&mut self, line: &str, kind: &str) -> Option<()> {
        let c = patterns().compaction.captures(line)?;
        if &c[1] != kind {
            return None;
        }
        let p = kind.to_ascii_lowercase();
        let entries = [
            (format!("{p}-written-GB"), float(&c, 2)?),
            (format!("{p}-written-MB-s"), float(&c, 3)?),
            (format!("{p}-read-GB"), float(&c, 4)?),
            (format!("{p}-read-MB-s"), float(&c, 5)?),
            (format!("{p}-seconds"), float(&c, 6)?),
        ];
        // always lands in compaction-stats, whatever the current section is
        self.compaction.extend(entries);
        Some(())
    }

    fn stall(&mut self, line: &str, kind: &str) -> Option<()> {
        let c = patterns().stall.captures(line)?;
        if &c[1] != kind {
            return None;
        }
        let p = kind.to_ascii_lowercase();
        let seconds = hms_seconds(&c, 2)?;
        let percent = float(&c, 5)?;
        let sec = self.current();
        sec.insert(format!("{p}-stall-sec"), Value::from(seconds));
        sec.insert(format!("{p}-stall-percent"), percent);
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
** Compaction Stats [default] **
Level    Files   Size(MB) Score Read(GB)  Rn(GB) Rnp1(GB) Write(GB) Wnew(GB) Moved(GB) W-Amp Rd(MB/s) Wr(MB/s) Comp(sec) Comp(cnt) Avg(sec) KeyIn KeyDrop
---------------------------------------------------------------------------------------------------------------------------------------------------------------------
  L0      4/4       0.01   0.0      0.0     0.0      0.0       0.0      0.0       0.0   0.0      0.0      0.4         0         1    0.007       0      0
  L7      7/4     423.33   0.0      0.0     0.0      0.0       0.0      0.0       0.0   0.0      0.0      0.0         0         0    0.000      12K     3
 Sum     11/8     423.34   0.0      0.0     0.0      0.0       0.0      0.0       0.0   1.0      0.0      0.4         0         1    0.007       0      0
 Int      0/0       0.00   0.0      0.0     0.0      0.0       0.0      0.0       0.0   0.0      0.0      0.0         0         0    0.000       0      0
Flush(GB): cumulative 0.000, interval 0.000
Stalls(count): 0 level0_slowdown, 0 level0_slowdown_with_compaction, 0 level0_numfiles, 0 level0_numfiles_with_compaction, 0 stop for pending_compaction_bytes, 0 slowdown for pending_compaction_bytes, 0 memtable_compaction, 0 memtable_slowdown, interval 0 total count

** DB Stats **
Uptime(secs): 2.3 total, 0.3 interval
Cumulative writes: 1 writes, 2 keys, 1 batches, 0.5 writes per batch, ingest: 0.00 GB, 0.00 MB/s
Cumulative WAL: 1 writes, 0 syncs, 1.00 writes per sync, written: 0.00 GB, 0.00 MB/s
Cumulative compaction: 0.00 GB write, 0.00 MB/s write, 0.00 GB read, 0.00 MB/s read, 0.0 seconds
Cumulative stall: 01:02:3.500 H:M:S, 0.0 percent
Interval writes: 0 writes, 0 keys, 0 batches, 0.0 writes per batch, ingest: 0.00 MB, 0.00 MB/s
Interval WAL: 0 writes, 0 syncs, 0.00 writes per sync, written: 0.00 MB, 0.00 MB/s
Interval compaction: 0.00 GB write, 0.00 MB/s write, 0.00 GB read, 0.00 MB/s read, 0.0 seconds
Interval stall: 00:00:0.000 H:M:S, 0.0 percent
";

    #[test]
    fn full_dump_reaches_done() {
        let mut p = StatsParser::new();
        for line in SAMPLE.lines() {
            p.parse_line(line);
        }
        assert_eq!(p.state(), ParserState::Done);
        let v = p.finish();

        let cs = &v["compaction-stats"];
        assert_eq!(cs["level-stats"]["L0"]["num-files"], json!(4));
        assert_eq!(cs["level-stats"]["L7"]["total-file-size-MB"], json!(423.33));
        assert_eq!(cs["level-stats"]["L7"]["num-input-records"], json!("12K"));
        assert_eq!(cs["level-stats"]["Sum"]["w-amp"], json!(1.0));
        assert!(cs["level-stats"]["Int"].is_object());
        assert_eq!(cs["flush-cumulative-GB"], json!(0.0));
        assert_eq!(cs["stalls-interval-total-count"], json!(0));
        assert_eq!(cs["cumulative-seconds"], json!(0.0));
        assert_eq!(cs["interval-written-GB"], json!(0.0));
        assert!(cs.get("error").is_none());

        let db = &v["db-stats"];
        assert_eq!(db["uptime-total-sec"], json!(2.3));
        assert_eq!(db["cumulative-writes-keys"], json!("2"));
        assert_eq!(db["cumulative-writes-ingest-GB"], json!(0.0));
        assert_eq!(db["interval-writes-ingest-MB"], json!(0.0));
        assert_eq!(db["cumulative-WAL-written-GB"], json!(0.0));
        assert_eq!(db["cumulative-stall-sec"], json!(3723.5));
        assert_eq!(db["interval-stall-percent"], json!(0.0));
        assert!(db.get("cumulative-seconds").is_none());
    }

    #[test]
    fn mismatch_records_error_and_stops() {
        let text = SAMPLE.replace(
            "Flush(GB): cumulative 0.000, interval 0.000",
            "Flush(GB): garbage",
        );
        let v = StatsParser::parse_str(&text);
        assert_eq!(v["compaction-stats"]["error"], json!("Flush(GB): garbage"));
        assert!(v["compaction-stats"]["level-stats"].is_object());
        assert!(v["db-stats"].as_object().map(|m| m.is_empty()).unwrap_or(false));
    }

    #[test]
    fn error_in_db_section_goes_to_db_stats() {
        let text = SAMPLE.replace("Uptime(secs): 2.3 total, 0.3 interval", "Uptime: ?");
        let v = StatsParser::parse_str(&text);
        assert_eq!(v["db-stats"]["error"], json!("Uptime: ?"));
    }

    #[test]
    fn size_unit_must_match_the_line_kind() {
        let text = SAMPLE.replace(
            "ingest: 0.00 GB, 0.00 MB/s",
            "ingest: 0.00 MB, 0.00 MB/s",
        );
        let v = StatsParser::parse_str(&text);
        let db = &v["db-stats"];
        assert!(db["error"].as_str().unwrap_or("").starts_with("Cumulative writes:"));
        assert!(db.get("cumulative-writes-ingest-MB").is_none());

        let text = SAMPLE.replace("written: 0.00 MB, 0.00 MB/s", "written: 0.00 GB, 0.00 MB/s");
        let v = StatsParser::parse_str(&text);
        assert!(v["db-stats"]["error"].as_str().unwrap_or("").starts_with("Interval WAL:"));
        assert!(v["db-stats"].get("interval-WAL-written-GB").is_none());
    }

    #[test]
    fn malformed_first_level_row_keeps_empty_table() {
        let text = SAMPLE.replace("  L0      4/4", "  L0      x/4");
        let v = StatsParser::parse_str(&text);
        let cs = &v["compaction-stats"];
        assert_eq!(cs["level-stats"], json!({}));
        assert!(cs["error"].as_str().unwrap_or("").contains("x/4"));
    }

    #[test]
    fn noise_before_header_is_ignored() {
        let mut p = StatsParser::new();
        p.parse_line("");
        p.parse_line("random preamble");
        assert_eq!(p.state(), ParserState::CompactionHeader);
        let v = p.finish();
        assert!(v["compaction-stats"].as_object().map(|m| m.is_empty()).unwrap_or(false));
    }
}
