// Process-wide logging for the fake server
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::SystemTime;

use crate::colors::*;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Level {
    fn parse(s: &str) -> Option<Level> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            _ => None,
        }
    }
}

// Quiet unless a config turns it on; test output stays readable.
static ENABLED: AtomicBool = AtomicBool::new(false);
static THRESHOLD: AtomicU8 = AtomicU8::new(Level::Info as u8);

pub fn init(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

/// Unknown names fall back to info.
pub fn set_level(level: &str) {
    let l = Level::parse(level).unwrap_or(Level::Info);
    THRESHOLD.store(l as u8, Ordering::Relaxed);
}

pub fn is_valid_level(level: &str) -> bool {
    Level::parse(level).is_some()
}

fn enabled(level: Level) -> bool {
    // Errors bypass the switch: a timed-out response is a test defect that
    // must stay visible.
    level == Level::Error
        || (ENABLED.load(Ordering::Relaxed) && level as u8 >= THRESHOLD.load(Ordering::Relaxed))
}

fn emit(level: Level, line: &str) {
    if !enabled(level) {
        return;
    }
    let ts = timestamp();
    if level >= Level::Warn {
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "{DIM}{ts}{RESET} {line}");
        let _ = err.flush();
    } else {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "{DIM}{ts}{RESET} {line}");
        let _ = out.flush();
    }
}

/// UTC wall clock, millisecond precision.
fn timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs();
    let (year, month, day) = days_to_ymd(secs / 86_400);
    let tod = secs % 86_400;
    format!(
        "{year:04}-{month:02}-{day:02} {:02}:{:02}:{:02}.{:03}",
        tod / 3600,
        tod % 3600 / 60,
        tod % 60,
        now.subsec_millis()
    )
}

/// Civil date for a day count since 1970-01-01 (proleptic Gregorian).
pub(crate) fn days_to_ymd(days: u64) -> (u64, u64, u64) {
    // Shift the epoch to 0000-03-01 so leap days fall at the end of a year.
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z % 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + u64::from(month <= 2);
    (year, month, day)
}

pub fn debug(msg: &str) {
    emit(Level::Debug, &format!("{DIM}DBG {msg}{RESET}"));
}

pub fn info(msg: &str) {
    emit(Level::Info, &format!("{BOLD}{CYAN}{msg}{RESET}"));
}

pub fn warn(msg: &str) {
    emit(Level::Warn, &format!("{YELLOW}⚠ {msg}{RESET}"));
}

pub fn error(msg: &str) {
    emit(Level::Error, &format!("{RED}✗ {msg}{RESET}"));
}

/// A request reached the queue.
pub fn request(method: &str, target: &str, seq: u64) {
    emit(Level::Info, &format!("{YELLOW}→{RESET} {BOLD}{method}{RESET} {target} {DIM}#{seq}{RESET}"));
}

/// The answer written for a request, and where it came from.
pub fn response(status: u16, ms: u128, timed_out: bool) {
    let col = status_color(status);
    let source = if timed_out { format!("{RED}[TIMEOUT]{RESET}") } else { format!("{MAGENTA}[SCRIPTED]{RESET}") };
    emit(Level::Info, &format!("{GREEN}←{RESET} {BOLD}{col}{status}{RESET} ({ms}ms) {source}"));
}

pub fn probe(url: &str, attempt: u32, outcome: &str) {
    emit(Level::Debug, &format!("{DIM}ready check #{attempt}{RESET} {url} {outcome}"));
}
