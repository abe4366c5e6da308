// Phase Timing
// Scoped phase markers and the per-run report context
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::span::EnteredSpan;
use tracing::warn;

/// Aggregate statistics for one phase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseStat {
    pub count: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl PhaseStat {
    fn new(sample: Duration) -> Self {
        Self {
            count: 1,
            total: sample,
            min: sample,
            max: sample,
        }
    }

    fn record(&mut self, sample: Duration) {
        self.count += 1;
        self.total += sample;
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
    }

    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / self.count as u32
        }
    }
}

/// Phase name -> aggregate statistics. Created fresh per run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimingReport {
    stats: BTreeMap<String, PhaseStat>,
}

impl TimingReport {
    pub fn record(&mut self, phase: &str, sample: Duration) {
        match self.stats.get_mut(phase) {
            Some(stat) => stat.record(sample),
            None => {
                self.stats.insert(phase.to_string(), PhaseStat::new(sample));
            }
        }
    }

    pub fn get(&self, phase: &str) -> Option<&PhaseStat> {
        self.stats.get(phase)
    }

    pub fn phases(&self) -> impl Iterator<Item = (&str, &PhaseStat)> {
        self.stats.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1e3
}

impl fmt::Display for TimingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "==== Timing Report (monotonic clock) ====")?;
        for (phase, s) in &self.stats {
            writeln!(f, "{phase}:")?;
            writeln!(f, "  count: {}", s.count)?;
            writeln!(f, "  total: {:.3} ms", ms(s.total))?;
            writeln!(f, "  avg  : {:.3} ms", ms(s.mean()))?;
            writeln!(f, "  min  : {:.3} ms", ms(s.min))?;
            writeln!(f, "  max  : {:.3} ms", ms(s.max))?;
        }
        write!(f, "=========================================")
    }
}

/// Records the elapsed time of its scope into a report when dropped.
pub struct ScopedTimer<'a> {
    report: &'a mut TimingReport,
    phase: &'static str,
    start: Instant,
    _span: EnteredSpan,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(report: &'a mut TimingReport, phase: &'static str) -> Self {
        Self {
            report,
            phase,
            start: Instant::now(),
            _span: tracing::info_span!("phase", name = phase).entered(),
        }
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        self.report.record(self.phase, self.start.elapsed());
    }
}

/// Per-run diagnostics context.
///
/// Acquired at run start and passed explicitly. The timing report is written
/// to the sink exactly once, either by [`RunContext::finish`] or on drop, so
/// every exit path (including `?` early returns) finalizes it.
pub struct RunContext {
    report: TimingReport,
    sink: Option<Box<dyn Write + Send>>,
    finalized: bool,
}

impl RunContext {
    pub fn acquire(sink: Option<Box<dyn Write + Send>>) -> Self {
        Self {
            report: TimingReport::default(),
            sink,
            finalized: false,
        }
    }

    pub fn phase(&mut self, phase: &'static str) -> ScopedTimer<'_> {
        ScopedTimer::new(&mut self.report, phase)
    }

    pub fn report(&self) -> &TimingReport {
        &self.report
    }

    fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        if let Some(sink) = self.sink.as_mut() {
            let written = writeln!(sink, "{}", self.report).and_then(|_| sink.flush());
            if let Err(e) = written {
                warn!("failed to write timing report: {}", e);
            }
        }
    }

    /// Finalizes and hands back the report.
    pub fn finish(mut self) -> TimingReport {
        self.finalize();
        std::mem::take(&mut self.report)
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        self.finalize();
    }
}
