use hdrhistogram::Histogram;
use std::time::Duration;

/// A k6 "trend" metric: a distribution of durations reported as
/// avg/min/med/max/p(90)/p(95).
#[derive(Debug, Clone)]
pub struct Trend {
    histogram: Histogram<u64>,
}

impl Trend {
    pub fn new() -> Self {
        Self {
            // 3 significant figures, auto-resizing
            histogram: Histogram::<u64>::new(3).expect("3 significant figures is a valid precision"),
        }
    }

    pub fn record(&mut self, value: Duration) {
        let _ = self.histogram.record(value.as_micros() as u64);
    }

    pub fn count(&self) -> u64 {
        self.histogram.len()
    }

    pub fn avg(&self) -> Duration {
        if self.count() == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.histogram.mean() as u64)
    }

    pub fn min(&self) -> Duration {
        Duration::from_micros(self.histogram.min())
    }

    pub fn max(&self) -> Duration {
        Duration::from_micros(self.histogram.max())
    }

    pub fn percentile(&self, percentile: f64) -> Duration {
        Duration::from_micros(self.histogram.value_at_percentile(percentile))
    }

    /// `avg=1.2ms min=... med=... max=... p(90)=... p(95)=...`
    pub fn summary(&self) -> String {
        format!(
            "avg={} min={} med={} max={} p(90)={} p(95)={}",
            format_latency(self.avg()),
            format_latency(self.min()),
            format_latency(self.percentile(50.0)),
            format_latency(self.max()),
            format_latency(self.percentile(90.0)),
            format_latency(self.percentile(95.0)),
        )
    }
}

impl Default for Trend {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats a latency the way k6 does: `0s`, `812µs`, `120.51ms`, `1.2s`.
pub fn format_latency(d: Duration) -> String {
    let micros = d.as_micros();
    if micros == 0 {
        "0s".to_string()
    } else if micros < 1_000 {
        format!("{}µs", micros)
    } else if micros < 1_000_000 {
        trim_decimal(format!("{:.2}", micros as f64 / 1_000.0)) + "ms"
    } else {
        trim_decimal(format!("{:.2}", d.as_secs_f64())) + "s"
    }
}

/// Formats a byte count with k6's decimal units: `512 B`, `12 kB`, `1.5 MB`.
pub fn format_bytes(bytes: f64) -> String {
    if bytes < 1_000.0 {
        format!("{:.0} B", bytes)
    } else if bytes < 1_000_000.0 {
        trim_decimal(format!("{:.1}", bytes / 1_000.0)) + " kB"
    } else if bytes < 1_000_000_000.0 {
        trim_decimal(format!("{:.1}", bytes / 1_000_000.0)) + " MB"
    } else {
        trim_decimal(format!("{:.1}", bytes / 1_000_000_000.0)) + " GB"
    }
}

fn trim_decimal(s: String) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}
