use crate::duration::format_duration;
use crate::stats::{format_bytes, format_latency, Trend};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::Write;
use std::path::Path;
use std::time::Duration;

/// Share of simulated requests (and checks) that succeed.
const SUCCESS_PERCENT: u64 = 95;

/// Upper bound on latency samples drawn per trend; percentiles come from this sample.
const MAX_SAMPLES: u64 = 10_000;

const GRACEFUL_STOP: Duration = Duration::from_secs(30);

const BANNER: &str = r"
          /\      |‾‾| /‾‾/   /‾‾/
     /\  /  \     |  |/  /   /  /
    /  \/    \    |     (   /   ‾‾\
   /          \   |  |\  \ |  (‾)  |
  / __________ \  |__| \__\ \_____/ .io
";

/// Counters derived from the run shape before any randomness is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedCounts {
    pub total_requests: u64,
    pub successful: u64,
    pub failed: u64,
}

impl SimulatedCounts {
    /// One iteration (and request) per VU per whole second of the run, saturating at `u64::MAX`.
    pub fn new(duration: Duration, vus: u32) -> Self {
        let total_requests = (vus as u64).saturating_mul(duration.as_secs());
        let successful = (total_requests as u128 * SUCCESS_PERCENT as u128 / 100) as u64;
        Self {
            total_requests,
            successful,
            failed: total_requests - successful,
        }
    }
}

/// Fabricates a k6-like end-of-test summary when the real executable is missing.
pub struct Simulator {
    rng: StdRng,
}

impl Simulator {
    /// Seeded simulators produce byte-identical reports for identical inputs.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    pub fn simulate(&mut self, script: &Path, duration: Duration, vus: u32) -> String {
        let counts = SimulatedCounts::new(duration, vus);
        let samples = counts.total_requests.min(MAX_SAMPLES);

        // Per-run characteristics, then per-request jitter around them.
        let base_latency_ms: f64 = self.rng.gen_range(60.0..260.0);
        let response_bytes: f64 = self.rng.gen_range(800.0..15_000.0);
        let request_bytes: f64 = self.rng.gen_range(80.0..260.0);
        let overhead_secs: f64 = self.rng.gen_range(0.05..1.5);

        let mut blocked = Trend::new();
        let mut connecting = Trend::new();
        let mut duration_trend = Trend::new();
        let mut receiving = Trend::new();
        let mut sending = Trend::new();
        let mut waiting = Trend::new();
        let mut iteration = Trend::new();

        for i in 0..samples {
            let first_for_vu = i < vus as u64;
            let (block_us, connect_us) = if first_for_vu {
                let connect = self.rng.gen_range(5_000..60_000u64);
                (connect + self.rng.gen_range(1_000..20_000u64), connect)
            } else {
                (self.rng.gen_range(1..12u64), 0)
            };
            blocked.record(Duration::from_micros(block_us));
            connecting.record(Duration::from_micros(connect_us));

            let mut latency_ms = base_latency_ms * self.rng.gen_range(0.5..1.5f64);
            if self.rng.gen_bool(0.05) {
                latency_ms *= self.rng.gen_range(2.0..4.0f64);
            }
            let total = Duration::from_secs_f64(latency_ms / 1_000.0);
            let send = Duration::from_micros(self.rng.gen_range(10..120u64));
            let receive = Duration::from_micros(self.rng.gen_range(40..900u64));
            duration_trend.record(total);
            sending.record(send);
            receiving.record(receive);
            waiting.record(total.saturating_sub(send + receive));

            let think = Duration::from_secs(1);
            iteration.record(think + total + Duration::from_micros(block_us));
        }

        let elapsed = duration.as_secs_f64() + overhead_secs;
        let per_sec = |n: f64| if elapsed > 0.0 { n / elapsed } else { 0.0 };
        let received = response_bytes * counts.total_requests as f64;
        let sent = request_bytes * counts.total_requests as f64;
        let success_pct = percent(counts.successful, counts.total_requests);
        let failed_pct = percent(counts.failed, counts.total_requests);

        let mut out = String::new();
        out.push_str(BANNER);
        out.push('\n');
        let _ = writeln!(out, "  execution: local (simulated: k6 executable not available)");
        let _ = writeln!(out, "     script: {}", script.display());
        let _ = writeln!(out, "     output: -");
        out.push('\n');
        let _ = writeln!(
            out,
            "  scenarios: (100.00%) 1 scenario, {} max VUs, {} max duration (incl. graceful stop):",
            vus,
            format_duration(duration.saturating_add(GRACEFUL_STOP))
        );
        let _ = writeln!(
            out,
            "           * default: {} looping VUs for {} (gracefulStop: {})",
            vus,
            format_duration(duration),
            format_duration(GRACEFUL_STOP)
        );
        out.push_str("\n\n");

        if counts.failed == 0 {
            let _ = writeln!(out, "     ✓ status is 200");
        } else {
            let _ = writeln!(out, "     ✗ status is 200");
            let _ = writeln!(
                out,
                "      ↳  {:.0}% — ✓ {} / ✗ {}",
                success_pct, counts.successful, counts.failed
            );
        }
        out.push('\n');

        metric(&mut out, "checks", format!("{:<7} ✓ {:<9} ✗ {}", format!("{:.2}%", success_pct), counts.successful, counts.failed));
        metric(&mut out, "data_received", format!("{:<7} {}/s", format_bytes(received), format_bytes(per_sec(received))));
        metric(&mut out, "data_sent", format!("{:<7} {}/s", format_bytes(sent), format_bytes(per_sec(sent))));
        metric(&mut out, "http_req_blocked", blocked.summary());
        metric(&mut out, "http_req_connecting", connecting.summary());
        metric(&mut out, "http_req_duration", duration_trend.summary());
        metric(&mut out, "http_req_failed", format!("{:<7} ✓ {:<9} ✗ {}", format!("{:.2}%", failed_pct), counts.failed, counts.successful));
        metric(&mut out, "http_req_receiving", receiving.summary());
        metric(&mut out, "http_req_sending", sending.summary());
        metric(&mut out, "http_req_waiting", waiting.summary());
        metric(&mut out, "http_reqs", format!("{:<7} {:.6}/s", counts.total_requests, per_sec(counts.total_requests as f64)));
        metric(&mut out, "iteration_duration", iteration.summary());
        metric(&mut out, "iterations", format!("{:<7} {:.6}/s", counts.total_requests, per_sec(counts.total_requests as f64)));
        metric(&mut out, "vus", format!("{:<7} min={:<7} max={}", vus, vus, vus));
        metric(&mut out, "vus_max", format!("{:<7} min={:<7} max={}", vus, vus, vus));
        out.push_str("\n\n");

        let _ = writeln!(
            out,
            "running ({}), 0/{} VUs, {} complete and 0 interrupted iterations",
            format_latency(Duration::from_secs_f64(elapsed)),
            vus,
            counts.total_requests
        );
        let _ = writeln!(
            out,
            "default ✓ [======================================] {} VUs  {}",
            vus,
            format_duration(duration)
        );

        out
    }
}

fn metric(out: &mut String, name: &str, value: String) {
    let _ = writeln!(out, "     {:.<31}: {}", name, value);
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns the text after the `name....:` prefix of a metric line.
    fn metric_value<'a>(report: &'a str, name: &str) -> &'a str {
        report
            .lines()
            .map(str::trim_start)
            .find(|line| {
                line.strip_prefix(name)
                    .map(|rest| rest.starts_with('.'))
                    .unwrap_or(false)
            })
            .and_then(|line| line.split_once(": "))
            .map(|(_, value)| value)
            .unwrap_or_else(|| panic!("metric {} missing from report:\n{}", name, report))
    }

    #[test]
    fn test_counts() {
        let counts = SimulatedCounts::new(Duration::from_secs(5), 1);
        assert_eq!(counts, SimulatedCounts { total_requests: 5, successful: 4, failed: 1 });

        let counts = SimulatedCounts::new(Duration::from_secs(30), 10);
        assert_eq!(counts, SimulatedCounts { total_requests: 300, successful: 285, failed: 15 });

        let counts = SimulatedCounts::new(Duration::from_millis(500), 10);
        assert_eq!(counts.total_requests, 0);
    }

    #[test]
    fn test_huge_runs_do_not_overflow() {
        let duration = crate::duration::parse_duration("600000000h").unwrap();
        let counts = SimulatedCounts::new(duration, 100_000);
        assert_eq!(counts.total_requests, 216_000_000_000_000_000);
        assert_eq!(counts.successful, 205_200_000_000_000_000);
        assert_eq!(counts.successful + counts.failed, counts.total_requests);

        let counts = SimulatedCounts::new(Duration::MAX, u32::MAX);
        assert_eq!(counts.total_requests, u64::MAX);
        assert!(counts.successful < counts.total_requests);

        let report = Simulator::new(Some(9)).simulate(Path::new("a.js"), duration, 100_000);
        assert!(metric_value(&report, "iterations").starts_with("216000000000000000 "));
    }

    #[test]
    fn test_report_structure() {
        let report = Simulator::new(None).simulate(Path::new("/tmp/t.js"), Duration::from_secs(5), 1);

        assert!(report.contains("✓"));
        assert!(report.contains("script: /tmp/t.js"));
        assert!(report.contains("simulated"));
        assert!(metric_value(&report, "iterations").starts_with("5 "));
        assert!(metric_value(&report, "http_reqs").starts_with("5 "));
        assert_eq!(
            metric_value(&report, "vus").split_whitespace().collect::<Vec<_>>(),
            vec!["1", "min=1", "max=1"]
        );
        assert_eq!(
            metric_value(&report, "vus_max").split_whitespace().collect::<Vec<_>>(),
            vec!["1", "min=1", "max=1"]
        );
        assert!(metric_value(&report, "checks").starts_with("80.00%"));
        for name in [
            "data_received",
            "data_sent",
            "http_req_blocked",
            "http_req_connecting",
            "http_req_duration",
            "http_req_failed",
            "http_req_receiving",
            "http_req_sending",
            "http_req_waiting",
            "iteration_duration",
        ] {
            assert!(!metric_value(&report, name).is_empty(), "{} is empty", name);
        }
    }

    #[test]
    fn test_large_run_uses_95_percent_success() {
        let report = Simulator::new(Some(1)).simulate(Path::new("s.js"), Duration::from_secs(60), 20);
        assert!(metric_value(&report, "checks").starts_with("95.00%"));
        assert!(metric_value(&report, "http_req_failed").starts_with("5.00%"));
        assert!(metric_value(&report, "iterations").starts_with("1200 "));
    }

    #[test]
    fn test_seeded_reports_are_reproducible() {
        let a = Simulator::new(Some(42)).simulate(Path::new("a.js"), Duration::from_secs(10), 3);
        let b = Simulator::new(Some(42)).simulate(Path::new("a.js"), Duration::from_secs(10), 3);
        let c = Simulator::new(Some(43)).simulate(Path::new("a.js"), Duration::from_secs(10), 3);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_zero_iterations_does_not_panic() {
        let report = Simulator::new(Some(5)).simulate(Path::new("a.js"), Duration::from_millis(500), 2);
        assert!(metric_value(&report, "iterations").starts_with("0 "));
        assert!(metric_value(&report, "checks").starts_with("0.00%"));
    }
}
