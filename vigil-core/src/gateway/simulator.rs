//! Randomized SOC telemetry generator.

use crate::feed::events::{Envelope, MetricsSnapshot, Severity, ThreatEvent};
use chrono::Utc;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde_json::json;

const LOCATIONS: &[&str] = &[
    "Dubai",
    "Abu Dhabi",
    "Sharjah",
    "Riyadh",
    "Singapore",
    "Frankfurt",
    "London",
    "São Paulo",
    "Mumbai",
    "Virginia",
];

const ATTACKS: &[(&str, &str)] = &[
    ("ddos", "Volumetric DDoS against edge gateway"),
    ("phishing", "Credential phishing campaign detected"),
    ("malware", "Malware beacon to known C2 domain"),
    ("bruteforce", "Brute force attempt on VPN gateway"),
    ("ransomware", "Ransomware file encryption pattern"),
    ("exfiltration", "Unusual outbound data volume"),
    ("scan", "Horizontal port scan from external host"),
    ("injection", "SQL injection attempt on public API"),
];

const FIRMWARE_DEVICES: &[&str] = &["fw-edge-01", "fw-edge-02", "plc-line-4", "cam-lobby-2"];

/// Deterministic when seeded; see [`TelemetrySimulator::seeded`].
#[derive(Debug)]
pub struct TelemetrySimulator {
    rng: StdRng,
    sequence: u64,
    metrics: MetricsSnapshot,
}

impl TelemetrySimulator {
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::with_rng(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            sequence: 0,
            metrics: MetricsSnapshot {
                total_alerts: 1200,
                it_alerts: 310,
                critical_anomalies: 4,
                vulnerabilities: 57,
                mttd: "4.0m".to_string(),
                events_per_min: 850,
                active_incidents: 6,
                blocked_threats: 90,
                uae_threats: Some(40),
            },
        }
    }

    /// Number of threats generated so far.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn next_threat(&mut self) -> ThreatEvent {
        self.sequence += 1;
        let severity = self.pick_severity();
        let risk = match severity {
            Severity::Critical => self.rng.gen_range(85..=100),
            Severity::High => self.rng.gen_range(65..85),
            Severity::Medium => self.rng.gen_range(35..65),
            Severity::Low => self.rng.gen_range(5..35),
        };
        let (kind, message) = ATTACKS[self.rng.gen_range(0..ATTACKS.len())];
        let location = LOCATIONS[self.rng.gen_range(0..LOCATIONS.len())];
        let ip = format!(
            "{}.{}.{}.{}",
            self.rng.gen_range(1..=223),
            self.rng.gen_range(0..=255),
            self.rng.gen_range(0..=255),
            self.rng.gen_range(1..=254)
        );

        ThreatEvent {
            id: format!("thr-{}-{:06x}", self.sequence, self.rng.gen_range(0..0xff_ffffu32)),
            timestamp: Utc::now().to_rfc3339(),
            message: message.to_string(),
            severity,
            ip: Some(ip),
            location: Some(location.to_string()),
            kind: Some(kind.to_string()),
            risk: Some(risk),
        }
    }

    /// Advance the counters by a small random walk and return the result.
    pub fn next_metrics(&mut self) -> MetricsSnapshot {
        let m = &mut self.metrics;
        let new_alerts = self.rng.gen_range(0..25);
        m.total_alerts += new_alerts;
        m.it_alerts += new_alerts / 3;
        m.critical_anomalies = walk(&mut self.rng, m.critical_anomalies, 2, 0, 20);
        m.vulnerabilities = walk(&mut self.rng, m.vulnerabilities, 3, 10, 120);
        m.events_per_min = walk(&mut self.rng, m.events_per_min, 60, 300, 2000);
        m.active_incidents = walk(&mut self.rng, m.active_incidents, 1, 0, 25);
        m.blocked_threats += self.rng.gen_range(0..6);
        m.uae_threats = Some(walk(&mut self.rng, m.uae_threats.unwrap_or(40), 4, 0, 200));
        m.mttd = format!("{:.1}m", self.rng.gen_range(2.0..9.0f64));
        m.clone()
    }

    /// A firmware or vulnerability frame the live feed does not consume.
    pub fn next_peripheral(&mut self) -> Envelope {
        if self.rng.gen_bool(0.5) {
            let device = FIRMWARE_DEVICES[self.rng.gen_range(0..FIRMWARE_DEVICES.len())];
            let version = format!(
                "2.{}.{}",
                self.rng.gen_range(0..9u32),
                self.rng.gen_range(0..20u32)
            );
            let status = if self.rng.gen_bool(0.8) {
                "verified"
            } else {
                "tampered"
            };
            Envelope::other(
                "firmware",
                json!({"device": device, "version": version, "status": status}),
            )
        } else {
            let cve = format!("CVE-2026-{:04}", self.rng.gen_range(1..9999u32));
            let cvss = f64::from(self.rng.gen_range(30..100u32)) / 10.0;
            let asset = LOCATIONS[self.rng.gen_range(0..LOCATIONS.len())];
            Envelope::other(
                "vulnerability",
                json!({"cve": cve, "cvss": cvss, "asset": asset}),
            )
        }
    }

    fn pick_severity(&mut self) -> Severity {
        match self.rng.gen_range(0..100) {
            0..10 => Severity::Critical,
            10..35 => Severity::High,
            35..70 => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

fn walk(rng: &mut StdRng, value: u64, step: u64, min: u64, max: u64) -> u64 {
    let delta = rng.gen_range(0..=step * 2);
    (value + delta).saturating_sub(step).clamp(min, max)
}
