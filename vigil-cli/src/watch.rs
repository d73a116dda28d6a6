//! Terminal rendering and key handling for `vigil watch`.

use crossterm::style::{StyledContent, Stylize};
use vigil_core::feed::{ConnectionState, FeedMode, FeedSnapshot, FeedUpdate};
use vigil_core::{MetricsSnapshot, Severity, ThreatEvent};

pub const HELP: &str = "keys: [p] pause/resume  [c] clear  [r] reconnect  [s] status  [q] quit";

/// A command typed on stdin while watching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKey {
    Pause,
    Clear,
    Reconnect,
    Status,
    Quit,
}

impl WatchKey {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "p" | "pause" | "resume" => Some(WatchKey::Pause),
            "c" | "clear" => Some(WatchKey::Clear),
            "r" | "reconnect" => Some(WatchKey::Reconnect),
            "s" | "status" => Some(WatchKey::Status),
            "q" | "quit" | "exit" => Some(WatchKey::Quit),
            _ => None,
        }
    }
}

pub fn banner(target: &str, mode: FeedMode) -> String {
    let mode = match mode {
        FeedMode::Stream => "stream",
        FeedMode::Polling => "polling",
    };
    format!("Watching {} ({})\n{}", target, mode, HELP)
}

fn severity_label(severity: Severity) -> StyledContent<String> {
    let label = format!("{:<8}", severity.as_str().to_uppercase());
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.green(),
    }
}

fn status_label(state: ConnectionState) -> StyledContent<&'static str> {
    match state {
        ConnectionState::Open => state.as_str().green(),
        ConnectionState::Connecting | ConnectionState::Idle => state.as_str().yellow(),
        ConnectionState::Closed => state.as_str().dark_grey(),
        ConnectionState::GivenUp => state.as_str().red().bold(),
    }
}

pub fn render_threat(event: &ThreatEvent) -> String {
    let mut line = format!("{} {}", severity_label(event.severity), event.message);
    if let Some(location) = &event.location {
        line.push_str(&format!(" @ {}", location));
    }
    if let Some(ip) = &event.ip {
        line.push_str(&format!(" [{}]", ip));
    }
    if let Some(risk) = event.risk {
        line.push_str(&format!(" risk={}", risk));
    }
    line
}

pub fn render_metrics(m: &MetricsSnapshot) -> String {
    let mut line = format!(
        "alerts={} it={} critical={} vulns={} mttd={} epm={} incidents={} blocked={}",
        m.total_alerts,
        m.it_alerts,
        m.critical_anomalies,
        m.vulnerabilities,
        m.mttd,
        m.events_per_min,
        m.active_incidents,
        m.blocked_threats
    );
    if let Some(uae) = m.uae_threats {
        line.push_str(&format!(" uae={}", uae));
    }
    line
}

/// One display line per update. `None` for updates not worth printing.
pub fn render_update(update: &FeedUpdate) -> Option<String> {
    match update {
        FeedUpdate::Threat(event) => Some(render_threat(event)),
        FeedUpdate::Metrics(m) => Some(format!("{} {}", "METRICS ".cyan(), render_metrics(m))),
        FeedUpdate::Status { state, attempts } => {
            if *state == ConnectionState::Connecting && *attempts == 0 {
                return None;
            }
            Some(format!("-- {} (attempts {})", status_label(*state), attempts))
        }
        FeedUpdate::Retrying { attempt, delay } => Some(format!(
            "-- reconnecting in {:.1}s (attempt {})",
            delay.as_secs_f64(),
            attempt
        )),
        FeedUpdate::Cleared { removed } => Some(format!("-- cleared {} threats", removed)),
        FeedUpdate::PauseToggled { paused } => Some(if *paused {
            "-- paused (incoming events are dropped)".to_string()
        } else {
            "-- resumed".to_string()
        }),
    }
}

pub fn render_status(snapshot: &FeedSnapshot, limit: usize) -> String {
    let mut out = format!(
        "status: {}  attempts: {}  paused: {}  buffered: {}",
        status_label(snapshot.status),
        snapshot.attempts,
        snapshot.paused,
        snapshot.threats.len()
    );
    if let Some(err) = &snapshot.last_error {
        out.push_str(&format!("\nlast error: {}", err));
    }
    let stats = &snapshot.stats;
    out.push_str(&format!(
        "\nreceived: {}  threats: {}  metrics: {}  suppressed: {}  rejected: {}  ignored: {}",
        stats.received,
        stats.applied_threats,
        stats.applied_metrics,
        stats.suppressed,
        stats.rejected,
        stats.ignored
    ));
    if let Some(m) = &snapshot.metrics {
        out.push('\n');
        out.push_str(&render_metrics(m));
    }
    for event in snapshot.threats.iter().take(limit) {
        out.push_str("\n  ");
        out.push_str(&render_threat(event));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn event() -> ThreatEvent {
        ThreatEvent {
            id: "t-1".into(),
            timestamp: "2026-10-19T09:30:00Z".into(),
            message: "Ransomware file encryption pattern".into(),
            severity: Severity::Critical,
            ip: Some("198.51.100.4".into()),
            location: Some("Dubai".into()),
            kind: Some("ransomware".into()),
            risk: Some(97),
        }
    }

    #[test]
    fn test_parse_keys() {
        assert_eq!(WatchKey::parse("p"), Some(WatchKey::Pause));
        assert_eq!(WatchKey::parse(" C \n"), Some(WatchKey::Clear));
        assert_eq!(WatchKey::parse("reconnect"), Some(WatchKey::Reconnect));
        assert_eq!(WatchKey::parse("s"), Some(WatchKey::Status));
        assert_eq!(WatchKey::parse("q"), Some(WatchKey::Quit));
        assert_eq!(WatchKey::parse("x"), None);
        assert_eq!(WatchKey::parse(""), None);
    }

    #[test]
    fn test_render_threat_includes_fields() {
        let line = render_threat(&event());
        assert!(line.contains("CRITICAL"));
        assert!(line.contains("Ransomware"));
        assert!(line.contains("@ Dubai"));
        assert!(line.contains("[198.51.100.4]"));
        assert!(line.contains("risk=97"));
    }

    #[test]
    fn test_render_update_skips_first_connecting() {
        let quiet = FeedUpdate::Status {
            state: ConnectionState::Connecting,
            attempts: 0,
        };
        assert!(render_update(&quiet).is_none());

        let retry = FeedUpdate::Retrying {
            attempt: 2,
            delay: Duration::from_millis(4000),
        };
        assert_eq!(
            render_update(&retry).unwrap(),
            "-- reconnecting in 4.0s (attempt 2)"
        );
    }

    #[test]
    fn test_render_given_up_status() {
        let line = render_update(&FeedUpdate::Status {
            state: ConnectionState::GivenUp,
            attempts: 4,
        })
        .unwrap();
        assert!(line.contains("given-up"));
        assert!(line.contains("attempts 4"));
    }

    #[test]
    fn test_banner_mentions_mode() {
        let text = banner("http://127.0.0.1:18790/api/sse", FeedMode::Stream);
        assert!(text.starts_with("Watching http://127.0.0.1:18790/api/sse (stream)"));
        assert!(text.contains("[q] quit"));
    }
}
