//! "Working" indication for long-running assistant calls.
//!
//! Ingestion and answering can take seconds. The session reports what it is
//! doing through an [`ActivityReporter`] so presentation layers can show a
//! spinner or status line. Reports go to **stderr** so stdout stays clean for
//! answers.

use std::io::Write;
use std::sync::RwLock;

use serde::Serialize;

/// What the session is currently waiting on.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Activity {
    /// Ingesting document `n` of `total` (1-based).
    Ingesting {
        document: String,
        n: u64,
        total: u64,
    },
    /// Waiting for the assistant to answer.
    Thinking,
    /// No call in flight.
    #[default]
    Idle,
}

/// Receives activity updates from the session.
pub trait ActivityReporter: Send + Sync {
    fn report(&self, activity: Activity);
}

/// Human-friendly status lines on stderr: "ingesting report.pdf (1/3)".
pub struct StderrActivity;

impl ActivityReporter for StderrActivity {
    fn report(&self, activity: Activity) {
        let line = match &activity {
            Activity::Ingesting { document, n, total } => {
                format!("ingesting {} ({}/{})\n", document, n, total)
            }
            Activity::Thinking => "thinking...\n".to_string(),
            Activity::Idle => return,
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable activity: one JSON object per line on stderr.
pub struct JsonActivity;

impl ActivityReporter for JsonActivity {
    fn report(&self, activity: Activity) {
        let obj = match &activity {
            Activity::Ingesting { document, n, total } => serde_json::json!({
                "event": "activity",
                "phase": "ingesting",
                "document": document,
                "n": n,
                "total": total
            }),
            Activity::Thinking => serde_json::json!({
                "event": "activity",
                "phase": "thinking"
            }),
            Activity::Idle => serde_json::json!({
                "event": "activity",
                "phase": "idle"
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter.
pub struct NoActivity;

impl ActivityReporter for NoActivity {
    fn report(&self, _activity: Activity) {}
}

/// Keeps the latest activity so another task can read it while the session
/// is busy. The HTTP server keeps one per session.
#[derive(Default)]
pub struct SharedActivity(RwLock<Activity>);

impl SharedActivity {
    pub fn current(&self) -> Activity {
        self.0
            .read()
            .map(|activity| activity.clone())
            .unwrap_or_default()
    }
}

impl ActivityReporter for SharedActivity {
    fn report(&self, activity: Activity) {
        if let Ok(mut slot) = self.0.write() {
            *slot = activity;
        }
    }
}

/// Activity output mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human output when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ActivityReporter> {
        match self {
            ProgressMode::Off => Box::new(NoActivity),
            ProgressMode::Human => Box::new(StderrActivity),
            ProgressMode::Json => Box::new(JsonActivity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_activity_keeps_latest_report() {
        let shared = SharedActivity::default();
        assert_eq!(shared.current(), Activity::Idle);

        shared.report(Activity::Ingesting {
            document: "report.pdf".to_string(),
            n: 1,
            total: 2,
        });
        shared.report(Activity::Thinking);
        assert_eq!(shared.current(), Activity::Thinking);
    }

    #[test]
    fn activity_serializes_with_phase_tag() {
        let json = serde_json::to_value(Activity::Ingesting {
            document: "report.pdf".to_string(),
            n: 2,
            total: 3,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "phase": "ingesting", "document": "report.pdf", "n": 2, "total": 3 })
        );
        assert_eq!(
            serde_json::to_value(Activity::Idle).unwrap(),
            serde_json::json!({ "phase": "idle" })
        );
    }
}
