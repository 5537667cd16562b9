use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use once_cell::sync::Lazy;
use salvo::http::header::{CONTENT_TYPE, HeaderValue};
use salvo::prelude::*;

static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);

static STANDUPS_CREATED: AtomicU64 = AtomicU64::new(0);
static EDITS_APPLIED: AtomicU64 = AtomicU64::new(0);
static EDITS_RETAINED: AtomicU64 = AtomicU64::new(0);
static EDITS_DROPPED: AtomicU64 = AtomicU64::new(0);
static EVENTS_FAILED: AtomicU64 = AtomicU64::new(0);
static ROSTER_SYNCS: AtomicU64 = AtomicU64::new(0);
static COMMANDS_HANDLED: AtomicU64 = AtomicU64::new(0);
static COMMANDS_FAILED: AtomicU64 = AtomicU64::new(0);

pub struct Metrics;

impl Metrics {
    /// Pins the uptime origin; call once at startup.
    pub fn init() {
        Lazy::force(&STARTED_AT);
    }

    pub fn standup_created() {
        STANDUPS_CREATED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn edit_applied() {
        EDITS_APPLIED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn edit_retained() {
        EDITS_RETAINED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn edit_dropped() {
        EDITS_DROPPED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_failed() {
        EVENTS_FAILED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn roster_synced() {
        ROSTER_SYNCS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_handled() {
        COMMANDS_HANDLED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_failed() {
        COMMANDS_FAILED.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn format_prometheus() -> String {
    let counters = [
        (
            "standups_created_total",
            "Number of messages stored as standups",
            &STANDUPS_CREATED,
        ),
        (
            "standup_edits_applied_total",
            "Number of edits that replaced a standup comment",
            &EDITS_APPLIED,
        ),
        (
            "standup_edits_retained_total",
            "Number of edits recorded in history without replacing the comment",
            &EDITS_RETAINED,
        ),
        (
            "standup_edits_dropped_total",
            "Number of edits for messages with no stored standup",
            &EDITS_DROPPED,
        ),
        (
            "chat_events_failed_total",
            "Number of chat events that failed to process",
            &EVENTS_FAILED,
        ),
        (
            "roster_syncs_total",
            "Number of completed roster synchronizations",
            &ROSTER_SYNCS,
        ),
        (
            "commands_handled_total",
            "Number of slash commands answered",
            &COMMANDS_HANDLED,
        ),
        (
            "commands_failed_total",
            "Number of slash commands that ended in an error",
            &COMMANDS_FAILED,
        ),
    ];

    let mut output = format!(
        "# HELP bot_uptime_seconds Number of seconds the bot has been running\n\
         # TYPE bot_uptime_seconds gauge\n\
         bot_uptime_seconds {}\n",
        STARTED_AT.elapsed().as_secs()
    );
    for (name, help, counter) in counters {
        output.push_str(&format!(
            "\n# HELP {name} {help}\n# TYPE {name} counter\n{name} {}\n",
            counter.load(Ordering::Relaxed)
        ));
    }
    output
}

#[handler]
pub async fn metrics_endpoint(res: &mut Response) {
    res.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    res.body(format_prometheus());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_increments_counters() {
        let before = STANDUPS_CREATED.load(Ordering::Relaxed);
        let dropped_before = EDITS_DROPPED.load(Ordering::Relaxed);
        Metrics::standup_created();
        Metrics::edit_dropped();

        assert!(STANDUPS_CREATED.load(Ordering::Relaxed) > before);
        assert!(EDITS_DROPPED.load(Ordering::Relaxed) > dropped_before);
    }

    #[test]
    fn format_prometheus_includes_all_metrics() {
        let output = format_prometheus();
        assert!(output.contains("bot_uptime_seconds"));
        assert!(output.contains("standups_created_total"));
        assert!(output.contains("standup_edits_applied_total"));
        assert!(output.contains("standup_edits_retained_total"));
        assert!(output.contains("standup_edits_dropped_total"));
        assert!(output.contains("chat_events_failed_total"));
        assert!(output.contains("roster_syncs_total"));
        assert!(output.contains("commands_handled_total"));
        assert!(output.contains("commands_failed_total"));
    }
}
