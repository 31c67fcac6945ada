//! Plain-text rendering for `spindle status` and friends.

use std::fmt::Write as _;

use spindle_core::app::{QueueSnapshot, TaskView};
use spindle_core::domain::TaskRecord;

pub fn render_snapshot(snapshot: &QueueSnapshot) -> String {
    let mut out = String::new();
    let c = &snapshot.counts;
    let _ = writeln!(
        out,
        "queued {}  in_progress {}  failed {}  complete {}",
        c.queued, c.in_progress, c.failed, c.complete
    );

    section(&mut out, "queued", &snapshot.queued, |v| {
        let state = if v.ready == Some(false) { "waiting" } else { "ready" };
        state.to_string()
    });
    section(&mut out, "in_progress", &snapshot.in_progress, |_| "running".into());
    section(&mut out, "failed", &snapshot.failed, |v| {
        let mut note = v.reason.clone().unwrap_or_default();
        if !v.downstream.is_empty() {
            let _ = write!(note, " (blocks {})", v.downstream.len());
        }
        note
    });
    section(&mut out, "complete", &snapshot.complete, |v| {
        v.outcome.map(|k| format!("{k:?}").to_lowercase()).unwrap_or_default()
    });
    out
}

fn section(out: &mut String, name: &str, views: &[TaskView], note: impl Fn(&TaskView) -> String) {
    if views.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{name}:");
    for v in views {
        let _ = writeln!(
            out,
            "  {:<24} {:>8}  {}  {}",
            v.short_id,
            format_elapsed(v.elapsed_secs),
            paths(v.input.as_deref(), v.output.as_deref()),
            note(v)
        );
    }
}

pub fn task_line(record: &TaskRecord) -> String {
    let input = record.input.as_ref().map(|p| p.display().to_string());
    let output = record.output.as_ref().map(|p| p.display().to_string());
    format!(
        "{}  {}",
        record.id,
        paths(input.as_deref(), output.as_deref())
    )
}

fn paths(input: Option<&str>, output: Option<&str>) -> String {
    format!("{} -> {}", input.unwrap_or("-"), output.unwrap_or("-"))
}

/// `45s`, `3m05s`, `2h10m`, `3d04h`
pub fn format_elapsed(secs: i64) -> String {
    let secs = secs.max(0);
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m{:02}s", s / 60, s % 60),
        s if s < 86_400 => format!("{}h{:02}m", s / 3600, (s % 3600) / 60),
        s => format!("{}d{:02}h", s / 86_400, (s % 86_400) / 3600),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_uses_two_largest_units() {
        assert_eq!(format_elapsed(45), "45s");
        assert_eq!(format_elapsed(185), "3m05s");
        assert_eq!(format_elapsed(7800), "2h10m");
        assert_eq!(format_elapsed(273_600), "3d04h");
        assert_eq!(format_elapsed(-3), "0s");
    }

    #[test]
    fn missing_paths_render_as_dash() {
        assert_eq!(paths(None, Some("/lib/A.mp4")), "- -> /lib/A.mp4");
    }
}
