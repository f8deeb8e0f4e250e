use chrono::{DateTime, Duration, Utc};

use schoolbell_core::BreakKind;

use crate::state::TenantState;
use crate::timer::TimerClock;

/// `MM:SS`, minutes unbounded; negative spans render as `00:00`.
pub fn fmt_mm_ss(d: Duration) -> String {
    let secs = d.num_seconds().max(0);
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Read-only status text for a tenant. Times are shown in the tenant timezone.
pub fn render_status(state: &TenantState, now: DateTime<Utc>) -> String {
    let tz = state.tz();
    let mut lines: Vec<String> = Vec::new();

    if let Some(until) = state.pause_until() {
        lines.push(format!(
            "⏸️ **On break**, resuming at {} ({} left)",
            until.with_timezone(&tz).format("%H:%M:%S"),
            fmt_mm_ss(until - now)
        ));
    }

    if state.timers().is_empty() {
        lines.push("📋 No timers".to_string());
    } else {
        lines.push("**📋 Timers**".to_string());
        for timer in state.timers().values() {
            let marker = match timer.clock() {
                TimerClock::Running { phase_end_at } => {
                    phase_end_at.with_timezone(&tz).format("%H:%M:%S").to_string()
                }
                TimerClock::GloballyPaused { .. } => "(paused)".to_string(),
                TimerClock::PersonallyPaused { .. } => "(on hold)".to_string(),
            };
            lines.push(format!(
                "  • **{}** [{}] {} left → {}",
                timer.name(),
                timer.mode(),
                fmt_mm_ss(timer.remaining(now)),
                marker
            ));
        }
    }

    let windows: Vec<_> = [BreakKind::OneShot, BreakKind::Recurring]
        .into_iter()
        .flat_map(|kind| state.breaks(kind).iter().map(move |w| (kind, w)))
        .collect();
    if windows.is_empty() {
        lines.push("🔔 No breaks".to_string());
    } else {
        lines.push("**🔔 Breaks**".to_string());
        for (kind, window) in windows {
            lines.push(format!(
                "  • **{}** ({kind}) → {} ({}m)",
                window.label(),
                window.next_trigger_at().with_timezone(&tz).format("%m/%d %H:%M"),
                window.duration_secs() / 60
            ));
        }
    }

    lines.join("\n")
}
