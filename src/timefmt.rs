//! Abbreviated text rendering of time periods.

/// Render a duration as short human text: "59 sec", "59 min", "1 hr",
/// "1 hr 12 min". Minutes are only reported alongside hours for periods
/// under four hours, and only when more than ten remain.
pub fn humanize_secs(seconds: u64) -> String {
    if seconds >= 3600 {
        let mins = (seconds % 3600) / 60;
        if seconds < 14400 && mins > 10 {
            format!("{} hr {} min", seconds / 3600, mins)
        } else {
            format!("{} hr", seconds / 3600)
        }
    } else if seconds >= 60 {
        format!("{} min", seconds / 60)
    } else {
        format!("{} sec", seconds)
    }
}
