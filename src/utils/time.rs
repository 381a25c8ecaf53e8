//! Duration formatting

/// Format seconds as `mm:ss`, or `hh:mm:ss` past an hour
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).trunc() as u64;
    let hours = total / 3600;
    let mins = (total / 60) % 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}
