/// Formats microseconds as `HH:MM:SS.mmmmmm`.
pub fn format_timestamp(time_us: u64) -> String {
    let micros = time_us % 1_000_000;
    let seconds = time_us / 1_000_000;
    format!(
        "{:02}:{:02}:{:02}.{:06}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60,
        micros
    )
}
