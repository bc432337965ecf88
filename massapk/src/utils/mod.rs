pub mod fs;
pub use fs::*;

/// Formats a duration in seconds as `HH:MM:SS.ss`
pub fn human_time(elapsed: f64) -> String {
    // Rounded once, in hundredths, before any carrying
    let total = (elapsed.max(0.0) * 100.0).round() as u64;
    let hours = total / 360_000;
    let minutes = (total / 6_000) % 60;
    let hundredths = total % 6_000;
    format!(
        "{:02}:{:02}:{:02}.{:02}",
        hours,
        minutes,
        hundredths / 100,
        hundredths % 100
    )
}

/// Bytes to megabytes for display
pub fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
