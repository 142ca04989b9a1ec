use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

pub fn tracking_bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{bar:40.cyan/blue} {percent:>3}% {pos}/{len} frames [{elapsed_precise}<{eta_precise}] {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

pub fn tracking_spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan.bold} [{elapsed_precise}] frames {pos} • {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
}

/// Bar for a known frame count, spinner otherwise.
pub fn tracking_progress(total_frames: u64) -> ProgressBar {
    let progress = if total_frames > 0 {
        let bar = ProgressBar::new(total_frames);
        bar.set_style(tracking_bar_style());
        bar
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(tracking_spinner_style());
        spinner
    };
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

pub fn format_displacement(value: [f64; 2]) -> String {
    if value[0].is_finite() && value[1].is_finite() {
        format!("dx {:+.1} dy {:+.1}", value[0], value[1])
    } else {
        "dx -- dy --".to_string()
    }
}
