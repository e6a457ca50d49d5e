use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::sync::{BulkProgress, SyncStatus};

use super::styling::{bright, bright_green, bright_yellow};

/// Progress bar for bulk runs. Starts as a spinner while ideas are listed.
pub struct BulkProgressBar {
    pb: ProgressBar,
}

impl BulkProgressBar {
    pub fn start(project: &str, hidden: bool) -> Self {
        let pb = ProgressBar::new_spinner();
        if hidden {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        } else {
            eprintln!("{}  {}", bright("🔄"), bright(format!("Bulk sync of {project}")).underlined());
            pb.set_draw_target(ProgressDrawTarget::stderr());
        }
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("  {msg} {spinner}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(bright_yellow("Listing ideas").to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self { pb }
    }

    pub fn update(&self, progress: &BulkProgress<'_>) {
        if self.pb.length() != Some(progress.total as u64) {
            self.pb.set_length(progress.total as u64);
            self.pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:30.cyan/blue} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▉▊▋▌▍▎▏ "),
            );
        }
        self.pb.set_position(progress.processed as u64);

        let message = format!("{} {}", progress.key, progress.status);
        if progress.status == SyncStatus::Failed {
            self.pb.println(format!("  ✗ {message}"));
        }
        self.pb.set_message(message);
    }

    pub fn finish(self) {
        self.pb
            .finish_with_message(bright_green("Bulk sync finished ✓").to_string());
        eprintln!();
    }
}
