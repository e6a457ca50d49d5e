mod execution_log;
mod exports;
mod progress;
mod prompt;
mod styling;
mod summary;
mod tables;

pub use execution_log::ExecutionLog;
pub use exports::write_json;
pub use progress::BulkProgressBar;
pub use prompt::confirm;
pub use styling::{dim, magenta_bold};
pub use summary::{
    print_bulk_report, print_link_checks, print_link_lookup, print_listing, print_mapping,
    print_reference_check, print_sync_result, render_connection,
};

/// Prints the jpd-sync banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("📅 jpd-sync"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Jira ↔ Product Discovery milestone sync")
    );
}
