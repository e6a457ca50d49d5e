use anyhow::{bail, Result};
use console::Term;

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Asks a yes/no question on the terminal.
///
/// Without a terminal there is nobody to answer, so the caller must opt out
/// of the question with `--force` instead.
pub fn confirm(question: &str) -> Result<bool> {
    let term = Term::stderr();
    if !term.is_term() {
        bail!("{question} needs confirmation but no terminal is attached; pass --force to proceed");
    }
    term.write_str(&format!("{question} (yes/no): "))?;
    let answer = term.read_line()?;
    Ok(is_affirmative(&answer))
}
