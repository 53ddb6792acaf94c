use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use tracing::debug;

/// Ask a yes/no question on the terminal. Anything but `y`/`yes` means no,
/// and non-interactive mode answers no without reading stdin.
pub fn ask_for_confirmation(question: &str, non_interactive: bool) -> Result<bool> {
    if non_interactive {
        debug!("Non-interactive mode, answering no to: {}", question);
        return Ok(false);
    }
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    confirm_with(question, &mut stdin.lock(), &mut stdout)
}

pub fn confirm_with<R: BufRead, W: Write>(question: &str, input: &mut R, out: &mut W) -> Result<bool> {
    write!(out, "{} [y/N]: ", question).context("Failed to write prompt")?;
    out.flush().context("Failed to flush prompt")?;

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .context("Failed to read answer")?;

    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}
