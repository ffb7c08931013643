use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::error;

/// Run an external program, capturing combined stdout + stderr.
///
/// The exit code is not interpreted beyond success/failure: a failed run
/// whose combined output contains one of the tolerated substrings is
/// treated as success (idempotent commands such as duplicate route adds
/// report "File exists"). Other failures are logged with the full output
/// and surfaced.
pub fn combined_output_logged(tolerated: &[&str], program: &str, args: &[&str]) -> Result<String> {
    #[cfg(test)]
    if let Some(response) = crate::exec_mock::intercept(program, args) {
        return finish(tolerated, program, args, response.exit_code == 0, response.output);
    }

    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("exec: Failed to run: {} {}", program, args.join(" ")))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    finish(tolerated, program, args, output.status.success(), combined)
}

fn finish(
    tolerated: &[&str],
    program: &str,
    args: &[&str],
    success: bool,
    output: String,
) -> Result<String> {
    let output = output.trim().to_string();

    if !success {
        if tolerated.iter().any(|sub| output.contains(sub)) {
            return Ok(output);
        }

        error!(
            cmd = %format!("{} {}", program, args.join(" ")),
            output = %output,
            "exec: Command failed"
        );
        bail!("exec: Command failed: {} {}", program, args.join(" "));
    }

    Ok(output)
}
