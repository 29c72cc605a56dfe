//! Shell command lines handed to the external executor.

use std::path::Path;

/// File name of the per-experiment command list.
pub const COMMANDS_FILE: &str = "commands.txt";

/// Fills `{input}`, `{run}`, `{seed}` and `{output}` in `template`.
pub fn render_command(template: &str, input: &Path, run: usize, seed: u64, output: &Path) -> String {
    template
        .replace("{input}", &input.display().to_string())
        .replace("{run}", &run.to_string())
        .replace("{seed}", &seed.to_string())
        .replace("{output}", &output.display().to_string())
}
