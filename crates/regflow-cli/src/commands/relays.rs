use anyhow::{Context, Result};
use colored::Colorize;
use regflow_infrastructure::relay_list::load_relays;
use std::path::Path;

/// Prints every usable relay (password masked) and the skipped count.
pub fn check(file: &Path, scheme: &str) -> Result<()> {
    let list = load_relays(file, scheme)
        .with_context(|| format!("Failed to read relay list {}", file.display()))?;

    for endpoint in &list.endpoints {
        println!("  {} {}", "✓".green(), endpoint);
    }
    println!(
        "\n{} usable, {} skipped",
        list.endpoints.len().to_string().green().bold(),
        list.skipped.to_string().yellow()
    );

    if list.endpoints.is_empty() {
        anyhow::bail!("no usable relays in {}", file.display());
    }
    Ok(())
}
