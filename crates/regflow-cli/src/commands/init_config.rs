use anyhow::{Context, Result};
use colored::Colorize;
use regflow_infrastructure::ConfigService;
use std::path::PathBuf;

pub fn run(config: Option<PathBuf>, force: bool) -> Result<()> {
    let service = ConfigService::resolve(config)?;
    service
        .init(force)
        .with_context(|| format!("Failed to write {}", service.path().display()))?;

    println!(
        "{} Wrote {}",
        "✓".green(),
        service.path().display().to_string().bold()
    );
    println!("\nNext steps:");
    println!("  1. Set [endpoints] form_submit and form_submit_geo");
    println!("  2. Replace the [mailbox] placeholder credentials");
    println!("  3. Replace the [identity] placeholder domains");
    println!("  4. Run: regflow run --count 1");
    Ok(())
}
