use colored::Colorize;
use hubflow_core::remove_vendor_credentials;
use std::path::Path;

pub async fn handle(code_path: &Path) -> anyhow::Result<()> {
    tracing::debug!("Cleaning {}", code_path.display());
    let removed = remove_vendor_credentials(code_path).await?;
    if removed.is_empty() {
        println!("No vendor credentials below {}", code_path.display());
        return Ok(());
    }
    for path in &removed {
        println!("  {} Removed {}", "✓".green(), path.display());
    }
    Ok(())
}
