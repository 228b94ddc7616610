use std::path::Path;

use anyhow::{Context, Result};

use lakeload_engine::check_pipeline;
use lakeload_engine::config::{parser, validator};

/// Execute the `check` command: validate pipeline config, then probe the
/// source, checkpoint store, and warehouse.
pub async fn execute(pipeline_path: &Path) -> Result<()> {
    // 1. Parse pipeline YAML
    let config = parser::parse_pipeline(pipeline_path)
        .with_context(|| format!("Failed to parse pipeline: {}", pipeline_path.display()))?;

    // 2. Validate pipeline structure
    validator::validate_pipeline(&config)?;
    println!("Pipeline structure: OK");

    // 3. Probe each component
    let result = check_pipeline(&config).await?;

    // 4. Report results
    println!("{:18} {}", "Source:", result.source);
    println!("{:18} {}", "State backend:", result.state);
    println!("{:18} {}", "Warehouse:", result.warehouse);

    if result.all_ok() {
        println!("\nAll checks passed.");
        Ok(())
    } else {
        anyhow::bail!("One or more checks failed")
    }
}
