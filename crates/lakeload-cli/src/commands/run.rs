use std::path::Path;

use anyhow::{Context, Result};

use lakeload_engine::config::{parser, validator};
use lakeload_engine::{build_pipeline, ExecutionOptions, RunReport};

/// Execute the `run` command: parse, validate, and run a pipeline.
pub async fn execute(pipeline_path: &Path, dry_run: bool) -> Result<()> {
    // 1. Parse pipeline YAML
    let config = parser::parse_pipeline(pipeline_path)
        .with_context(|| format!("Failed to parse pipeline: {}", pipeline_path.display()))?;

    // 2. Validate
    validator::validate_pipeline(&config)?;

    tracing::info!(
        pipeline = config.pipeline,
        source = config.source.location,
        table = %config.destination.table_name(),
        "Pipeline validated"
    );

    // 3. Run
    let options = ExecutionOptions { dry_run };
    let pipeline = build_pipeline(&config, &options).await?;
    let report = pipeline.run(&options).await?;

    print_report(&report);

    // Machine-readable JSON for schedulers and scripts
    let json = serde_json::to_string(&report).context("Failed to serialize run report")?;
    println!("@@RUN_JSON@@{json}");

    Ok(())
}

fn print_report(report: &RunReport) {
    let counts = &report.counts;
    if report.dry_run {
        println!("Pipeline '{}' dry run completed.", report.pipeline);
    } else {
        println!("Pipeline '{}' completed successfully.", report.pipeline);
    }
    println!("  Table:             {}", report.table);
    match report.previous_checkpoint {
        Some(cp) => println!("  Checkpoint:        {cp}"),
        None => println!("  Checkpoint:        none (full load)"),
    }
    println!("  Records extracted: {}", counts.records_extracted);
    if counts.malformed_rows_skipped > 0 {
        println!("  Malformed skipped: {}", counts.malformed_rows_skipped);
    }
    println!("  Records selected:  {}", counts.records_selected);
    if counts.excluded_untimestamped > 0 {
        println!("    No timestamp:    {}", counts.excluded_untimestamped);
    }
    println!("  Duplicates:        {}", counts.duplicates_removed);
    println!("  Records cleaned:   {}", counts.records_cleaned);
    if !report.binary_columns.is_empty() {
        println!("  Binary columns:    {}", report.binary_columns.join(", "));
    }

    if let Some(schema) = &report.schema {
        println!("  Schema:");
        for column in &schema.columns {
            let null = if column.nullable { "" } else { " not null" };
            println!("    {:24} {}{null}", column.name, column.column_type);
        }
    } else {
        if report.table_created {
            println!("  Table created:     yes");
        }
        println!("  Rows written:      {}", counts.rows_written);
        if let Some(cp) = report.new_checkpoint {
            println!("  New checkpoint:    {cp}");
        }
    }
    println!("  Duration:          {:.2}s", report.duration_secs);
}
