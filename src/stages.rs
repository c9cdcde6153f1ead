use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use tracing::info;
use walkdir::WalkDir;

use crate::warehouse::{QueryRunner, Warehouse};

/// Stage directories in execution order. This list is the ordering contract:
/// later stages may depend on tables created by earlier ones, and files
/// within a stage run in lexicographic path order.
pub const TRANSFORM_STAGES: &[&str] = &["00_setup", "10_staging", "20_models", "30_marts"];
pub const SETUP_STAGES: &[&str] = &["00_setup"];

/// Collect every `*.sql` file beneath the given stage directories, in stage
/// order and sorted by path within each stage. A missing stage directory
/// means no work for that stage, not an error.
pub fn discover_sql_files(sql_root: &Path, stages: &[&str]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for stage in stages {
        let dir = sql_root.join(stage);
        if !dir.is_dir() {
            continue;
        }

        let mut stage_files = Vec::new();
        for entry in WalkDir::new(&dir) {
            let entry = entry
                .with_context(|| format!("failed to walk stage directory {}", dir.display()))?;
            if entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "sql")
            {
                stage_files.push(entry.into_path());
            }
        }
        stage_files.sort();
        files.extend(stage_files);
    }
    Ok(files)
}

/// Execute the given stages one file at a time, stopping at the first
/// failure. With `dry_run` the resolved plan is printed and nothing is
/// submitted.
pub async fn run_stages<W: Warehouse>(
    runner: &QueryRunner<W>,
    sql_root: &Path,
    stages: &[&str],
    dry_run: bool,
) -> anyhow::Result<()> {
    let files = discover_sql_files(sql_root, stages)?;
    if files.is_empty() {
        bail!(
            "no SQL files found under {} for stages: {}",
            sql_root.display(),
            stages.join(", ")
        );
    }

    println!("SQL execution order:");
    for file in &files {
        println!(" - {}", display_name(sql_root, file));
    }

    if dry_run {
        println!("\nDry run mode - SQL files will not be executed.");
        return Ok(());
    }

    for file in &files {
        let name = display_name(sql_root, file);
        let sql = std::fs::read_to_string(file)
            .with_context(|| format!("failed to read SQL file {}", file.display()))?;
        if sql.trim().is_empty() {
            info!("skipping empty SQL file: {name}");
            continue;
        }

        info!("running: {name}");
        let outcome = runner
            .run(&sql, &name)
            .await
            .with_context(|| format!("SQL file {name} failed"))?;
        info!(job_id = %outcome.job_id, rows = outcome.rows_affected, "completed: {name}");
    }

    Ok(())
}

fn display_name(sql_root: &Path, file: &Path) -> String {
    file.strip_prefix(sql_root)
        .unwrap_or(file)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_settings;
    use crate::warehouse::testing::RecordingWarehouse;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn files_run_in_stage_then_path_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "30_marts/10_trending.sql", "SELECT 3");
        write(root, "10_staging/20_b.sql", "SELECT 2");
        write(root, "10_staging/10_a.sql", "SELECT 1");
        write(root, "00_setup/nested/10_tables.sql", "SELECT 0");
        write(root, "10_staging/notes.txt", "not sql");

        let files = discover_sql_files(root, TRANSFORM_STAGES).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|file| display_name(root, file))
            .collect();
        assert_eq!(
            names,
            vec![
                "00_setup/nested/10_tables.sql",
                "10_staging/10_a.sql",
                "10_staging/20_b.sql",
                "30_marts/10_trending.sql",
            ]
        );
    }

    #[test]
    fn missing_stage_directory_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "20_models/10_only.sql", "SELECT 1");

        let files = discover_sql_files(dir.path(), TRANSFORM_STAGES).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn no_files_anywhere_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = RecordingWarehouse::default();
        let runner = QueryRunner::new(&warehouse, &test_settings());

        let err = run_stages(&runner, dir.path(), TRANSFORM_STAGES, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no SQL files found"));
    }

    #[tokio::test]
    async fn dry_run_submits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "00_setup/10_tables.sql", "SELECT 1");
        let warehouse = RecordingWarehouse::default();
        let runner = QueryRunner::new(&warehouse, &test_settings());

        run_stages(&runner, dir.path(), TRANSFORM_STAGES, true)
            .await
            .unwrap();
        assert!(warehouse.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "00_setup/10_empty.sql", "   \n");
        write(dir.path(), "00_setup/20_real.sql", "SELECT 1");
        let warehouse = RecordingWarehouse::default();
        let runner = QueryRunner::new(&warehouse, &test_settings());

        run_stages(&runner, dir.path(), TRANSFORM_STAGES, false)
            .await
            .unwrap();
        assert_eq!(warehouse.steps(), vec!["00_setup/20_real.sql"]);
    }

    #[tokio::test]
    async fn first_failure_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "10_staging/10_a.sql", "SELECT 1");
        write(dir.path(), "10_staging/20_b.sql", "SELECT 2");
        write(dir.path(), "10_staging/30_c.sql", "SELECT 3");
        let warehouse = RecordingWarehouse {
            fail_on_step: Some("10_staging/20_b.sql".to_string()),
            ..Default::default()
        };
        let runner = QueryRunner::new(&warehouse, &test_settings());

        let err = run_stages(&runner, dir.path(), TRANSFORM_STAGES, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("20_b.sql"));
        assert_eq!(warehouse.calls.lock().unwrap().len(), 2);
    }
}
