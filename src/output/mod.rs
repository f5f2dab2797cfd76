use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::cli::OutputFormat;
use crate::providers::{Artifact, Category};
use crate::status::{render_text, StatusReport};
use crate::utils::generate_unique_filename;

/// Save an artifact to file, creating parent directories as needed
pub fn save_to_file(artifact: &Artifact, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs_err::create_dir_all(parent)?;
    }

    fs_err::write(path, artifact.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Path used when the caller gave none
pub fn default_output_path(dir: &Path, category: Category, prompt: &str, artifact: &Artifact) -> PathBuf {
    dir.join(generate_unique_filename(
        category.as_str(),
        prompt,
        artifact.default_extension(),
    ))
}

/// Deliver an artifact: text goes to the console unless a path is given,
/// binary output is always written to a file. Returns the written path.
pub fn deliver(
    artifact: &Artifact,
    output: Option<&Path>,
    output_dir: &Path,
    category: Category,
    prompt: &str,
) -> Result<Option<PathBuf>> {
    match (artifact, output) {
        (Artifact::Text(text), None) => {
            println!("{}", text.trim_end());
            Ok(None)
        }
        (_, Some(path)) => {
            save_to_file(artifact, path)?;
            Ok(Some(path.to_path_buf()))
        }
        (_, None) => {
            let path = default_output_path(output_dir, category, prompt, artifact);
            save_to_file(artifact, &path)?;
            Ok(Some(path))
        }
    }
}

/// Print a status report to console
pub fn print_status(report: &StatusReport, format: &OutputFormat) -> Result<()> {
    let content = match format {
        OutputFormat::Text => render_text(report),
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
    };

    println!("{}", content);
    Ok(())
}
