//! Local stand-in assets for when no provider could generate content.
//!
//! These are used by the command line front end only. The fallback executor
//! never produces them itself.

use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::process::Command;

use crate::providers::{Artifact, Category};

const IMAGE_COLOR: &str = "0x1e3a5f";
const IMAGE_SIZE: &str = "1280x720";
const SILENCE_SECONDS: &str = "20";

/// Build the placeholder asset for a category
pub async fn create(category: Category, prompt: &str) -> Result<Artifact> {
    tracing::info!(%category, "Creating placeholder asset");

    match category {
        Category::Script => Ok(Artifact::Text(script_placeholder(prompt))),
        Category::Image => {
            let source = format!("color=c={IMAGE_COLOR}:s={IMAGE_SIZE}");
            let bytes = render_with_ffmpeg(&["-f", "lavfi", "-i", source.as_str(), "-frames:v", "1"], ".jpg").await?;
            Ok(Artifact::Image(bytes))
        }
        Category::Voice => {
            let bytes = render_with_ffmpeg(
                &[
                    "-f",
                    "lavfi",
                    "-i",
                    "anullsrc=r=44100:cl=mono",
                    "-t",
                    SILENCE_SECONDS,
                    "-q:a",
                    "9",
                    "-acodec",
                    "libmp3lame",
                ],
                ".mp3",
            )
            .await?;
            Ok(Artifact::Audio(bytes))
        }
    }
}

/// Generic narration wrapped around the topic
pub fn script_placeholder(topic: &str) -> String {
    let topic = topic.trim();
    format!(
        "Today we're exploring a fascinating topic: {topic}.\n\n\
         Here are the key things you need to know about {topic}, \
         and why it matters more than you might think.\n\n\
         Thanks for watching! Don't forget to like and subscribe for more.\n"
    )
}

/// Run ffmpeg with the given input arguments and return the rendered file
async fn render_with_ffmpeg(args: &[&str], suffix: &str) -> Result<Vec<u8>> {
    let output_file = tempfile::Builder::new()
        .prefix("reelforge_placeholder_")
        .suffix(suffix)
        .tempfile()
        .context("Failed to create temporary file")?;
    let output_path = output_file.path().to_path_buf();

    tracing::debug!("Running ffmpeg {:?} -> {}", args, output_path.display());

    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error"])
        .args(args)
        .arg("-y")
        .arg(&output_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .context("Failed to run ffmpeg (is it installed?)")?;

    if !output.status.success() {
        let error = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("ffmpeg failed: {}", error.trim());
    }

    let bytes = fs_err::read(&output_path)?;
    if bytes.is_empty() {
        anyhow::bail!("ffmpeg produced an empty file");
    }

    Ok(bytes)
}
