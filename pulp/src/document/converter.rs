//! Document converters
//!
//! `TextConverter` reads Markdown and plain text directly. `DoclingConverter`
//! shells out to `docling_bridge.py`, which prints a single JSON object.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{Document, DocumentError, Metadata, make_preview};
use crate::config::ConverterConfig;

/// Extensions read without conversion
const TEXT_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Bridge script file name
const BRIDGE_SCRIPT: &str = "docling_bridge.py";

/// Turns a file on disk into a [`Document`]
#[async_trait]
pub trait Converter: Send + Sync {
    fn name(&self) -> &str;

    async fn convert(&self, path: &Path) -> Result<Document, DocumentError>;
}

/// Whether `path` can be read as text without conversion
pub fn is_text_format(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Pick the converter for a path
pub fn converter_for(path: &Path, config: &ConverterConfig) -> Result<Box<dyn Converter>, DocumentError> {
    debug!(?path, "converter_for: called");
    if is_text_format(path) {
        Ok(Box::new(TextConverter))
    } else {
        Ok(Box::new(DoclingConverter::from_config(config)?))
    }
}

fn source_format(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Reads `.md`, `.markdown` and `.txt` files as-is
pub struct TextConverter;

impl TextConverter {
    /// First Markdown heading, else the file stem
    fn title_for(path: &Path, content: &str) -> String {
        content
            .lines()
            .map(str::trim)
            .find(|l| l.starts_with('#'))
            .map(|l| l.trim_start_matches('#').trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_default()
    }
}

#[async_trait]
impl Converter for TextConverter {
    fn name(&self) -> &str {
        "text"
    }

    async fn convert(&self, path: &Path) -> Result<Document, DocumentError> {
        debug!(?path, "TextConverter::convert: called");
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DocumentError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        let size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);

        let title = Self::title_for(path, &content);
        let mut doc = Document::from_text(content, title);
        doc.metadata.source_path = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf())
            .display()
            .to_string();
        doc.metadata.source_format = source_format(path);
        doc.metadata.file_size_bytes = size;
        doc.metadata.converted_at = Some(chrono::Utc::now().to_rfc3339());
        Ok(doc)
    }
}

/// Runs the docling bridge as a subprocess
pub struct DoclingConverter {
    python: PathBuf,
    script: PathBuf,
    timeout: Duration,
}

impl DoclingConverter {
    pub fn from_config(config: &ConverterConfig) -> Result<Self, DocumentError> {
        debug!(?config, "DoclingConverter::from_config: called");
        let python = match &config.python {
            Some(p) => p.clone(),
            None => find_python()
                .ok_or_else(|| DocumentError::ConversionFailed("python not found in PATH".to_string()))?,
        };
        let script = match &config.script {
            Some(s) => s.clone(),
            None => find_script()
                .ok_or_else(|| DocumentError::ConversionFailed(format!("{} not found", BRIDGE_SCRIPT)))?,
        };

        Ok(Self {
            python,
            script,
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }
}

/// Search PATH for python3, then python
fn find_python() -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    ["python3", "python"].iter().find_map(|name| {
        std::env::split_paths(&path_var)
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}

/// Look next to the binary, under the working directory, then in the config dir
fn find_script() -> Option<PathBuf> {
    let mut locations = Vec::new();
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        locations.push(exe_dir.join("python").join(BRIDGE_SCRIPT));
    }
    locations.push(PathBuf::from("python").join(BRIDGE_SCRIPT));
    if let Some(config_dir) = dirs::config_dir() {
        locations.push(config_dir.join("pulp").join("python").join(BRIDGE_SCRIPT));
    }

    locations
        .into_iter()
        .find(|p| p.is_file())
        .map(|p| p.canonicalize().unwrap_or(p))
}

/// JSON printed by the bridge
#[derive(Debug, Deserialize)]
struct BridgeOutput {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    markdown: String,
    #[serde(default)]
    preview: String,
    #[serde(default)]
    metadata: Metadata,
}

impl BridgeOutput {
    fn into_document(self) -> Result<Document, DocumentError> {
        if !self.success {
            return Err(DocumentError::ConversionFailed(
                self.error.unwrap_or_else(|| "unknown conversion error".to_string()),
            ));
        }
        let word_count = self.markdown.split_whitespace().count();
        let preview = if self.preview.is_empty() {
            make_preview(&self.markdown)
        } else {
            self.preview
        };
        Ok(Document {
            title: self.metadata.title.clone(),
            content: self.markdown,
            word_count,
            preview,
            metadata: self.metadata,
        })
    }
}

/// Interpret the bridge's stdout and exit status
fn parse_bridge_output(stdout: &[u8], stderr: &[u8], success: bool) -> Result<Document, DocumentError> {
    match serde_json::from_slice::<BridgeOutput>(stdout) {
        Ok(output) => output.into_document(),
        Err(e) if success => Err(DocumentError::ConversionFailed(format!(
            "failed to parse converter output: {}",
            e
        ))),
        Err(_) => Err(DocumentError::ConversionFailed(
            String::from_utf8_lossy(stderr).trim().to_string(),
        )),
    }
}

#[async_trait]
impl Converter for DoclingConverter {
    fn name(&self) -> &str {
        "docling"
    }

    async fn convert(&self, path: &Path) -> Result<Document, DocumentError> {
        debug!(?path, python = ?self.python, script = ?self.script, "DoclingConverter::convert: called");
        let abs = path.canonicalize().map_err(|_| DocumentError::NotFound(path.to_path_buf()))?;

        let child = Command::new(&self.python)
            .arg(&self.script)
            .arg(&abs)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(?path, timeout = ?self.timeout, "DoclingConverter::convert: timed out");
                return Err(DocumentError::ConversionFailed(format!(
                    "conversion timed out after {:?}",
                    self.timeout
                )));
            }
        };

        parse_bridge_output(&output.stdout, &output.stderr, output.status.success())
    }
}
