use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use virtdoc_common::Node;
use virtdoc_core::DocumentCodec;

/// Format of a file holding a canonical tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeFormat {
    Xml,
    Json,
    Yaml,
}

impl TreeFormat {
    /// Guess from the extension; anything unrecognized is read as JSON
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "xml" => TreeFormat::Xml,
            "yaml" | "yml" => TreeFormat::Yaml,
            _ => TreeFormat::Json,
        }
    }
}

/// Reads a file, or stdin when the path is `-`
pub fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read stdin")?;
        return Ok(buffer);
    }

    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Loads a tree from XML, JSON or YAML
pub fn load_tree(path: &Path, format: TreeFormat, codec: &DocumentCodec) -> Result<Node> {
    let content = read_input(path)?;
    let node = match format {
        TreeFormat::Xml => codec
            .decode(&content)
            .with_context(|| format!("Failed to decode {}", path.display()))?,
        TreeFormat::Json => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON tree {}", path.display()))?,
        TreeFormat::Yaml => serde_yml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML tree {}", path.display()))?,
    };
    Ok(node)
}
