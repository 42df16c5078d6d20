use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::DocumentsConfig;
use crate::error::{Error, Result};
use crate::models::SourceFile;

/// List the ingestible files under the documents root, sorted by relative path.
pub fn scan_documents(config: &DocumentsConfig) -> Result<Vec<SourceFile>> {
    let root = &config.root;
    if !root.is_dir() {
        return Err(Error::Configuration(format!(
            "documents root does not exist: {}",
            root.display()
        )));
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string(), ".git/**".to_string()];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| Error::Io {
            path: root.clone(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(SourceFile {
            path: path.to_path_buf(),
            source: rel_str,
        });
    }

    files.sort_by(|a, b| a.source.cmp(&b.source));

    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::Configuration(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Configuration(format!("invalid glob set: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn docs_config(root: PathBuf) -> DocumentsConfig {
        DocumentsConfig {
            root,
            include_globs: vec!["**/*.md".to_string(), "**/*.txt".to_string()],
            exclude_globs: Vec::new(),
        }
    }

    #[test]
    fn test_only_markdown_and_text_are_listed() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("transcripts")).unwrap();
        fs::write(root.join("brainlift.txt"), "corpus").unwrap();
        fs::write(root.join("transcripts/ep1.md"), "episode").unwrap();
        fs::write(root.join("slides.pdf"), "binary").unwrap();
        fs::write(root.join("notes.json"), "{}").unwrap();

        let files = scan_documents(&docs_config(root.to_path_buf())).unwrap();
        let sources: Vec<&str> = files.iter().map(|f| f.source.as_str()).collect();
        assert_eq!(sources, vec!["brainlift.txt", "transcripts/ep1.md"]);
    }

    #[test]
    fn test_excludes_apply() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("drafts")).unwrap();
        fs::write(root.join("keep.md"), "a").unwrap();
        fs::write(root.join("drafts/skip.md"), "b").unwrap();

        let mut config = docs_config(root.to_path_buf());
        config.exclude_globs = vec!["drafts/**".to_string()];
        let files = scan_documents(&config).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].source, "keep.md");
    }

    #[test]
    fn test_missing_root_is_config_error() {
        let err = scan_documents(&docs_config(PathBuf::from("/nonexistent/docs"))).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
