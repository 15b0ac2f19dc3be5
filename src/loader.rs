//! Knowledge-base document loader.
//!
//! Reads markdown and plain-text files from the knowledge-base directory,
//! strips markdown syntax, and tags each file with a category inferred from
//! its name. Unreadable files are logged and skipped; a missing directory
//! yields no documents rather than an error.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use serde::Serialize;
use walkdir::WalkDir;

use fitflix_core::models::{Document, DocumentMetadata};

use crate::config::KnowledgeBaseConfig;

/// Documents whose trimmed content is shorter than this are dropped by
/// [`validate_documents`].
const MIN_DOCUMENT_CHARS: usize = 10;

/// Filename substrings mapped to categories. First match wins.
const CATEGORY_RULES: &[(&str, &str)] = &[
    ("class", "classes"),
    ("trainer", "trainers"),
    ("nutrition", "nutrition"),
    ("membership", "membership"),
    ("facilit", "facilities"),
    ("faq", "faq"),
    ("community", "community"),
    ("contact", "contact"),
    ("about", "about"),
];

struct Cleaners {
    blank_runs: Regex,
    headers: Regex,
    links: Regex,
    bold: Regex,
    italic: Regex,
    code_blocks: Regex,
    inline_code: Regex,
}

fn cleaners() -> &'static Cleaners {
    static CLEANERS: OnceLock<Cleaners> = OnceLock::new();
    CLEANERS.get_or_init(|| Cleaners {
        blank_runs: Regex::new(r"\n\s*\n\s*\n").expect("blank run regex"),
        headers: Regex::new(r"(?m)^#+\s*").expect("header regex"),
        links: Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("link regex"),
        bold: Regex::new(r"\*\*([^*]+)\*\*").expect("bold regex"),
        italic: Regex::new(r"\*([^*]+)\*").expect("italic regex"),
        code_blocks: Regex::new(r"```[^`]*```").expect("code block regex"),
        inline_code: Regex::new(r"`([^`]+)`").expect("inline code regex"),
    })
}

/// Strip markdown syntax, keeping the readable text.
///
/// Collapses runs of blank lines, then removes header markers, unwraps
/// links, bold, and italic, drops fenced code blocks, and unwraps inline
/// code, in that order.
pub fn clean_markdown(content: &str) -> String {
    let c = cleaners();
    let text = c.blank_runs.replace_all(content, "\n\n");
    let text = text.trim();
    let text = c.headers.replace_all(text, "");
    let text = c.links.replace_all(&text, "$1");
    let text = c.bold.replace_all(&text, "$1");
    let text = c.italic.replace_all(&text, "$1");
    let text = c.code_blocks.replace_all(&text, "");
    let text = c.inline_code.replace_all(&text, "$1");
    text.into_owned()
}

/// Trim and collapse runs of blank lines.
pub fn clean_text(content: &str) -> String {
    cleaners()
        .blank_runs
        .replace_all(content.trim(), "\n\n")
        .into_owned()
}

pub fn infer_category(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, category)| *category)
        .unwrap_or("general")
}

/// All `*.md` files directly inside `dir`.
pub fn load_markdown_files(dir: &Path) -> Result<Vec<Document>> {
    load_matching(dir, &["*.md".to_string()], &[], false)
}

/// All `*.txt` files directly inside `dir`.
pub fn load_text_files(dir: &Path) -> Result<Vec<Document>> {
    load_matching(dir, &["*.txt".to_string()], &[], false)
}

/// Load the configured knowledge base: markdown files first, then text
/// files, each group sorted by relative path.
pub fn load_all_documents(config: &KnowledgeBaseConfig) -> Result<Vec<Document>> {
    let docs = load_matching(
        &config.dir,
        &config.include_globs,
        &config.exclude_globs,
        config.recursive,
    )?;
    tracing::info!(
        "Loaded total {} documents from {}",
        docs.len(),
        config.dir.display()
    );
    Ok(docs)
}

fn load_matching(
    dir: &Path,
    include_globs: &[String],
    exclude_globs: &[String],
    recursive: bool,
) -> Result<Vec<Document>> {
    if !dir.is_dir() {
        tracing::error!("Knowledge base directory does not exist: {}", dir.display());
        return Ok(Vec::new());
    }

    let include_set = build_globset(include_globs)?;
    let exclude_set = build_globset(exclude_globs)?;

    let mut walker = WalkDir::new(dir).min_depth(1);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut docs = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();
        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        if let Some(doc) = load_file(path) {
            docs.push(doc);
        }
    }

    docs.sort_by(|a, b| {
        (a.metadata.file_type != "markdown", &a.metadata.file_path)
            .cmp(&(b.metadata.file_type != "markdown", &b.metadata.file_path))
    });
    Ok(docs)
}

fn load_file(path: &Path) -> Option<Document> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!("Failed to read {}: {}", path.display(), e);
            return None;
        }
    };

    let is_markdown = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md") | Some("markdown")
    );
    let (content, file_type) = if is_markdown {
        (clean_markdown(&raw), "markdown")
    } else {
        (clean_text(&raw), "text")
    };
    if content.is_empty() {
        tracing::debug!("Skipping empty file {}", path.display());
        return None;
    }

    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Some(Document {
        content,
        metadata: DocumentMetadata {
            category: infer_category(&source).to_string(),
            source,
            file_path: path.display().to_string(),
            file_type: file_type.to_string(),
        },
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Drop documents that are too short or have no source.
pub fn validate_documents(documents: Vec<Document>) -> Vec<Document> {
    let total = documents.len();
    let valid: Vec<Document> = documents
        .into_iter()
        .filter(|doc| {
            let ok = doc.content.trim().chars().count() >= MIN_DOCUMENT_CHARS
                && !doc.metadata.source.is_empty();
            if !ok {
                tracing::warn!("Dropping invalid document {:?}", doc.metadata.source);
            }
            ok
        })
        .collect();
    tracing::info!("Validated {}/{} documents", valid.len(), total);
    valid
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentStats {
    pub total_documents: usize,
    pub categories: BTreeMap<String, usize>,
    pub file_types: BTreeMap<String, usize>,
    pub total_characters: usize,
    pub average_document_length: f64,
}

pub fn document_stats(documents: &[Document]) -> DocumentStats {
    let mut stats = DocumentStats {
        total_documents: documents.len(),
        ..Default::default()
    };
    for doc in documents {
        *stats
            .categories
            .entry(doc.metadata.category.clone())
            .or_default() += 1;
        *stats
            .file_types
            .entry(doc.metadata.file_type.clone())
            .or_default() += 1;
        stats.total_characters += doc.content.chars().count();
    }
    if !documents.is_empty() {
        stats.average_document_length = stats.total_characters as f64 / documents.len() as f64;
    }
    stats
}
