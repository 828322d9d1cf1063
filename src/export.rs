use std::fs;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::info;

use crate::error::CatalogError;
use crate::store::write_atomic;

const SKIPPED_DIRS: [&str; 2] = ["_next", "node_modules"];

static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(href|src|action)="/([^/"][^"]*)""#).expect("valid attribute pattern")
});

static BARE_ASSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^"'./\w-])/(_next/|images/|media/|data/|logo\.png|footer\.png)"#)
        .expect("valid asset pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewrittenFile {
    pub path: Utf8PathBuf,
    pub prefix: String,
    pub changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub root: Utf8PathBuf,
    pub files: Vec<RewrittenFile>,
}

impl ExportReport {
    pub fn changed_count(&self) -> usize {
        self.files.iter().filter(|file| file.changed).count()
    }
}

/// `./` for files in the export root, `../` for each level below it.
pub fn relative_prefix(file_dir: &Utf8Path, root: &Utf8Path) -> String {
    let depth = file_dir
        .strip_prefix(root)
        .map(|relative| {
            relative
                .components()
                .filter(|component| component.as_str() != ".")
                .count()
        })
        .unwrap_or(0);
    if depth == 0 {
        "./".to_string()
    } else {
        "../".repeat(depth)
    }
}

pub fn rewrite_document(html: &str, prefix: &str) -> String {
    let attributes = ATTRIBUTE_RE.replace_all(html, |caps: &Captures| {
        format!(r#"{}="{prefix}{}""#, &caps[1], &caps[2])
    });
    BARE_ASSET_RE
        .replace_all(&attributes, |caps: &Captures| {
            format!("{}{prefix}{}", &caps[1], &caps[2])
        })
        .into_owned()
}

pub fn rewrite_tree(root: &Utf8Path) -> Result<ExportReport, CatalogError> {
    if !root.as_std_path().is_dir() {
        return Err(CatalogError::Filesystem(format!(
            "export directory not found: {root}"
        )));
    }
    let mut report = ExportReport {
        root: root.to_path_buf(),
        files: Vec::new(),
    };
    visit(root, root, &mut report)?;
    info!(
        root = %root,
        files = report.files.len(),
        changed = report.changed_count(),
        "export paths rewritten"
    );
    Ok(report)
}

fn visit(dir: &Utf8Path, root: &Utf8Path, report: &mut ExportReport) -> Result<(), CatalogError> {
    let mut entries = dir
        .read_dir_utf8()
        .map_err(|err| CatalogError::Filesystem(format!("read {dir}: {err}")))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| CatalogError::Filesystem(format!("read {dir}: {err}")))?;
    entries.sort_by(|a, b| a.file_name().cmp(b.file_name()));

    for entry in entries {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|err| CatalogError::Filesystem(format!("stat {path}: {err}")))?;
        if file_type.is_dir() {
            if !SKIPPED_DIRS.contains(&entry.file_name()) {
                visit(path, root, report)?;
            }
        } else if path.extension() == Some("html") {
            report.files.push(rewrite_file(path, root)?);
        }
    }
    Ok(())
}

fn rewrite_file(path: &Utf8Path, root: &Utf8Path) -> Result<RewrittenFile, CatalogError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| CatalogError::Filesystem(format!("read {path}: {err}")))?;
    let prefix = relative_prefix(path.parent().unwrap_or(root), root);
    let rewritten = rewrite_document(&content, &prefix);
    let changed = rewritten != content;
    if changed {
        write_atomic(path, rewritten.as_bytes())?;
    }
    info!(path = %path, prefix = %prefix, changed, "fixed export paths");
    Ok(RewrittenFile {
        path: path.to_path_buf(),
        prefix,
        changed,
    })
}
