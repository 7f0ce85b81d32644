//! Conversation log discovery.
//!
//! Walks the data directory for `*.jsonl` files, skipping hidden
//! directories (except `.claude`) and anything matched by an exclude
//! pattern. Unreadable subdirectories are skipped; only a failure on the
//! root itself is fatal.

use std::fs;
use std::path::{Component, Path};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::sync::types::{LogFile, SyncError, SyncResult};

/// Extension of conversation log files.
pub const LOG_EXTENSION: &str = "jsonl";

/// Hidden directory that is still walked.
const CLAUDE_DIR: &str = ".claude";

/// Scan `root` for conversation logs.
///
/// Results are in lexical walk order.
///
/// # Errors
///
/// Returns [`SyncError::Scan`] if the root cannot be read.
pub fn scan(root: &Path, exclude_patterns: &[String]) -> SyncResult<Vec<LogFile>> {
    fs::read_dir(root).map_err(|source| SyncError::Scan {
        path: root.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                if e.depth() == 0 {
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("walk failed at root"));
                    return Err(SyncError::Scan {
                        path: root.to_path_buf(),
                        source,
                    });
                }
                debug!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }

        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let Some(session_id) = session_id_from_name(name) else {
            continue;
        };

        let path = entry.path();
        if is_excluded(path, exclude_patterns) {
            debug!(path = %path.display(), "Excluded by pattern");
            continue;
        }

        let (modified, size) = match entry.metadata() {
            Ok(meta) => (
                meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                meta.len(),
            ),
            Err(_) => (SystemTime::UNIX_EPOCH, 0),
        };

        let relative = path.strip_prefix(root).unwrap_or(path);
        files.push(LogFile {
            path: path.to_path_buf(),
            project_path: project_path(relative),
            session_id: session_id.to_string(),
            modified: DateTime::<Utc>::from(modified),
            size,
        });
    }

    Ok(files)
}

/// Hidden directories are pruned, except `.claude`.
fn is_skipped_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.') && name != CLAUDE_DIR)
}

/// Strip the log extension; `None` for non-log files.
fn session_id_from_name(name: &str) -> Option<&str> {
    name.strip_suffix(LOG_EXTENSION)?.strip_suffix('.')
}

/// Derive the project path from a root-relative file path.
#[must_use]
pub fn project_path(relative: &Path) -> String {
    let parts: Vec<String> = relative
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// A file is excluded when its basename glob-matches a pattern, or its full
/// path contains a pattern verbatim.
#[must_use]
pub fn is_excluded(path: &Path, patterns: &[String]) -> bool {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let full = path.to_string_lossy();

    patterns
        .iter()
        .any(|pattern| glob_match(pattern, &base) || full.contains(pattern.as_str()))
}

/// Shell-style glob match of a whole name.
///
/// Supports `*`, `?`, `[...]` classes (with `^` negation and `a-z` ranges)
/// and `\` escapes. `*` and `?` never match `/`. A malformed pattern never
/// matches.
#[must_use]
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    match_here(&pattern, &name).unwrap_or(false)
}

/// `None` means the pattern is malformed.
fn match_here(pattern: &[char], name: &[char]) -> Option<bool> {
    let Some(&first) = pattern.first() else {
        return Some(name.is_empty());
    };

    match first {
        '*' => {
            let rest = &pattern[1..];
            for skip in 0..=name.len() {
                if skip > 0 && name[skip - 1] == '/' {
                    break;
                }
                if match_here(rest, &name[skip..])? {
                    return Some(true);
                }
            }
            Some(false)
        }
        '?' => match name.first() {
            Some(&c) if c != '/' => match_here(&pattern[1..], &name[1..]),
            _ => Some(false),
        },
        '[' => {
            let (matched, used) = match_class(&pattern[1..], name.first().copied())?;
            if matched {
                match_here(&pattern[1 + used..], &name[1..])
            } else {
                Some(false)
            }
        }
        '\\' => {
            let &literal = pattern.get(1)?;
            if name.first() == Some(&literal) {
                match_here(&pattern[2..], &name[1..])
            } else {
                Some(false)
            }
        }
        literal => {
            if name.first() == Some(&literal) {
                match_here(&pattern[1..], &name[1..])
            } else {
                Some(false)
            }
        }
    }
}

/// Match one character against a class body (the text after `[`).
///
/// Returns whether it matched and how many pattern chars the class used,
/// including the closing `]`.
fn match_class(class: &[char], c: Option<char>) -> Option<(bool, usize)> {
    let mut i = 0;
    let negated = class.first() == Some(&'^');
    if negated {
        i += 1;
    }

    let mut matched = false;
    let mut ranges = 0;
    loop {
        match class.get(i) {
            None => return None,
            Some(']') if ranges > 0 => {
                i += 1;
                break;
            }
            _ => {}
        }

        let (lo, next) = class_char(class, i)?;
        i = next;
        let mut hi = lo;
        if class.get(i) == Some(&'-') {
            let (end, next) = class_char(class, i + 1)?;
            hi = end;
            i = next;
        }

        if c.is_some_and(|c| lo <= c && c <= hi) {
            matched = true;
        }
        ranges += 1;
    }

    // An empty name cannot satisfy any class, negated or not.
    Some((c.is_some() && matched != negated, i))
}

fn class_char(class: &[char], i: usize) -> Option<(char, usize)> {
    match *class.get(i)? {
        '\\' => class.get(i + 1).map(|&c| (c, i + 2)),
        '-' | ']' => None,
        c => Some((c, i + 1)),
    }
}
