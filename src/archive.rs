//! Incremental zip assembly with a per-archive size cap
//!
//! [`ArchiveBuilder`] accumulates entries in memory and refuses an entry that
//! would push the archive past its cap, so the caller can finalize the current
//! shard and continue in a new one. All methods are synchronous; async callers
//! run them on the blocking pool.

use crate::config::{ArchiveConfig, Compression};
use crate::error::ArchiveError;
use crate::types::ExportItem;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Characters never allowed in an entry name
const FORBIDDEN_CHARS: &[char] = &['/', '\\', '?', '%', '*', ':', '|', '"', '<', '>'];

/// Make a display name safe to use as a flat zip entry name
///
/// Path separators and shell/Windows-hostile characters become `-`, runs of
/// whitespace become a single `_`, leading dots are stripped (no hidden files,
/// no `..`), and the result is cut to `max_len` characters. May return an
/// empty string.
pub fn sanitize_entry_name(name: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_whitespace = false;

    for c in name.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;

        if FORBIDDEN_CHARS.contains(&c) || c.is_control() {
            out.push('-');
        } else {
            out.push(c);
        }
    }

    out.trim_start_matches('.').chars().take(max_len).collect()
}

/// Entry name for an item: its sanitized display name, or `file-{id}`
pub fn entry_name_for(item: &ExportItem, max_len: usize) -> String {
    let name = sanitize_entry_name(&item.display_name, max_len);
    if !name.is_empty() {
        return name;
    }

    let fallback = sanitize_entry_name(&format!("file-{}", item.id), max_len);
    if fallback.is_empty() {
        "file".to_string()
    } else {
        fallback
    }
}

/// A finalized archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedArchive {
    /// Encoded zip file
    pub bytes: Vec<u8>,
    /// Sum of raw entry sizes
    pub content_bytes: u64,
    /// Number of entries
    pub entry_count: usize,
}

impl FinishedArchive {
    /// Size of the encoded zip file
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// In-memory zip archive under construction
pub struct ArchiveBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    options: FileOptions,
    max_bytes: u64,
    max_name_len: usize,
    current_bytes: u64,
    entry_count: usize,
    names: HashSet<String>,
}

impl std::fmt::Debug for ArchiveBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveBuilder")
            .field("max_bytes", &self.max_bytes)
            .field("current_bytes", &self.current_bytes)
            .field("entry_count", &self.entry_count)
            .finish()
    }
}

impl ArchiveBuilder {
    /// Start an empty archive
    pub fn begin(config: &ArchiveConfig) -> Self {
        let options = match config.compression {
            Compression::Stored => {
                FileOptions::default().compression_method(CompressionMethod::Stored)
            }
            Compression::Deflated => FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(config.compression_level),
        };

        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            options,
            max_bytes: config.max_archive_bytes,
            max_name_len: config.max_entry_name_len,
            current_bytes: 0,
            entry_count: 0,
            names: HashSet::new(),
        }
    }

    /// Sum of raw entry sizes so far
    pub fn current_bytes(&self) -> u64 {
        self.current_bytes
    }

    /// Number of entries so far
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Whether no entry has been added
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Append an entry, returning the name it was stored under
    ///
    /// The name is sanitized and made unique within the archive. Nothing is
    /// written when an error is returned.
    pub fn add_entry(&mut self, name: &str, data: &[u8]) -> Result<String, ArchiveError> {
        let entry_bytes = data.len() as u64;

        if entry_bytes > self.max_bytes {
            return Err(ArchiveError::EntryTooLarge {
                entry_bytes,
                max_bytes: self.max_bytes,
            });
        }
        if self.entry_count > 0 && self.current_bytes + entry_bytes > self.max_bytes {
            return Err(ArchiveError::ArchiveFull {
                current_bytes: self.current_bytes,
                entry_bytes,
                max_bytes: self.max_bytes,
            });
        }

        let stored_name = self.unique_name(name);
        self.writer.start_file(stored_name.clone(), self.options)?;
        self.writer.write_all(data)?;

        self.names.insert(stored_name.clone());
        self.current_bytes += entry_bytes;
        self.entry_count += 1;

        Ok(stored_name)
    }

    /// Write the central directory and return the encoded archive
    pub fn finalize(mut self) -> Result<FinishedArchive, ArchiveError> {
        let cursor = self.writer.finish()?;
        Ok(FinishedArchive {
            bytes: cursor.into_inner(),
            content_bytes: self.current_bytes,
            entry_count: self.entry_count,
        })
    }

    fn unique_name(&self, name: &str) -> String {
        let mut base = sanitize_entry_name(name, self.max_name_len);
        if base.is_empty() {
            base = "file".to_string();
        }
        if !self.names.contains(&base) {
            return base;
        }

        let (stem, ext) = match base.rfind('.') {
            Some(idx) if idx > 0 => base.split_at(idx),
            _ => (base.as_str(), ""),
        };

        (2u32..)
            .map(|n| {
                let suffix = format!("-{n}{ext}");
                let room = self.max_name_len.saturating_sub(suffix.chars().count());
                let stem: String = stem.chars().take(room).collect();
                format!("{stem}{suffix}")
            })
            .find(|candidate| !self.names.contains(candidate))
            .unwrap_or(base.clone())
    }
}
