//! Mount table enumeration.
//!
//! Parses `/proc/self/mountinfo`, which lists mounts in the order they were
//! created. That order matters: parents always precede their children, so a
//! replay of the list moves parents first.

use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};

use hostroot_common::error::{HostrootError, Result};

/// One line of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Mount source (device, `tmpfs`, `overlay`, ...).
    pub source: String,
    /// Where the filesystem is mounted.
    pub mountpoint: PathBuf,
    /// Filesystem type.
    pub fstype: String,
}

impl MountEntry {
    /// Creates an entry from its three fields.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        mountpoint: impl Into<PathBuf>,
        fstype: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            mountpoint: mountpoint.into(),
            fstype: fstype.into(),
        }
    }
}

/// Reads and parses a mountinfo file.
///
/// Mount points are raw bytes and need not be valid UTF-8.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn read(path: &Path) -> Result<Vec<MountEntry>> {
    let content = std::fs::read(path).map_err(|e| HostrootError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(parse(&content))
}

/// Parses mountinfo content, skipping lines that do not have the expected shape.
#[must_use]
pub fn parse(content: &[u8]) -> Vec<MountEntry> {
    content
        .split(|b| *b == b'\n')
        .filter_map(|line| {
            let entry = parse_line(line);
            if entry.is_none() && !line.trim_ascii().is_empty() {
                tracing::debug!(
                    line = %String::from_utf8_lossy(line),
                    "skipping malformed mountinfo line"
                );
            }
            entry
        })
        .collect()
}

// Format: id parent major:minor root mountpoint options [optional...] - fstype source superopts
fn parse_line(line: &[u8]) -> Option<MountEntry> {
    let fields: Vec<&[u8]> = line
        .split(|b| *b == b' ')
        .filter(|field| !field.is_empty())
        .collect();
    let mountpoint = fields.get(4)?;
    let separator = fields.iter().skip(6).position(|field| *field == b"-")? + 6;
    let fstype = fields.get(separator + 1)?;
    let source = fields.get(separator + 2)?;

    Some(MountEntry {
        source: String::from_utf8_lossy(&unescape(source)).into_owned(),
        mountpoint: PathBuf::from(OsString::from_vec(unescape(mountpoint))),
        fstype: String::from_utf8_lossy(fstype).into_owned(),
    })
}

/// Decodes the kernel's `\ooo` octal escapes (space, tab, newline, backslash).
fn unescape(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let decoded = (bytes[i] == b'\\')
            .then(|| bytes.get(i + 1..i + 4))
            .flatten()
            .filter(|digits| digits.iter().all(|d| (b'0'..=b'7').contains(d)))
            .and_then(|digits| {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                u8::try_from(value).ok()
            });
        if let Some(byte) = decoded {
            out.push(byte);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    out
}
