//! In-process file copies into the image and the ISO tree.

use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Copies `source` to `dest`, creating parent directories.
///
/// Returns a `'source' -> 'dest'` line for the progress stream.
pub fn copy_file(source: &Path, dest: &Path) -> io::Result<String> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(source, dest)?;
    Ok(copy_line(source, dest))
}

/// Recursively copies the directory `source` so that it becomes `dest`.
///
/// Symlinks are followed. Returns one line per copied entry, in walk order.
pub fn copy_tree(source: &Path, dest: &Path) -> io::Result<Vec<String>> {
    let mut lines = Vec::new();
    for entry in WalkDir::new(source).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
            lines.push(copy_line(entry.path(), &target));
        } else {
            lines.push(copy_file(entry.path(), &target)?);
        }
    }
    Ok(lines)
}

fn copy_line(source: &Path, dest: &Path) -> String {
    format!("'{}' -> '{}'", source.display(), dest.display())
}
