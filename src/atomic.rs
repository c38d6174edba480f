//! Write-to-tmp-then-rename helpers shared by the palette renderer, the
//! effect variant generator, and the cache's atomic publish step.

use std::io;
use std::path::Path;

/// Writes `contents` to a temp file beside `path` then renames it into place.
///
/// The rename is atomic on the same filesystem (the common case: the temp
/// file lives in `path`'s own parent directory), so readers never observe a
/// partially-written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tmp".to_string());
    let tmp_path = parent.join(format!(".{file_name}.tmp-{}", std::process::id()));

    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)
}
