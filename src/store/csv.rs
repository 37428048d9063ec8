// src/store/csv.rs

use anyhow::{Context, Result};
use csv::WriterBuilder;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

/// Every CSV this crate writes starts with a UTF-8 byte-order marker so that
/// spreadsheet tools pick the right encoding.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Write `path` through a hidden temporary sibling and rename it into place,
/// so readers never observe a half-written file.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp = tmp_path(path);
    let file = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    let mut out = BufWriter::new(file);

    if let Err(e) = write(&mut out).and_then(|_| out.flush().map_err(Into::into)) {
        drop(out);
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    drop(out);

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()));
    }
    Ok(())
}

/// BOM-prefixed, comma-separated, header row first.
pub fn write_csv_atomic<S: AsRef<str>>(
    path: &Path,
    headers: &[S],
    rows: &[Vec<String>],
) -> Result<()> {
    write_atomic(path, |out| {
        out.write_all(UTF8_BOM)?;
        let mut writer = WriterBuilder::new().from_writer(out);
        writer.write_record(headers.iter().map(|h| h.as_ref()))?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}
