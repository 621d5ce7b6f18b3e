use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

/// JSONL mirror of stdout. Set once in main(), read by emit().
static JSONL_WRITER: OnceLock<Mutex<BufWriter<File>>> = OnceLock::new();

/// `<dir>/<identity>_<mode>_<YYYYMMDD-HHMMSS>.jsonl`, with `_2`, `_3`...
/// appended when a run in the same second already wrote one.
pub fn resolve_output_path(dir: &Path, identity: &str, mode: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let base = format!("{identity}_{mode}_{stamp}");
    let mut path = dir.join(format!("{base}.jsonl"));
    let mut n = 2;
    while path.exists() {
        path = dir.join(format!("{base}_{n}.jsonl"));
        n += 1;
    }
    Ok(path)
}

pub fn init_jsonl_writer(path: &Path) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    JSONL_WRITER
        .set(Mutex::new(BufWriter::new(file)))
        .map_err(|_| io::Error::new(io::ErrorKind::AlreadyExists, "JSONL writer already set"))
}

pub fn write_jsonl_line(line: &str) {
    let Some(writer) = JSONL_WRITER.get() else {
        return;
    };
    let mut w = writer.lock().unwrap_or_else(|e| e.into_inner());
    let _ = writeln!(w, "{line}");
    let _ = w.flush();
}
