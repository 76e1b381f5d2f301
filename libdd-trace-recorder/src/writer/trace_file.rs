// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Trace output files: naming, header block and the compressed stream.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const TRACE_FORMAT_VERSION: u32 = 3;
/// Timestamps are in nanoseconds but only microseconds are meaningful.
pub const TIMESTAMP_PRECISION: u32 = 6;
pub const TRACE_FILE_EXTENSION: &str = "trace.gz";
pub const IN_PROGRESS_SUFFIX: &str = ".tmp";

pub type TraceOutput = GzEncoder<BufWriter<File>>;

/// URL-safe base64 of the big-endian trace id, usable in file names.
pub fn encode_trace_id(trace_id: i64) -> String {
    URL_SAFE_NO_PAD.encode(trace_id.to_be_bytes())
}

/// Final location of a completed trace.
pub fn trace_file_path(folder: &Path, prefix: &str, pid: i32, trace_id: i64) -> PathBuf {
    folder.join(format!(
        "{prefix}-{pid}-{}.{TRACE_FILE_EXTENSION}",
        encode_trace_id(trace_id)
    ))
}

/// Where a trace is written until it completes.
pub fn in_progress_path(final_path: &Path) -> PathBuf {
    let mut name = OsString::from(final_path.as_os_str());
    name.push(IN_PROGRESS_SUFFIX);
    PathBuf::from(name)
}

/// Creates (or truncates) the file at `path`, creating its folder first.
pub fn open_trace_file(path: &Path, compression_level: u32) -> io::Result<TraceOutput> {
    if let Some(folder) = path.parent() {
        fs::create_dir_all(folder)?;
    }
    let file = File::create(path)?;
    Ok(GzEncoder::new(
        BufWriter::new(file),
        Compression::new(compression_level),
    ))
}

pub fn write_headers<W: Write>(
    out: &mut W,
    trace_id: i64,
    headers: &[(String, String)],
) -> io::Result<()> {
    writeln!(out, "dt")?;
    writeln!(out, "ver|{TRACE_FORMAT_VERSION}")?;
    writeln!(out, "id|{}", encode_trace_id(trace_id))?;
    writeln!(out, "prec|{TIMESTAMP_PRECISION}")?;
    for (key, value) in headers {
        writeln!(out, "{key}|{value}")?;
    }
    writeln!(out)
}

/// Writes the gzip trailer, flushes everything to disk and moves the file
/// from `in_progress` to `final_path`.
pub fn complete_trace_file(
    output: TraceOutput,
    in_progress: &Path,
    final_path: &Path,
) -> io::Result<()> {
    let writer = output.finish()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);
    fs::rename(in_progress, final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn trace_ids_encode_as_url_safe_base64() {
        assert_eq!(encode_trace_id(0), "AAAAAAAAAAA");
        assert_eq!(encode_trace_id(1), "AAAAAAAAAAE");
        assert_eq!(encode_trace_id(-1), "__________8");
    }

    #[test]
    fn paths() {
        let path = trace_file_path(Path::new("/data/traces"), "app", 42, 1);
        assert_eq!(path, Path::new("/data/traces/app-42-AAAAAAAAAAE.trace.gz"));
        assert_eq!(
            in_progress_path(&path),
            Path::new("/data/traces/app-42-AAAAAAAAAAE.trace.gz.tmp")
        );
    }

    #[test]
    fn headers_then_complete() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = trace_file_path(&dir.path().join("nested"), "t", 1, 5);
        let tmp = in_progress_path(&final_path);

        let mut output = open_trace_file(&tmp, 6).unwrap();
        write_headers(
            &mut output,
            5,
            &[("os".to_string(), "linux".to_string())],
        )
        .unwrap();
        writeln!(output, "1|TRACE_START|0|0|0|0|5").unwrap();
        complete_trace_file(output, &tmp, &final_path).unwrap();

        assert!(!tmp.exists());
        let mut text = String::new();
        GzDecoder::new(File::open(&final_path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(
            text,
            format!(
                "dt\nver|{TRACE_FORMAT_VERSION}\nid|AAAAAAAAAAU\nprec|6\nos|linux\n\n1|TRACE_START|0|0|0|0|5\n"
            )
        );
    }
}
