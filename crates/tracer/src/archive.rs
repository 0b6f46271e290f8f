use crate::catalog::MatcherDescriptor;
use crate::config::{ArchiveCompression, TraceFormat};
use crate::error::{ArchiveFailure, Result, TraceError};
use crate::event::{EventRecord, NodeRecord};
use crate::summary::RunSummary;
use crate::writer::StagedTrace;
use log::{debug, info, warn};
use rule_trace_engine::TextBuffer;
use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const INPUT_ENTRY: &str = "input.txt";
pub const MATCHERS_ENTRY: &str = "matchers.csv";
pub const INFO_ENTRY: &str = "info.csv";

/// Everything needed to publish one archive
#[derive(Debug)]
pub(crate) struct ArchivePlan {
    pub target: PathBuf,
    /// Directory of `target`; the temp archive must share its filesystem
    pub archive_dir: PathBuf,
    pub compression: ArchiveCompression,
    pub input: TextBuffer,
    pub matchers: Vec<MatcherDescriptor>,
    pub staged: StagedTrace,
    pub summary: RunSummary,
}

impl ArchivePlan {
    /// Write the archive beside the target, then move it into place.
    ///
    /// The target name only ever refers to a complete archive; an existing
    /// file there is never replaced.
    pub fn publish(self) -> Result<PathBuf> {
        let Self {
            target,
            archive_dir,
            compression,
            input,
            matchers,
            mut staged,
            summary,
        } = self;

        let mut temp = match tempfile::Builder::new()
            .prefix(".rule-trace-")
            .suffix(".zip.part")
            .tempfile_in(&archive_dir)
        {
            Ok(temp) => temp,
            Err(err) => {
                let mut failure = ArchiveFailure::new("create archive temp file", err);
                if let Err(cleanup) = staged.file.close() {
                    failure.suppress(cleanup);
                }
                return Err(failure.into());
            }
        };

        let written = write_entries(
            &mut temp,
            compression,
            &input,
            &matchers,
            &mut staged,
            &summary,
        );
        let staged_removed = staged.file.close();
        if let Err(mut failure) = written {
            if let Err(cleanup) = temp.close() {
                failure.suppress(cleanup);
            }
            if let Err(cleanup) = staged_removed {
                failure.suppress(cleanup);
            }
            return Err(failure.into());
        }

        match temp.persist_noclobber(&target) {
            Ok(_) => {
                if let Err(err) = staged_removed {
                    warn!("failed to remove staging file: {err}");
                }
                info!(
                    "trace archive written to {} ({} events, {} matchers)",
                    target.display(),
                    summary.event_count,
                    summary.matcher_count
                );
                Ok(target)
            }
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                if let Err(cleanup) = err.file.close() {
                    warn!("failed to remove archive temp file: {cleanup}");
                }
                Err(TraceError::ArchiveExists(target))
            }
            Err(err) => {
                let mut failure = ArchiveFailure::new("publish archive", err.error);
                if let Err(cleanup) = err.file.close() {
                    failure.suppress(cleanup);
                }
                if let Err(cleanup) = staged_removed {
                    failure.suppress(cleanup);
                }
                Err(failure.into())
            }
        }
    }
}

fn write_entries(
    temp: &mut NamedTempFile,
    compression: ArchiveCompression,
    input: &TextBuffer,
    matchers: &[MatcherDescriptor],
    staged: &mut StagedTrace,
    summary: &RunSummary,
) -> std::result::Result<(), ArchiveFailure> {
    let method = match compression {
        ArchiveCompression::Deflated => CompressionMethod::Deflated,
        ArchiveCompression::Stored => CompressionMethod::Stored,
    };
    let options = SimpleFileOptions::default().compression_method(method);
    let mut zip = ZipWriter::new(temp.as_file_mut());

    zip.start_file(INPUT_ENTRY, options)
        .map_err(zip_io)
        .and_then(|()| zip.write_all(input.text().as_bytes()))
        .map_err(|err| ArchiveFailure::new("write input text", err))?;

    zip.start_file(MATCHERS_ENTRY, options)
        .map_err(zip_io)
        .and_then(|()| {
            for descriptor in matchers {
                zip.write_all(descriptor.to_row().as_bytes())?;
            }
            Ok(())
        })
        .map_err(|err| ArchiveFailure::new("write matcher table", err))?;

    zip.start_file(staged.format.entry_name(), options)
        .map_err(zip_io)
        .and_then(|()| staged.file.rewind())
        .and_then(|()| io::copy(&mut staged.file, &mut zip))
        .map_err(|err| ArchiveFailure::new("copy trace table", err))?;

    // Totals go last, once the input text is in place
    zip.start_file(INFO_ENTRY, options)
        .map_err(zip_io)
        .and_then(|()| zip.write_all(summary.to_row().as_bytes()))
        .map_err(|err| ArchiveFailure::new("write run summary", err))?;

    let file = zip
        .finish()
        .map_err(|err| ArchiveFailure::new("finish archive", zip_io(err)))?;
    file.sync_all()
        .map_err(|err| ArchiveFailure::new("sync archive", err))?;
    debug!("archive staged at {}", temp.path().display());
    Ok(())
}

fn zip_io(err: ZipError) -> io::Error {
    match err {
        ZipError::Io(err) => err,
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}

/// Trace table as read back from an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceTable {
    Nodes(Vec<NodeRecord>),
    Events(Vec<EventRecord>),
}

impl TraceTable {
    #[must_use]
    pub fn format(&self) -> TraceFormat {
        match self {
            Self::Nodes(_) => TraceFormat::Nodes,
            Self::Events(_) => TraceFormat::Events,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Nodes(rows) => rows.len(),
            Self::Events(events) => events.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A published archive, fully decoded
#[derive(Debug, Clone)]
pub struct TraceArchive {
    pub input: String,
    pub matchers: Vec<MatcherDescriptor>,
    pub trace: TraceTable,
    pub summary: RunSummary,
    pub entries: Vec<String>,
}

impl TraceArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|err| TraceError::io("open archive", err))?;
        let mut zip = ZipArchive::new(file)
            .map_err(|err| TraceError::io("read archive directory", zip_io(err)))?;
        let entries: Vec<String> = zip.file_names().map(str::to_string).collect();

        let input = read_entry(&mut zip, INPUT_ENTRY)?;
        let matchers = read_entry(&mut zip, MATCHERS_ENTRY)?
            .lines()
            .map(|row| MatcherDescriptor::from_row(row).map_err(|err| TraceError::malformed(MATCHERS_ENTRY, err.0)))
            .collect::<Result<Vec<_>>>()?;

        let trace = if entries.iter().any(|name| name == TraceFormat::Events.entry_name()) {
            let raw = read_entry(&mut zip, TraceFormat::Events.entry_name())?;
            let events = serde_json::from_str(&raw).map_err(|err| {
                TraceError::malformed(TraceFormat::Events.entry_name(), err.to_string())
            })?;
            TraceTable::Events(events)
        } else {
            let raw = read_entry(&mut zip, TraceFormat::Nodes.entry_name())?;
            let rows = raw
                .lines()
                .map(|row| {
                    NodeRecord::from_row(row)
                        .map_err(|err| TraceError::malformed(TraceFormat::Nodes.entry_name(), err.0))
                })
                .collect::<Result<Vec<_>>>()?;
            TraceTable::Nodes(rows)
        };

        let info = read_entry(&mut zip, INFO_ENTRY)?;
        let summary = RunSummary::from_row(info.trim_end_matches('\n'))
            .map_err(|err| TraceError::malformed(INFO_ENTRY, err.0))?;

        Ok(Self {
            input,
            matchers,
            trace,
            summary,
            entries,
        })
    }
}

fn read_entry(zip: &mut ZipArchive<File>, name: &str) -> Result<String> {
    let mut entry = zip
        .by_name(name)
        .map_err(|err| match err {
            ZipError::FileNotFound => TraceError::malformed(name, "entry missing"),
            other => TraceError::io(format!("open entry {name}"), zip_io(other)),
        })?;
    let mut raw = String::new();
    entry
        .read_to_string(&mut raw)
        .map_err(|err| TraceError::io(format!("read entry {name}"), err))?;
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MatcherId;
    use crate::classifier::MatcherCategory;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn staged_nodes(dir: &Path, rows: &str) -> StagedTrace {
        let mut file = NamedTempFile::new_in(dir).expect("staging file");
        file.write_all(rows.as_bytes()).expect("write rows");
        StagedTrace {
            file,
            format: TraceFormat::Nodes,
            event_count: 2,
            node_count: 1,
        }
    }

    fn plan(dir: &TempDir, target: PathBuf) -> ArchivePlan {
        ArchivePlan {
            archive_dir: target.parent().expect("parent").to_path_buf(),
            target,
            compression: ArchiveCompression::Deflated,
            input: TextBuffer::new("a;b\n"),
            matchers: vec![MatcherDescriptor {
                id: MatcherId(0),
                class_name: "AnyOfMatcher".to_string(),
                category: MatcherCategory::Terminal,
                label: "[;]".to_string(),
            }],
            staged: staged_nodes(dir.path(), "-1;0;0;1;0;0;1;42\n"),
            summary: RunSummary {
                start_time_millis: 1,
                event_count: 2,
                matcher_count: 1,
                line_count: 2,
                char_count: 4,
                code_point_count: 4,
                node_count: 1,
            },
        }
    }

    #[test]
    fn publishes_all_entries_in_order() {
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("trace.zip");
        let published = plan(&dir, target.clone()).publish().expect("publish");
        assert_eq!(published, target);

        let archive = TraceArchive::open(&target).expect("open");
        assert_eq!(
            archive.entries,
            vec!["input.txt", "matchers.csv", "nodes.csv", "info.csv"]
        );
        assert_eq!(archive.input, "a;b\n");
        assert_eq!(archive.matchers[0].label, "[;]");
        assert_eq!(archive.summary.code_point_count, 4);
        match archive.trace {
            TraceTable::Nodes(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].elapsed_nanos, 42);
            }
            other => panic!("unexpected table {other:?}"),
        }

        // Only the archive remains; staging files are gone
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .map(|e| e.expect("entry").file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("trace.zip")]);
    }

    #[test]
    fn existing_target_is_never_replaced() {
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("trace.zip");
        std::fs::write(&target, b"keep me").expect("seed target");

        let err = plan(&dir, target.clone()).publish().unwrap_err();
        assert!(matches!(err, TraceError::ArchiveExists(ref path) if *path == target));
        assert_eq!(std::fs::read(&target).expect("read"), b"keep me");
        assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 1);
    }

    #[test]
    fn stored_archives_read_back() {
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("stored.zip");
        let mut plan = plan(&dir, target.clone());
        plan.compression = ArchiveCompression::Stored;
        plan.publish().expect("publish");
        let archive = TraceArchive::open(&target).expect("open");
        assert_eq!(archive.trace.format(), TraceFormat::Nodes);
    }

    fn dir_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .expect("read dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn archive_is_assembled_beside_target_not_in_staging_dir() {
        let staging = TempDir::new().expect("staging dir");
        let out = TempDir::new().expect("archive dir");
        let target = out.path().join("trace.zip");

        plan(&staging, target.clone()).publish().expect("publish");
        assert!(dir_names(staging.path()).is_empty());
        assert_eq!(dir_names(out.path()), vec!["trace.zip"]);
        TraceArchive::open(&target).expect("open");
    }

    #[test]
    fn failed_write_keeps_cleanup_errors() {
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("trace.zip");
        let mut plan = plan(&dir, target.clone());

        // A write-only handle makes copying the trace table fail
        let placeholder = NamedTempFile::new_in(dir.path()).expect("placeholder");
        let staged = std::mem::replace(&mut plan.staged.file, placeholder);
        let (_, staged_path) = staged.into_parts();
        let write_only = std::fs::OpenOptions::new()
            .write(true)
            .open(&staged_path)
            .expect("reopen staged");
        // Removal will fail: the file is already gone
        std::fs::remove_file(&staged_path).expect("unlink staged");
        plan.staged.file = NamedTempFile::from_parts(write_only, staged_path);

        let err = plan.publish().unwrap_err();
        let TraceError::ArchiveIo(failure) = err else {
            panic!("expected an archive I/O failure, got {err}");
        };
        assert_eq!(failure.context(), "copy trace table");
        assert_eq!(failure.suppressed().len(), 1);
        assert_eq!(failure.suppressed()[0].kind(), io::ErrorKind::NotFound);
        assert!(!target.exists());
        assert!(dir_names(dir.path()).is_empty());
    }

    #[test]
    fn missing_archive_dir_reports_staging_cleanup() {
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("gone").join("trace.zip");
        let plan = plan(&dir, target);
        std::fs::remove_file(plan.staged.path()).expect("unlink staged");

        let err = plan.publish().unwrap_err();
        let TraceError::ArchiveIo(failure) = err else {
            panic!("expected an archive I/O failure, got {err}");
        };
        assert_eq!(failure.context(), "create archive temp file");
        assert_eq!(failure.suppressed().len(), 1);
    }

    #[test]
    fn missing_archive_is_an_io_error() {
        let dir = TempDir::new().expect("tempdir");
        let err = TraceArchive::open(&dir.path().join("absent.zip")).unwrap_err();
        assert!(matches!(err, TraceError::ArchiveIo(_)));
    }
}
