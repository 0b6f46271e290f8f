use crate::config::TraceFormat;
use crate::error::{ArchiveFailure, Result, TraceError};
use crate::event::{EventKind, TraceEvent};
use log::{debug, warn};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Queue item; `End` is the end-of-stream marker
#[derive(Debug)]
enum WriterMessage {
    Event(TraceEvent),
    End,
}

/// Producer half of the writer queue. Sending never blocks.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<WriterMessage>,
}

impl EventSender {
    pub fn enqueue(&self, event: TraceEvent) -> Result<()> {
        self.tx
            .send(WriterMessage::Event(event))
            .map_err(|_| TraceError::WriterClosed)
    }

    /// Mark the end of the stream; the writer stops once it gets here
    pub fn end(&self) -> Result<()> {
        self.tx
            .send(WriterMessage::End)
            .map_err(|_| TraceError::WriterClosed)
    }
}

/// The drained trace table, still in its staging file
#[derive(Debug)]
pub struct StagedTrace {
    pub(crate) file: NamedTempFile,
    pub format: TraceFormat,
    /// Events consumed from the queue
    pub event_count: u64,
    /// Invocations seen (ENTER events)
    pub node_count: u64,
}

impl StagedTrace {
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Background serializer for trace events.
///
/// One blocking task pops events in FIFO order and appends them to a staging
/// file next to the archive. It stops only on the end marker; a queue that
/// closes without one means the run was abandoned and the staging file is
/// discarded.
#[derive(Debug)]
pub struct ArchiveWriter {
    sender: EventSender,
    task: JoinHandle<Result<StagedTrace>>,
}

impl ArchiveWriter {
    pub fn spawn(handle: &Handle, format: TraceFormat, staging_dir: &Path) -> Result<Self> {
        Self::spawn_limited(handle, format, staging_dir, None)
    }

    /// Like [`ArchiveWriter::spawn`], failing once the staged table would
    /// grow past `limit` bytes
    pub fn spawn_limited(
        handle: &Handle,
        format: TraceFormat,
        staging_dir: &Path,
        limit: Option<u64>,
    ) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(".rule-trace-")
            .suffix(format.staging_suffix())
            .tempfile_in(staging_dir)
            .map_err(|err| TraceError::io("create staging file", err))?;
        debug!("trace writer staging to {}", file.path().display());

        let staging = StagingFile {
            file,
            remaining: limit,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let task = handle.spawn_blocking(move || drain(rx, staging, format));
        Ok(Self {
            sender: EventSender { tx },
            task,
        })
    }

    #[must_use]
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Wait until every queued event is on disk
    pub async fn finish(self) -> Result<StagedTrace> {
        drop(self.sender);
        self.task
            .await
            .map_err(|err| TraceError::Runtime(format!("trace writer task failed: {err}")))?
    }

    /// Tear the writer down after a failed run.
    ///
    /// Every other sender must already be dropped. Returns the writer's own
    /// failure when it stopped for a reason other than the queue closing.
    pub async fn abort(self) -> Option<TraceError> {
        drop(self.sender);
        match self.task.await {
            Ok(Ok(staged)) => {
                debug!("discarding completed trace for abandoned run");
                if let Err(err) = staged.file.close() {
                    warn!("failed to remove staging file: {err}");
                }
                None
            }
            Ok(Err(TraceError::WriterClosed)) => None,
            Ok(Err(err)) => Some(err),
            Err(err) => Some(TraceError::Runtime(format!(
                "trace writer task failed: {err}"
            ))),
        }
    }
}

fn drain(
    mut rx: mpsc::UnboundedReceiver<WriterMessage>,
    staging: StagingFile,
    format: TraceFormat,
) -> Result<StagedTrace> {
    let mut out = BufWriter::new(staging);
    let mut sink = TraceSink::new(format);
    let mut event_count = 0u64;
    let mut node_count = 0u64;

    if let Err(err) = sink.open(&mut out) {
        let failure = ArchiveFailure::new("start trace table", err);
        return Err(discard(out.into_parts().0, failure));
    }

    loop {
        match rx.blocking_recv() {
            Some(WriterMessage::Event(event)) => {
                if event.kind == EventKind::Enter {
                    node_count += 1;
                }
                if let Err(err) = sink.write(&mut out, &event) {
                    let failure = ArchiveFailure::new("write trace event", err);
                    return Err(discard(out.into_parts().0, failure));
                }
                event_count += 1;
            }
            Some(WriterMessage::End) => break,
            None => {
                debug!("trace queue closed without end marker after {event_count} events");
                let (staging, _) = out.into_parts();
                if let Err(err) = staging.file.close() {
                    warn!("failed to remove staging file: {err}");
                }
                return Err(TraceError::WriterClosed);
            }
        }
    }
    debug!("trace writer saw end marker after {event_count} events");

    let finished = sink.close(&mut out).and_then(|()| out.flush());
    if let Err(err) = finished {
        let failure = ArchiveFailure::new("finish trace table", err);
        return Err(discard(out.into_parts().0, failure));
    }
    let staging = match out.into_inner() {
        Ok(staging) => staging,
        Err(err) => {
            let (err, out) = err.into_parts();
            let failure = ArchiveFailure::new("flush trace table", err);
            return Err(discard(out.into_parts().0, failure));
        }
    };
    if let Err(err) = staging.file.as_file().sync_all() {
        return Err(discard(staging, ArchiveFailure::new("sync trace table", err)));
    }

    Ok(StagedTrace {
        file: staging.file,
        format,
        event_count,
        node_count,
    })
}

/// Remove the staging file, recording a failed removal on `failure`
fn discard(staging: StagingFile, mut failure: ArchiveFailure) -> TraceError {
    if let Err(err) = staging.file.close() {
        failure.suppress(err);
    }
    TraceError::ArchiveIo(failure)
}

/// Staging file with an optional byte budget
struct StagingFile {
    file: NamedTempFile,
    remaining: Option<u64>,
}

impl Write for StagingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(remaining) = self.remaining {
            let len = buf.len() as u64;
            if len > remaining {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    "staged trace table exceeds max_staging_bytes",
                ));
            }
            self.remaining = Some(remaining - len);
        }
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Serializer for one trace table layout
enum TraceSink {
    /// One row per finished invocation
    Nodes,
    /// A JSON array with one object per event
    Events { written: u64 },
}

impl TraceSink {
    fn new(format: TraceFormat) -> Self {
        match format {
            TraceFormat::Nodes => Self::Nodes,
            TraceFormat::Events => Self::Events { written: 0 },
        }
    }

    fn open(&mut self, out: &mut impl Write) -> io::Result<()> {
        match self {
            Self::Nodes => Ok(()),
            Self::Events { .. } => out.write_all(b"["),
        }
    }

    fn write(&mut self, out: &mut impl Write, event: &TraceEvent) -> io::Result<()> {
        match self {
            Self::Nodes => match event.node_record() {
                Some(record) => out.write_all(record.to_row().as_bytes()),
                None => Ok(()),
            },
            Self::Events { written } => {
                if *written > 0 {
                    out.write_all(b",")?;
                }
                out.write_all(b"\n")?;
                serde_json::to_writer(&mut *out, &event.event_record())?;
                *written += 1;
                Ok(())
            }
        }
    }

    fn close(&mut self, out: &mut impl Write) -> io::Result<()> {
        match self {
            Self::Nodes => Ok(()),
            Self::Events { .. } => out.write_all(b"\n]\n"),
        }
    }
}
