use eyre::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to write to {sink}")]
pub struct SinkWriteError {
    pub sink: String,
    #[source]
    pub source: io::Error,
}

pub trait Sink {
    fn name(&self) -> &str;
    fn emit(&mut self, text: &str) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

/// Any `Write` as a sink. Each `emit` is written and flushed as one block.
pub struct WriterSink<W: Write> {
    name: String,
    writer: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer,
        }
    }
}

impl<W: Write> Sink for WriterSink<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn emit(&mut self, text: &str) -> io::Result<()> {
        self.writer.write_all(text.as_bytes())?;
        self.writer.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

pub fn console() -> WriterSink<io::Stdout> {
    WriterSink::new("stdout", io::stdout())
}

/// Open `path` for appending.
pub fn append_file(path: &Path) -> Result<WriterSink<BufWriter<File>>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .wrap_err_with(|| format!("Failed to open output file: {}", path.display()))?;
    Ok(WriterSink::new(
        path.display().to_string(),
        BufWriter::new(file),
    ))
}

/// Fan-out over every live sink. A sink that fails is dropped and the rest
/// keep receiving output.
#[derive(Default)]
pub struct Output {
    sinks: Vec<Box<dyn Sink>>,
}

impl Output {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl Sink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Write `text` to every sink, returning the failures. Failed sinks are
    /// removed.
    pub fn emit(&mut self, text: &str) -> Vec<SinkWriteError> {
        let mut failures = Vec::new();
        self.sinks.retain_mut(|sink| match sink.emit(text) {
            Ok(()) => true,
            Err(source) => {
                let err = SinkWriteError {
                    sink: sink.name().to_string(),
                    source,
                };
                tracing::error!(error = %err, cause = %err.source, "dropping output sink");
                // Best effort: salvage whatever was buffered.
                let _ = sink.flush();
                failures.push(err);
                false
            }
        });
        if self.sinks.is_empty() && !failures.is_empty() {
            tracing::warn!("no output sinks left; transcript is only counted");
        }
        failures
    }

    /// Flush and release every sink.
    pub fn close(mut self) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.flush() {
                tracing::warn!(sink = sink.name(), error = %e, "flush on close failed");
            }
        }
        self.sinks.clear();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Broken, Capture};
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn failing_sink_is_dropped_and_others_continue() {
        let capture = Capture::default();
        let mut output = Output::new().with(Broken).with(capture.clone());

        let failures = output.emit("one");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].sink, "broken");

        assert!(output.emit("two").is_empty());
        assert_eq!(capture.text(), "onetwo");
    }

    #[test]
    fn close_flushes_every_sink() {
        let capture = Capture::default();
        let output = Output::new().with(capture.clone());
        output.close();
        assert_eq!(*capture.flushes.lock().unwrap(), 1);
    }

    #[test]
    fn file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "existing\n").unwrap();

        let mut output = Output::new().with(append_file(&path).unwrap());
        assert!(output.emit("new\n").is_empty());
        output.close();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "existing\nnew\n");
    }

    #[test]
    fn writer_sink_writes_whole_block() {
        let mut sink = WriterSink::new("vec", Vec::new());
        sink.emit("a\nb\n").unwrap();
        assert_eq!(sink.writer, b"a\nb\n");
    }
}
