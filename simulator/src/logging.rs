use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tracing_subscriber::fmt::writer::MakeWriter;

/// Tees log output to stdout and, optionally, a file.
#[derive(Clone)]
pub(crate) struct LogWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl LogWriter {
    pub(crate) fn new(path: Option<PathBuf>) -> io::Result<Self> {
        let file = path
            .map(File::create)
            .transpose()?
            .map(|file| Arc::new(Mutex::new(file)));
        Ok(Self { file })
    }
}

pub(crate) struct LogWriterGuard {
    file: Option<Arc<Mutex<File>>>,
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = LogWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriterGuard {
            file: self.file.clone(),
        }
    }
}

impl Write for LogWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        if let Some(file) = &self.file {
            file.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        if let Some(file) = &self.file {
            file.lock().unwrap_or_else(PoisonError::into_inner).flush()?;
        }
        Ok(())
    }
}

/// Keeps the first `head` step lines and a rolling window of the last `tail`
/// so a failing run can be replayed from its log without storing every step.
pub(crate) struct EventLog {
    head: Vec<String>,
    head_limit: usize,
    tail: VecDeque<String>,
    tail_limit: usize,
    skipped: u64,
}

impl EventLog {
    pub(crate) fn new(head_limit: usize, tail_limit: usize) -> Self {
        Self {
            head: Vec::with_capacity(head_limit),
            head_limit,
            tail: VecDeque::with_capacity(tail_limit),
            tail_limit,
            skipped: 0,
        }
    }

    pub(crate) fn record(&mut self, line: String) {
        if self.head.len() < self.head_limit {
            self.head.push(line);
            return;
        }
        if self.tail_limit == 0 {
            self.skipped += 1;
            return;
        }
        if self.tail.len() == self.tail_limit {
            self.tail.pop_front();
            self.skipped += 1;
        }
        self.tail.push_back(line);
    }

    pub(crate) fn dump_failure(&self, reason: &str) {
        tracing::error!("invariant violated: {reason}");
        for line in &self.head {
            tracing::error!("{line}");
        }
        if self.skipped > 0 {
            tracing::error!("... {} steps omitted ...", self.skipped);
        }
        for line in &self.tail {
            tracing::error!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_log_keeps_head_and_tail() {
        let mut log = EventLog::new(2, 3);
        for step in 0..10 {
            log.record(format!("step={step}"));
        }
        assert_eq!(log.head, vec!["step=0", "step=1"]);
        assert_eq!(
            log.tail.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["step=7", "step=8", "step=9"]
        );
        assert_eq!(log.skipped, 5);
    }
}
