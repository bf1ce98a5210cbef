//! Flush output - writes each drained window to the primary sink
//!
//! Wire format: one "<name>\t<mean>\n" line per aggregate, in store order.
//! The process binary points this at stdout; logs go to stderr.

use crate::domain::types::Aggregate;
use std::io::{self, Write};

/// Destination for drained aggregation windows
pub trait AggregateSink: Send {
    /// Emit every aggregate of one flushed window
    fn write_window(&mut self, aggregates: &[Aggregate]) -> io::Result<()>;
}

/// Line-oriented sink over any writer
pub struct LineSink<W> {
    writer: W,
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl LineSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> AggregateSink for LineSink<W> {
    fn write_window(&mut self, aggregates: &[Aggregate]) -> io::Result<()> {
        for aggregate in aggregates {
            writeln!(self.writer, "{}\t{}", aggregate.name, aggregate.mean)?;
        }
        self.writer.flush()
    }
}
