//! Command-line logger
use super::chunk::{ByTime, ChunkLogger, ChunkSummary, Chunker, SummaryWriter};
use super::{Id, LogError, LogValue, StatsLogger};
use std::fmt;
use std::time::Duration;
use yansi::Paint;

/// Logger that displays grouped summaries to standard output.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DisplayLogger<C: Chunker = ByTime>(ChunkLogger<C, DisplayBackend>);

impl<C: Chunker> DisplayLogger<C> {
    #[inline]
    pub fn new(chunker: C) -> Self {
        Self(ChunkLogger::new(chunker, DisplayBackend))
    }
}

impl<C: Chunker> StatsLogger for DisplayLogger<C> {
    #[inline]
    fn group_start(&mut self) {
        self.0.group_start()
    }
    #[inline]
    fn group_log(&mut self, id: Id, value: LogValue) -> Result<(), LogError> {
        self.0.group_log(id, value)
    }
    #[inline]
    fn group_end(&mut self) {
        self.0.group_end()
    }
    #[inline]
    fn flush(&mut self) {
        self.0.flush()
    }
}

/// Logging backend that displays summaries to standard output.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DisplayBackend;

impl SummaryWriter for DisplayBackend {
    fn write_summaries<'a, I>(&mut self, summaries: I, elapsed: Duration)
    where
        I: Iterator<Item = (&'a Id, &'a ChunkSummary)>,
    {
        println!();
        println!("{}", Paint::fixed(8, format!("==== {:.1?} ====", elapsed)));
        for (id, summary) in summaries {
            println!("{:<32} {}", Paint::fixed(35, id), DisplaySummary(summary));
        }
    }
}

struct DisplaySummary<'a>(&'a ChunkSummary);

impl<'a> fmt::Display for DisplaySummary<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            ChunkSummary::Scalar { stats } => {
                if let Some(mean) = stats.mean() {
                    write!(f, "{:.4}", mean)?;
                }
                if let (true, Some(stddev)) = (stats.count() > 1, stats.stddev()) {
                    write!(f, " {}", Paint::fixed(8, format!("(σ {:.4})", stddev)))?;
                }
                Ok(())
            }
            ChunkSummary::Message { counts } => {
                let mut first = true;
                for (message, count) in counts {
                    if !first {
                        write!(f, "; ")?;
                    }
                    first = false;
                    write!(f, "{}", message)?;
                    if *count > 1 {
                        write!(f, " {}", Paint::fixed(8, format!("(×{})", count)))?;
                    }
                }
                Ok(())
            }
        }
    }
}
