use super::{Id, LogError, LogValue, OnlineMeanVariance, StatsLogger};
use coarsetime::{Duration as CDuration, Instant as CInstant};
use std::borrow::Cow;
use std::collections::{btree_map::Entry, BTreeMap};
use std::ops::Drop;
use std::time::{Duration, Instant};

/// Decides where one chunk of log groups ends and the next begins.
pub trait Chunker {
    /// Called before each group; `true` flushes the pending chunk first.
    #[inline]
    fn flush_group_start(&mut self) -> bool {
        false
    }
    /// Called after each group; `true` flushes the chunk including this group.
    #[inline]
    fn flush_group_end(&mut self) -> bool {
        false
    }
    /// The pending chunk was written out.
    fn note_flush(&mut self);
}

/// Chunk summaries at fixed time intervals.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ByTime {
    pub chunk_duration: CDuration,
    coarse_chunk_start: CInstant,
}

impl ByTime {
    pub fn new(chunk_duration: Duration) -> Self {
        Self {
            chunk_duration: CDuration::new(chunk_duration.as_secs(), chunk_duration.subsec_nanos()),
            coarse_chunk_start: CInstant::now(),
        }
    }
}

impl Default for ByTime {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Chunker for ByTime {
    #[inline]
    fn flush_group_start(&mut self) -> bool {
        self.coarse_chunk_start.elapsed() > self.chunk_duration
    }
    fn note_flush(&mut self) {
        self.coarse_chunk_start = CInstant::now();
    }
}

/// Chunk summaries every `interval` log groups.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ByCounter {
    pub interval: u64,
    groups: u64,
}

impl ByCounter {
    pub const fn new(interval: u64) -> Self {
        Self {
            interval,
            groups: 0,
        }
    }
}

impl Default for ByCounter {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Chunker for ByCounter {
    #[inline]
    fn flush_group_end(&mut self) -> bool {
        self.groups += 1;
        self.groups >= self.interval
    }
    fn note_flush(&mut self) {
        self.groups = 0;
    }
}

/// Output backend for chunk summaries.
pub trait SummaryWriter {
    fn write_summaries<'a, I>(&mut self, summaries: I, elapsed: Duration)
    where
        I: Iterator<Item = (&'a Id, &'a ChunkSummary)>;
}

/// Aggregates logged values over chunks of groups and writes one summary per id per chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkLogger<C: Chunker, W: SummaryWriter> {
    chunker: C,
    writer: W,

    /// Sorted so that ids are written in a stable order.
    summaries: BTreeMap<Id, Node>,
    chunk_start: Instant,
}

impl<C: Chunker, W: SummaryWriter> ChunkLogger<C, W> {
    pub fn new(chunker: C, writer: W) -> Self {
        Self {
            chunker,
            writer,
            summaries: BTreeMap::new(),
            chunk_start: Instant::now(),
        }
    }

    /// The writer backend.
    pub const fn writer(&self) -> &W {
        &self.writer
    }
}

impl<C: Chunker + Default, W: SummaryWriter + Default> Default for ChunkLogger<C, W> {
    fn default() -> Self {
        Self::new(C::default(), W::default())
    }
}

impl<C: Chunker, W: SummaryWriter> StatsLogger for ChunkLogger<C, W> {
    fn group_start(&mut self) {
        if self.chunker.flush_group_start() {
            self.flush();
        }
    }

    fn group_log(&mut self, id: Id, value: LogValue) -> Result<(), LogError> {
        match self.summaries.entry(id) {
            Entry::Vacant(e) => {
                e.insert(Node::new(value.into()));
            }
            Entry::Occupied(e) => {
                let id = e.key().clone();
                e.into_mut().push(value).map_err(|(value, expected)| {
                    LogError::IncompatibleValue {
                        id,
                        value,
                        expected,
                    }
                })?;
            }
        };
        Ok(())
    }

    fn group_end(&mut self) {
        if self.chunker.flush_group_end() {
            self.flush()
        }
    }

    fn flush(&mut self) {
        self.writer.write_summaries(
            self.summaries
                .iter()
                .filter(|(_, node)| node.dirty)
                .map(|(id, node)| (id, &node.summary)),
            self.chunk_start.elapsed(),
        );

        for node in self.summaries.values_mut() {
            node.reset();
        }
        self.chunk_start = Instant::now();
        self.chunker.note_flush();
    }
}

impl<C: Chunker, W: SummaryWriter> Drop for ChunkLogger<C, W> {
    fn drop(&mut self) {
        self.flush();
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    summary: ChunkSummary,
    /// Whether the summary has been updated in this chunk
    dirty: bool,
}

impl Node {
    const fn new(summary: ChunkSummary) -> Self {
        Self {
            summary,
            dirty: true,
        }
    }

    fn push(&mut self, value: LogValue) -> Result<(), (LogValue, &'static str)> {
        self.summary.push(value)?;
        self.dirty = true;
        Ok(())
    }

    fn reset(&mut self) {
        self.dirty = false;
        self.summary.reset()
    }
}

/// Summary of the values logged under one id within a chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkSummary {
    Scalar { stats: OnlineMeanVariance },
    Message { counts: BTreeMap<Cow<'static, str>, usize> },
}

impl From<LogValue> for ChunkSummary {
    fn from(value: LogValue) -> Self {
        match value {
            LogValue::Scalar(v) => Self::Scalar {
                stats: [v].into_iter().collect(),
            },
            LogValue::Message(s) => Self::Message {
                counts: [(s, 1)].into_iter().collect(),
            },
        }
    }
}

impl ChunkSummary {
    /// Add a value, or hand it back with the expected kind if it does not fit this summary.
    fn push(&mut self, value: LogValue) -> Result<(), (LogValue, &'static str)> {
        match (self, value) {
            (Self::Scalar { stats }, LogValue::Scalar(v)) => stats.push(v),
            (Self::Message { counts }, LogValue::Message(s)) => *counts.entry(s).or_insert(0) += 1,
            (Self::Scalar { .. }, value) => return Err((value, "Scalar")),
            (Self::Message { .. }, value) => return Err((value, "Message")),
        };
        Ok(())
    }

    fn reset(&mut self) {
        match self {
            Self::Scalar { stats } => *stats = OnlineMeanVariance::new(),
            Self::Message { counts } => counts.clear(),
        }
    }
}
