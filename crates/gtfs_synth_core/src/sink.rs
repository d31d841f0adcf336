//! Buffered output of generated trips and stop times.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use gtfs_synth_model::{StopTime, Trip};
use serde::Serialize;
use tracing::debug;

use crate::error::SinkError;

/// Destination for batches of rows of one table.
pub trait BatchWriter<T> {
    fn write_batch(&mut self, rows: &[T]) -> Result<(), SinkError>;

    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Writes rows to a CSV file. The header is written on creation, so a table
/// that never receives rows is still a valid file.
pub struct CsvTableWriter {
    path: PathBuf,
    writer: csv::Writer<BufWriter<File>>,
}

impl CsvTableWriter {
    pub fn create(path: &Path, headers: &[&str]) -> Result<Self, SinkError> {
        let file = File::create(path).map_err(|source| SinkError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(file));
        writer
            .write_record(headers)
            .map_err(|source| SinkError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }
}

impl<T: Serialize> BatchWriter<T> for CsvTableWriter {
    fn write_batch(&mut self, rows: &[T]) -> Result<(), SinkError> {
        for row in rows {
            self.writer.serialize(row).map_err(|source| SinkError::Csv {
                path: self.path.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.writer.flush().map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Collects rows in memory, remembering the size of every batch.
#[derive(Debug)]
pub struct MemoryTableWriter<T> {
    pub rows: Vec<T>,
    pub batches: Vec<usize>,
}

impl<T> Default for MemoryTableWriter<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            batches: Vec::new(),
        }
    }
}

impl<T: Clone> BatchWriter<T> for MemoryTableWriter<T> {
    fn write_batch(&mut self, rows: &[T]) -> Result<(), SinkError> {
        self.batches.push(rows.len());
        self.rows.extend_from_slice(rows);
        Ok(())
    }
}

/// Receiver of synthesized trips.
pub trait TripSink {
    fn append(&mut self, trip: Trip, stop_times: Vec<StopTime>) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkSummary {
    pub trips: usize,
    pub stop_times: usize,
    pub flushes: usize,
}

/// Accumulates trips and stop times and hands them to the writers in
/// batches. A queue is flushed as soon as it grows past `threshold`; the
/// remainder goes out on [`BufferedSink::finalize`].
pub struct BufferedSink<TW, SW> {
    threshold: usize,
    trips: Vec<Trip>,
    stop_times: Vec<StopTime>,
    trip_writer: TW,
    stop_time_writer: SW,
    summary: SinkSummary,
}

impl<TW, SW> BufferedSink<TW, SW>
where
    TW: BatchWriter<Trip>,
    SW: BatchWriter<StopTime>,
{
    pub fn new(trip_writer: TW, stop_time_writer: SW, threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            trips: Vec::new(),
            stop_times: Vec::new(),
            trip_writer,
            stop_time_writer,
            summary: SinkSummary::default(),
        }
    }

    pub fn buffered(&self) -> (usize, usize) {
        (self.trips.len(), self.stop_times.len())
    }

    fn flush_trips(&mut self) -> Result<(), SinkError> {
        if self.trips.is_empty() {
            return Ok(());
        }
        self.trip_writer.write_batch(&self.trips)?;
        self.summary.trips += self.trips.len();
        self.summary.flushes += 1;
        debug!(rows = self.trips.len(), "flushed trips");
        self.trips.clear();
        Ok(())
    }

    fn flush_stop_times(&mut self) -> Result<(), SinkError> {
        if self.stop_times.is_empty() {
            return Ok(());
        }
        self.stop_time_writer.write_batch(&self.stop_times)?;
        self.summary.stop_times += self.stop_times.len();
        self.summary.flushes += 1;
        debug!(rows = self.stop_times.len(), "flushed stop times");
        self.stop_times.clear();
        Ok(())
    }

    /// Flushes whatever is still queued and finishes both writers.
    pub fn finalize(&mut self) -> Result<SinkSummary, SinkError> {
        self.flush_trips()?;
        self.flush_stop_times()?;
        self.trip_writer.finish()?;
        self.stop_time_writer.finish()?;
        Ok(self.summary)
    }

    pub fn into_writers(self) -> (TW, SW) {
        (self.trip_writer, self.stop_time_writer)
    }
}

impl<TW, SW> TripSink for BufferedSink<TW, SW>
where
    TW: BatchWriter<Trip>,
    SW: BatchWriter<StopTime>,
{
    fn append(&mut self, trip: Trip, stop_times: Vec<StopTime>) -> Result<(), SinkError> {
        self.trips.push(trip);
        self.stop_times.extend(stop_times);
        if self.trips.len() > self.threshold {
            self.flush_trips()?;
        }
        if self.stop_times.len() > self.threshold {
            self.flush_stop_times()?;
        }
        Ok(())
    }
}
