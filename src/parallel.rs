//! Trait for parallel record processing.
//!
//! Implementors are cloned once per lane before each batch; shared state
//! belongs behind an `Arc` so the clones aggregate into one place. See
//! [`BamReader::process_parallel`](crate::BamReader::process_parallel) for
//! the driving loop.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! use pbam::{BamReader, Record, RecordProcessor, Result};
//!
//! #[derive(Clone, Default)]
//! struct MappedCounter {
//!     mapped: Arc<AtomicU64>,
//! }
//!
//! impl RecordProcessor for MappedCounter {
//!     fn process_record(&mut self, record: Record<'_>) -> Result<()> {
//!         if record.flag() & 0x4 == 0 {
//!             self.mapped.fetch_add(1, Ordering::Relaxed);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let counter = MappedCounter::default();
//! let mut reader = BamReader::from_path("aligned.bam")?;
//! reader.process_parallel(counter.clone())?;
//! println!("{} mapped", counter.mapped.load(Ordering::Relaxed));
//! # Ok::<(), pbam::Error>(())
//! ```

use crate::error::Result;
use crate::record::Record;

/// Per-lane record processing logic.
pub trait RecordProcessor: Send + Clone {
    /// Called once per record; record views do not outlive the call.
    fn process_record(&mut self, record: Record<'_>) -> Result<()>;

    /// Called on each clone before its lane's records, with the lane id.
    fn set_lane(&mut self, _lane: usize) {}

    /// Called on each clone after its lane is drained for the batch.
    fn on_batch_complete(&mut self) -> Result<()> {
        Ok(())
    }
}
