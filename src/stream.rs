// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Producer/consumer bridge between the vendor callback thread and the
//! sample consumer.
//!
//! Exactly two buffers: one being filled by the producer, one handed to the
//! consumer at each swap. A swap while the previous handoff is still
//! undrained blocks the producer - that is the system's only flow control,
//! and it is deliberate: a slow consumer throttles acquisition instead of
//! growing memory without bound. The handoff moves the buffer, it does not
//! copy samples.
//!
//! Shutdown has two independent sides. [`SampleStream::stop_writer`] makes
//! the producer's swap return `false` (the driver callback turns that into a
//! failure code so the vendor stops calling); it is raised by `stop()` and
//! cleared once the handle is closed, so the bridge survives start/stop
//! cycles. [`SampleStream::stop_reader`] unblocks the consumer for final
//! teardown.

use num_complex::Complex32;
use std::sync::{Arc, Condvar, Mutex};

/// Capacity reserved in each of the two sample buffers, in complex samples.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1_000_000;

struct BridgeState {
    /// Buffer the producer is currently copying into.
    filling: Vec<Complex32>,
    /// Full buffer handed over by the last swap, awaiting the consumer.
    ready: Option<Vec<Complex32>>,
    /// Drained buffer returned by the consumer, the next swap target.
    spare: Option<Vec<Complex32>>,
    /// Swaps abort instead of blocking while this is raised.
    write_stopped: bool,
    /// Reads return `None` (after draining) while this is raised.
    read_stopped: bool,
}

struct Shared {
    state: Mutex<BridgeState>,
    /// Signaled when a full buffer becomes available to the consumer.
    readable: Condvar,
    /// Signaled when the consumer returns a drained buffer.
    writable: Condvar,
}

/// The bridge itself, owned by the lifecycle controller.
pub struct SampleStream {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SampleStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleStream").finish_non_exhaustive()
    }
}

impl Default for SampleStream {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleStream {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BridgeState {
                    filling: Vec::with_capacity(capacity),
                    ready: None,
                    spare: Some(Vec::with_capacity(capacity)),
                    write_stopped: false,
                    read_stopped: false,
                }),
                readable: Condvar::new(),
                writable: Condvar::new(),
            }),
        }
    }

    /// Producer handle for the driver callback.
    #[must_use]
    pub fn writer(&self) -> StreamWriter {
        StreamWriter {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Consumer handle. The bridge is single-consumer: create one reader and
    /// keep it for the life of the stream.
    #[must_use]
    pub fn reader(&self) -> StreamReader {
        StreamReader {
            shared: Arc::clone(&self.shared),
            loaned: None,
        }
    }

    /// Raise the terminal write condition: a producer blocked in a swap (or
    /// arriving later) gets `false` instead of waiting forever.
    pub fn stop_writer(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.write_stopped = true;
        drop(state);
        self.shared.writable.notify_all();
    }

    /// Clear the write stop so the bridge is ready for a future start.
    pub fn clear_write_stop(&self) {
        self.shared.state.lock().unwrap().write_stopped = false;
    }

    /// Unblock the consumer for final teardown; pending data is still
    /// drained first.
    pub fn stop_reader(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.read_stopped = true;
        drop(state);
        self.shared.readable.notify_all();
    }

    /// Clear the read stop so the consumer can wait for data again.
    pub fn clear_read_stop(&self) {
        self.shared.state.lock().unwrap().read_stopped = false;
    }
}

/// Producer side. Cloneable so each start can hand a fresh writer to the
/// driver callback.
#[derive(Clone)]
pub struct StreamWriter {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWriter").finish_non_exhaustive()
    }
}

impl StreamWriter {
    /// Copy `samples` into the filling buffer and swap it over to the
    /// consumer.
    ///
    /// Blocks while the previously swapped buffer is undrained. Returns
    /// `false` once the write stop has been raised; the caller must stop
    /// producing (the driver callback returns a failure code to the vendor).
    pub fn write(&self, samples: &[Complex32]) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        if state.write_stopped {
            return false;
        }
        state.filling.clear();
        state.filling.extend_from_slice(samples);
        loop {
            if state.write_stopped {
                return false;
            }
            if state.ready.is_none() {
                if let Some(spare) = state.spare.take() {
                    let full = std::mem::replace(&mut state.filling, spare);
                    state.ready = Some(full);
                    drop(state);
                    self.shared.readable.notify_one();
                    return true;
                }
            }
            state = self.shared.writable.wait(state).unwrap();
        }
    }
}

/// Consumer side.
///
/// Each successful [`read`](StreamReader::read) loans the full buffer out;
/// [`flush`](StreamReader::flush) returns it as the producer's next swap
/// target. A `read` with an outstanding loan flushes it first, so a plain
/// `while let Some(block) = reader.read()` loop drains correctly.
pub struct StreamReader {
    shared: Arc<Shared>,
    loaned: Option<Vec<Complex32>>,
}

impl std::fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader").finish_non_exhaustive()
    }
}

impl StreamReader {
    /// Block until the producer hands over a full buffer.
    ///
    /// Returns `None` once the read stop has been raised and pending data is
    /// drained.
    pub fn read(&mut self) -> Option<&[Complex32]> {
        self.flush();
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if let Some(full) = state.ready.take() {
                drop(state);
                self.loaned = Some(full);
                return self.loaned.as_deref();
            }
            if state.read_stopped {
                return None;
            }
            state = self.shared.readable.wait(state).unwrap();
        }
    }

    /// Return the drained buffer, letting a blocked producer swap again.
    pub fn flush(&mut self) {
        if let Some(mut buffer) = self.loaned.take() {
            buffer.clear();
            let mut state = self.shared.state.lock().unwrap();
            state.spare = Some(buffer);
            drop(state);
            self.shared.writable.notify_one();
        }
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn block(value: f32, len: usize) -> Vec<Complex32> {
        vec![Complex32::new(value, -value); len]
    }

    #[test]
    fn test_blocks_delivered_in_order_without_loss() {
        let stream = SampleStream::with_capacity(64);
        let writer = stream.writer();
        let mut reader = stream.reader();

        let mut received = Vec::new();
        for i in 0..3 {
            #[allow(clippy::cast_precision_loss, reason = "small test indices")]
            assert!(writer.write(&block(i as f32, 16)));
            let samples = reader.read().unwrap();
            assert_eq!(samples.len(), 16);
            received.extend_from_slice(samples);
            reader.flush();
        }

        assert_eq!(received.len(), 48);
        for (i, chunk) in received.chunks(16).enumerate() {
            #[allow(clippy::cast_precision_loss, reason = "small test indices")]
            let expected = Complex32::new(i as f32, -(i as f32));
            assert!(chunk.iter().all(|s| *s == expected));
        }
    }

    #[test]
    fn test_swap_blocks_until_consumer_drains() {
        let stream = SampleStream::with_capacity(8);
        let writer = stream.writer();
        let mut reader = stream.reader();
        let produced = Arc::new(AtomicUsize::new(0));

        let produced_clone = Arc::clone(&produced);
        let producer = thread::spawn(move || {
            assert!(writer.write(&block(1.0, 4)));
            produced_clone.store(1, Ordering::SeqCst);
            // The second swap must wait until the first block is drained
            assert!(writer.write(&block(2.0, 4)));
            produced_clone.store(2, Ordering::SeqCst);
        });

        // First block arrives; take it but do not flush yet
        let samples = reader.read().unwrap().to_vec();
        assert_eq!(samples[0], Complex32::new(1.0, -1.0));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(produced.load(Ordering::SeqCst), 1);

        // Draining releases the producer
        reader.flush();
        producer.join().unwrap();
        assert_eq!(produced.load(Ordering::SeqCst), 2);
        assert_eq!(reader.read().unwrap()[0], Complex32::new(2.0, -2.0));
    }

    #[test]
    fn test_stop_writer_unblocks_producer() {
        let stream = SampleStream::with_capacity(8);
        let writer = stream.writer();

        let producer = thread::spawn(move || {
            let first = writer.write(&block(1.0, 4));
            // Never drained, so this swap can only end via the stop flag
            let second = writer.write(&block(2.0, 4));
            (first, second)
        });

        thread::sleep(Duration::from_millis(50));
        stream.stop_writer();
        let (first, second) = producer.join().unwrap();
        assert!(first);
        assert!(!second);
    }

    #[test]
    fn test_bridge_reusable_after_stop_cycle() {
        let stream = SampleStream::with_capacity(8);
        let writer = stream.writer();
        let mut reader = stream.reader();

        assert!(writer.write(&block(1.0, 4)));
        stream.stop_writer();
        assert!(!writer.write(&block(2.0, 4)));
        stream.clear_write_stop();

        // The undrained block from before the stop is still delivered
        assert_eq!(reader.read().unwrap()[0], Complex32::new(1.0, -1.0));
        reader.flush();
        assert!(writer.write(&block(3.0, 4)));
        assert_eq!(reader.read().unwrap()[0], Complex32::new(3.0, -3.0));
    }

    #[test]
    fn test_stop_reader_unblocks_consumer() {
        let stream = SampleStream::with_capacity(8);
        let mut reader = stream.reader();

        let consumer = thread::spawn(move || reader.read().map(<[Complex32]>::len));
        thread::sleep(Duration::from_millis(50));
        stream.stop_reader();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_read_drains_pending_before_stop() {
        let stream = SampleStream::with_capacity(8);
        let writer = stream.writer();
        let mut reader = stream.reader();

        assert!(writer.write(&block(5.0, 4)));
        stream.stop_reader();
        assert_eq!(reader.read().unwrap().len(), 4);
        reader.flush();
        assert!(reader.read().is_none());
    }
}
