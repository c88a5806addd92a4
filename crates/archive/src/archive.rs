//! Frame archive - pooled owner of published frames
//!
//! Frames are published into a fixed [`SmallHeap`]. Each stream may hold at
//! most `max_published_per_stream` frames that nobody pinned; kept frames do
//! not count. Data buffers of recycled frames go to a freelist and are
//! handed back out by [`FrameArchive::alloc_buffer`].
//!
//! Released handle cells are parked in the archive and refilled by the next
//! publish, and metric handles are registered once per archive and stream, so
//! a warm archive publishes and recycles dataless frames without allocating.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use bytes::BytesMut;
use contracts::{host_time_ms, ArchiveConfig, FrameError, SensorInfo, StreamId};
use frame::{Frame, FrameCell, FrameContext, FrameHandle, FrameOwner, MetadataParserMap};
use frame_pool::{HeapItem, SmallHeap};
use tracing::{debug, error, info, trace};

/// Published frame slots per archive
pub const ARCHIVE_CAPACITY: usize = 128;

/// Freelist buffers older than this (stream time) are discarded
const FREELIST_MAX_AGE_MS: f64 = 1000.0;

/// Recycled data buffer
struct FreeBuffer {
    buffer: BytesMut,
    timestamp: f64,
}

/// Unkept published frames of one stream
struct StreamCount {
    frames: usize,
    gauge: metrics::Gauge,
}

impl StreamCount {
    fn new(stream: StreamId) -> Self {
        Self {
            frames: 0,
            gauge: metrics::gauge!("archive_published_frames", "stream" => stream.to_string()),
        }
    }
}

struct ArchiveState {
    published: HashMap<StreamId, StreamCount>,
    freelist: Vec<FreeBuffer>,
    /// Released handle cells, reused by the next publish
    cells: Vec<FrameCell>,
}

impl Default for ArchiveState {
    fn default() -> Self {
        Self {
            published: HashMap::new(),
            freelist: Vec::new(),
            cells: Vec::with_capacity(ARCHIVE_CAPACITY),
        }
    }
}

/// Publish refusal counters by reason
struct RefusedCounters {
    stream_limit: metrics::Counter,
    stopped: metrics::Counter,
    exhausted: metrics::Counter,
}

impl RefusedCounters {
    fn register() -> Self {
        Self {
            stream_limit: metrics::counter!("archive_publish_refused_total", "reason" => "stream_limit"),
            stopped: metrics::counter!("archive_publish_refused_total", "reason" => "stopped"),
            exhausted: metrics::counter!("archive_publish_refused_total", "reason" => "exhausted"),
        }
    }
}

/// Frame archive
pub struct FrameArchive {
    heap: SmallHeap<Frame, ARCHIVE_CAPACITY>,
    state: Mutex<ArchiveState>,
    config: ArchiveConfig,
    context: Arc<FrameContext>,
    sensor: Arc<SensorInfo>,
    refused: RefusedCounters,
}

impl fmt::Debug for FrameArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameArchive")
            .field("sensor", &self.sensor.name)
            .field("in_use", &self.in_use())
            .field("freelist", &self.freelist_len())
            .field("config", &self.config)
            .finish()
    }
}

impl FrameArchive {
    pub fn new(config: ArchiveConfig, context: Arc<FrameContext>, sensor: SensorInfo) -> Arc<Self> {
        Arc::new(Self {
            heap: SmallHeap::with_name("archive"),
            state: Mutex::new(ArchiveState::default()),
            config,
            context,
            sensor: Arc::new(sensor),
            refused: RefusedCounters::register(),
        })
    }

    /// Publish a frame into this archive
    pub fn publish(self: &Arc<Self>, frame: Frame) -> Option<FrameHandle> {
        frame.publish(self.clone())
    }

    /// Buffer of `size` bytes for a frame at `timestamp` (ms).
    ///
    /// Reuses a recycled buffer of the same size when one is available, then
    /// discards recycled buffers more than one second older than `timestamp`.
    /// Reused buffers keep their previous contents.
    pub fn alloc_buffer(&self, size: usize, timestamp: f64) -> BytesMut {
        let reused = {
            let mut state = self.lock();
            let position = state
                .freelist
                .iter()
                .position(|free| free.buffer.len() == size);
            let reused = position.map(|i| state.freelist.swap_remove(i).buffer);

            let before = state.freelist.len();
            state
                .freelist
                .retain(|free| timestamp <= free.timestamp + FREELIST_MAX_AGE_MS);
            let discarded = before - state.freelist.len();
            if discarded > 0 {
                trace!(discarded, "discarded stale freelist buffers");
            }
            metrics::gauge!("archive_freelist_buffers").set(state.freelist.len() as f64);
            reused
        };

        match reused {
            Some(buffer) => {
                metrics::counter!("archive_buffer_reuse_total").increment(1);
                buffer
            }
            None => BytesMut::zeroed(size),
        }
    }

    /// Refuse all further publishes
    pub fn stop_allocation(&self) {
        self.heap.stop_allocation();
    }

    pub fn is_stopped(&self) -> bool {
        self.heap.is_allocation_stopped()
    }

    /// Stop allocation and block until every published frame was released.
    ///
    /// # Errors
    /// `Timeout` when frames are still held after `drain_timeout_s`.
    pub fn flush(&self) -> Result<(), FrameError> {
        let in_use = self.in_use();
        info!(in_use, "flushing frame archive");
        self.heap.stop_allocation();
        self.heap
            .wait_until_empty_for(Duration::from_secs(self.config.drain_timeout_s))?;

        let cells = {
            let mut state = self.lock();
            state.freelist.clear();
            std::mem::take(&mut state.cells)
        };
        drop(cells);
        metrics::gauge!("archive_freelist_buffers").set(0.0);
        debug!("frame archive drained");
        Ok(())
    }

    /// Published frames not yet released
    pub fn in_use(&self) -> usize {
        self.heap.size()
    }

    pub fn capacity(&self) -> usize {
        self.heap.capacity()
    }

    /// Unkept published frames of `stream`
    pub fn published_count(&self, stream: StreamId) -> usize {
        self.lock()
            .published
            .get(&stream)
            .map_or(0, |count| count.frames)
    }

    /// Released handle cells waiting for the next publish
    pub fn pooled_cells(&self) -> usize {
        self.lock().cells.len()
    }

    pub fn freelist_len(&self) -> usize {
        self.lock().freelist.len()
    }

    pub fn sensor_info(&self) -> &Arc<SensorInfo> {
        &self.sensor
    }

    pub fn context(&self) -> &Arc<FrameContext> {
        &self.context
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Stream a frame counts against, `None` for composites
    fn counted_stream(frame: &Frame) -> Option<StreamId> {
        if frame.is_composite() {
            None
        } else {
            frame.stream()
        }
    }

    fn release_count(state: &mut ArchiveState, stream: StreamId) {
        if let Some(count) = state.published.get_mut(&stream) {
            count.frames = count.frames.saturating_sub(1);
            count.gauge.set(count.frames as f64);
        }
    }

    fn lock(&self) -> MutexGuard<'_, ArchiveState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameOwner for FrameArchive {
    fn publish_frame(&self, frame: Frame) -> Result<HeapItem<Frame>, Frame> {
        let counted = Self::counted_stream(&frame);
        let mut state = self.lock();

        if let Some(stream) = counted {
            let count = state.published.get(&stream).map_or(0, |count| count.frames);
            if count >= self.config.max_published_per_stream {
                drop(state);
                self.refused.stream_limit.increment(1);
                debug!(stream = %stream, count, "published frame limit reached");
                return Err(frame);
            }
        }

        let Some(mut item) = self.heap.allocate() else {
            drop(state);
            let reason = if self.heap.is_allocation_stopped() {
                self.refused.stopped.increment(1);
                "stopped"
            } else {
                self.refused.exhausted.increment(1);
                "exhausted"
            };
            debug!(reason, "archive refused frame");
            return Err(frame);
        };

        if let Some(stream) = counted {
            let count = state
                .published
                .entry(stream)
                .or_insert_with(|| StreamCount::new(stream));
            count.frames += 1;
            count.gauge.set(count.frames as f64);
        }
        *item = frame;
        Ok(item)
    }

    fn unpublish_frame(&self, item: &mut HeapItem<Frame>) {
        let system_time = item.system_time();
        if system_time > 0.0 {
            let held_ms = host_time_ms() - system_time;
            metrics::histogram!("archive_frame_hold_ms").record(held_ms);
            if let Some(profile) = item.profile() {
                let budget_ms = 1000.0 / (profile.fps as f64 + 1.0);
                if held_ms > budget_ms {
                    trace!(
                        stream = %profile.stream,
                        frame_number = item.frame_number(),
                        held_ms,
                        budget_ms,
                        "frame held longer than one frame interval"
                    );
                }
            }
        }

        {
            let mut state = self.lock();

            // Pin so the stream count is released exactly once
            if item.mark_kept() {
                if let Some(stream) = Self::counted_stream(item) {
                    Self::release_count(&mut state, stream);
                }
            }

            if !item.is_fixed() {
                let timestamp = item.timestamp();
                let data = item.take_data();
                if !data.is_empty() {
                    if let Ok(buffer) = data.try_into_mut() {
                        if state.freelist.len() >= ARCHIVE_CAPACITY {
                            state.freelist.remove(0);
                        }
                        state.freelist.push(FreeBuffer { buffer, timestamp });
                    }
                }
            }
            metrics::gauge!("archive_freelist_buffers").set(state.freelist.len() as f64);
        }

        // Outside the archive lock: dropping a composite releases its children
        if let Err(e) = self.heap.deallocate(item) {
            error!(error = %e, "frame returned to the wrong archive");
            panic!("frame archive invariant violated: {e}");
        }
    }

    fn keep_frame(&self, frame: &Frame) {
        if let Some(stream) = Self::counted_stream(frame) {
            let mut state = self.lock();
            Self::release_count(&mut state, stream);
        }
    }

    fn sensor(&self) -> Weak<SensorInfo> {
        Arc::downgrade(&self.sensor)
    }

    fn parsers(&self, stream: StreamId) -> Option<Arc<MetadataParserMap>> {
        self.context.parsers_for(stream.kind)
    }

    fn take_cell(&self) -> Option<FrameCell> {
        self.lock().cells.pop()
    }

    fn recycle_cell(&self, cell: FrameCell) {
        let overflow = {
            let mut state = self.lock();
            if state.cells.len() < ARCHIVE_CAPACITY && !self.heap.is_allocation_stopped() {
                state.cells.push(cell);
                None
            } else {
                Some(cell)
            }
        };
        drop(overflow);
    }
}
