//! Multi-stream synchronizer.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::{StreamId, SyncerConfig};
use frame::FrameHandle;
use frame_queue::FrameSink;
use tracing::{debug, instrument, trace, warn};

use crate::lane::Lane;
use crate::FrameSet;

#[derive(Debug, Default)]
struct SyncerState {
    lanes: BTreeMap<StreamId, Lane>,
    framesets: u64,
}

impl SyncerState {
    fn key_available(&self, key_stream: StreamId) -> bool {
        self.lanes.get(&key_stream).is_some_and(Lane::has_frame)
    }
}

/// Matches frames of every stream to the nearest-in-time key-stream frame
///
/// Frames go in through [`FrameSink::enqueue`]; framesets come out of
/// [`Syncer::poll_for_frames`] / [`Syncer::wait_for_frames`].
pub struct Syncer {
    key_stream: StreamId,
    lane_capacity: usize,
    state: Mutex<SyncerState>,
    key_ready: Condvar,
}

impl fmt::Debug for Syncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Syncer")
            .field("key_stream", &self.key_stream)
            .field("lane_capacity", &self.lane_capacity)
            .field("lanes", &state.lanes.len())
            .field("framesets", &state.framesets)
            .finish()
    }
}

impl Syncer {
    /// Syncer keyed on `key_stream` with default lane capacity
    pub fn new(key_stream: StreamId) -> Self {
        Self::with_config(&SyncerConfig::new(key_stream))
    }

    pub fn with_config(config: &SyncerConfig) -> Self {
        Self {
            key_stream: config.key_stream,
            lane_capacity: config.lane_capacity.max(1),
            state: Mutex::new(SyncerState::default()),
            key_ready: Condvar::new(),
        }
    }

    /// Accept a frame into its stream's lane.
    ///
    /// Lanes are created on first use. Overflow drops the lane's oldest frame.
    /// Key-stream frames wake a waiting consumer.
    pub fn enqueue(&self, frame: FrameHandle) {
        let Some(stream) = frame.stream() else {
            warn!(
                frame_number = frame.frame_number(),
                "frame without stream profile, dropped"
            );
            return;
        };

        let evicted = {
            let mut state = self.lock();
            let capacity = self.lane_capacity;
            state
                .lanes
                .entry(stream)
                .or_insert_with(|| {
                    debug!(stream = %stream, capacity, "syncer lane created");
                    Lane::new(capacity)
                })
                .push(frame)
        };

        if stream == self.key_stream {
            self.key_ready.notify_all();
        }

        if let Some(old) = evicted {
            metrics::counter!("syncer_dropped_total", "stream" => stream.to_string()).increment(1);
            trace!(
                stream = %stream,
                frame_number = old.frame_number(),
                "lane full, dropped oldest frame"
            );
        }
    }

    /// Assemble a frameset from what is already queued.
    ///
    /// Empty when the key stream has no frame.
    #[instrument(level = "trace", name = "syncer_poll_for_frames", skip(self))]
    pub fn poll_for_frames(&self) -> FrameSet {
        let (set, skipped) = {
            let mut state = self.lock();
            self.assemble(&mut state)
        };
        // Passed-over frames are released outside the lock
        drop(skipped);
        set
    }

    /// Wait up to `timeout` for a key frame, then assemble a frameset.
    ///
    /// Timing out yields an empty frameset, not an error.
    #[instrument(
        level = "trace",
        name = "syncer_wait_for_frames",
        skip(self),
        fields(timeout_ms = timeout.as_millis() as u64)
    )]
    pub fn wait_for_frames(&self, timeout: Duration) -> FrameSet {
        let (set, skipped) = {
            let guard = self.lock();
            let (mut state, _) = self
                .key_ready
                .wait_timeout_while(guard, timeout, |state| {
                    !state.key_available(self.key_stream)
                })
                .unwrap_or_else(PoisonError::into_inner);
            self.assemble(&mut state)
        };
        drop(skipped);
        set
    }

    /// Release every frame held in any lane
    pub fn flush(&self) {
        let drained: Vec<FrameHandle> = {
            let mut state = self.lock();
            state.lanes.values_mut().flat_map(Lane::drain).collect()
        };
        if !drained.is_empty() {
            debug!(count = drained.len(), "flushed syncer lanes");
        }
    }

    pub fn key_stream(&self) -> StreamId {
        self.key_stream
    }

    pub fn lane_capacity(&self) -> usize {
        self.lane_capacity
    }

    /// Streams seen so far
    pub fn stream_count(&self) -> usize {
        self.lock().lanes.len()
    }

    /// Frames held across all lanes, fronts included
    pub fn pending_frames(&self) -> usize {
        self.lock().lanes.values().map(Lane::len).sum()
    }

    /// Frames dropped by lane overflow
    pub fn dropped_count(&self) -> u64 {
        self.lock().lanes.values().map(Lane::dropped_count).sum()
    }

    /// Framesets assembled so far
    pub fn frameset_count(&self) -> u64 {
        self.lock().framesets
    }

    /// Core matching, called with the lock held.
    ///
    /// 1. Populate the key front, or return an empty set.
    /// 2. Advance every other front towards the key timestamp.
    /// 3. Move the key front and every non-empty front into the set.
    fn assemble(&self, state: &mut SyncerState) -> (FrameSet, Vec<FrameHandle>) {
        let mut set = FrameSet::empty(self.key_stream);
        let mut skipped = Vec::new();

        let Some(key_header) = state
            .lanes
            .get_mut(&self.key_stream)
            .and_then(Lane::fill_front)
            .map(|frame| frame.header())
        else {
            return (set, skipped);
        };

        for (stream, lane) in state.lanes.iter_mut() {
            if *stream == self.key_stream || lane.fill_front().is_none() {
                continue;
            }
            skipped.extend(lane.advance_towards(key_header.timestamp));

            if let Some(front) = lane.front() {
                let domain = front.timestamp_domain();
                if domain != key_header.timestamp_domain {
                    warn!(
                        stream = %stream,
                        domain = %domain,
                        key_domain = %key_header.timestamp_domain,
                        "timestamp domain differs from key stream"
                    );
                    metrics::counter!(
                        "syncer_domain_mismatch_total",
                        "stream" => stream.to_string()
                    )
                    .increment(1);
                }
            }
        }

        for (stream, lane) in state.lanes.iter_mut() {
            if let Some(frame) = lane.take_front() {
                if *stream != self.key_stream {
                    metrics::histogram!(
                        "syncer_alignment_error_ms",
                        "stream" => stream.to_string()
                    )
                    .record(frame.header().distance_to(key_header.timestamp));
                }
                set.insert(*stream, frame);
            }
        }

        state.framesets += 1;
        metrics::counter!("syncer_framesets_total").increment(1);
        metrics::histogram!("syncer_frameset_size").record(set.len() as f64);
        trace!(
            key_timestamp = key_header.timestamp,
            frames = set.len(),
            skipped = skipped.len(),
            "frameset assembled"
        );
        (set, skipped)
    }

    fn lock(&self) -> MutexGuard<'_, SyncerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Syncer {
    fn default() -> Self {
        Self::with_config(&SyncerConfig::default())
    }
}

impl FrameSink for Syncer {
    fn enqueue(&self, frame: FrameHandle) {
        Syncer::enqueue(self, frame);
    }
}
