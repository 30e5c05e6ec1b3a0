//! Per-object hardware occlusion query bookkeeping.
//!
//! Every sphere owns at most one outstanding occlusion query at a time. The
//! query covers the sphere's bounding-box proxy and is issued with color and
//! depth writes disabled, so the only side effect is the sample counter.
//! Results come back asynchronously: the resolved counters are copied into a
//! pooled readback buffer, mapped with `map_async`, and consumed whichever
//! later frame the map completes in. Nothing here ever blocks on the GPU.
//!
//! The CPU state machine ([`QueryTracker`]) is kept separate from the GPU
//! resources ([`OcclusionResources`]) so the reissue/consume rules can be
//! tested without a device.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Upper bound on simultaneously pending readback buffers. If maps are this
/// slow something is wrong and we stop issuing new queries until one drains.
const MAX_PENDING_READBACKS: usize = 4;

const STATUS_PENDING: u8 = 0;
const STATUS_READY: u8 = 1;
const STATUS_ERROR: u8 = 2;

#[derive(Clone, Copy, Default)]
struct ObjectState {
    occluded: bool,
    in_flight: bool,
}

/// CPU-side per-object query state.
pub struct QueryTracker {
    states: Vec<ObjectState>,
}

/// Summary of one consume pass over a finished readback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsumeSummary {
    pub consumed: usize,
    pub newly_occluded: usize,
    pub newly_visible: usize,
}

impl QueryTracker {
    pub fn new(len: usize) -> Self {
        Self {
            states: vec![ObjectState::default(); len],
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// True when the object's last query reported zero samples.
    pub fn is_occluded(&self, index: usize) -> bool {
        self.states.get(index).map(|s| s.occluded).unwrap_or(false)
    }

    /// An object may only be queried again once its previous result has been
    /// consumed (or abandoned).
    pub fn can_issue(&self, index: usize) -> bool {
        self.states.get(index).map(|s| !s.in_flight).unwrap_or(false)
    }

    pub fn mark_issued(&mut self, index: usize) {
        debug_assert!(!self.states[index].in_flight, "query reissued while in flight");
        self.states[index].in_flight = true;
    }

    /// Consume one readback batch: `slots[i]` is the object whose sample
    /// count landed in `samples[i]`. Zero samples means occluded.
    pub fn consume(&mut self, slots: &[usize], samples: &[u64]) -> ConsumeSummary {
        let mut summary = ConsumeSummary::default();
        for (slot, &count) in slots.iter().zip(samples) {
            let Some(state) = self.states.get_mut(*slot) else {
                continue;
            };
            let occluded = count == 0;
            if occluded && !state.occluded {
                summary.newly_occluded += 1;
            } else if !occluded && state.occluded {
                summary.newly_visible += 1;
            }
            state.occluded = occluded;
            state.in_flight = false;
            summary.consumed += 1;
        }
        summary
    }

    /// A readback failed: free the slots for reissue without touching the
    /// last known visibility.
    pub fn abandon(&mut self, slots: &[usize]) {
        for &slot in slots {
            if let Some(state) = self.states.get_mut(slot) {
                state.in_flight = false;
            }
        }
    }

    pub fn occluded_count(&self) -> usize {
        self.states.iter().filter(|s| s.occluded).count()
    }

    pub fn in_flight_count(&self) -> usize {
        self.states.iter().filter(|s| s.in_flight).count()
    }
}

/// One pooled readback buffer plus its map status.
struct Readback {
    buffer: wgpu::Buffer,
    status: Arc<AtomicU8>,
    /// Slot -> object mapping for the batch currently in the buffer.
    /// `None` means the buffer is free.
    slots: Option<Vec<usize>>,
}

/// GPU resources for the query pipeline: the query set itself, the resolve
/// target and a small pool of mappable readback buffers.
pub struct OcclusionResources {
    query_set: wgpu::QuerySet,
    resolve_buffer: wgpu::Buffer,
    readbacks: Vec<Readback>,
    capacity: u32,
}

impl OcclusionResources {
    pub fn new(device: &wgpu::Device, capacity: u32) -> Self {
        let capacity = capacity.max(1);
        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("occlusion_query_set"),
            ty: wgpu::QueryType::Occlusion,
            count: capacity,
        });

        let resolve_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("occlusion_resolve_buffer"),
            size: capacity as u64 * std::mem::size_of::<u64>() as u64,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        Self {
            query_set,
            resolve_buffer,
            readbacks: Vec::new(),
            capacity,
        }
    }

    pub fn query_set(&self) -> &wgpu::QuerySet {
        &self.query_set
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Whether a readback buffer could be acquired for a new batch this frame.
    pub fn can_accept_batch(&self) -> bool {
        self.readbacks.iter().any(|r| r.slots.is_none())
            || self.readbacks.len() < MAX_PENDING_READBACKS
    }

    /// Resolve the first `slots.len()` queries and copy them into a free
    /// readback buffer. Returns the pool index to pass to [`Self::begin_map`]
    /// after the encoder has been submitted, or `None` if the pool is full.
    pub fn resolve_batch(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        slots: Vec<usize>,
    ) -> Option<usize> {
        debug_assert!(slots.len() as u32 <= self.capacity);

        let index = match self.readbacks.iter().position(|r| r.slots.is_none()) {
            Some(i) => i,
            None if self.readbacks.len() < MAX_PENDING_READBACKS => {
                self.readbacks.push(Readback {
                    buffer: device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("occlusion_readback_buffer"),
                        size: self.capacity as u64 * std::mem::size_of::<u64>() as u64,
                        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                        mapped_at_creation: false,
                    }),
                    status: Arc::new(AtomicU8::new(STATUS_PENDING)),
                    slots: None,
                });
                self.readbacks.len() - 1
            }
            None => return None,
        };

        let count = slots.len() as u32;
        encoder.resolve_query_set(&self.query_set, 0..count, &self.resolve_buffer, 0);
        encoder.copy_buffer_to_buffer(
            &self.resolve_buffer,
            0,
            &self.readbacks[index].buffer,
            0,
            count as u64 * std::mem::size_of::<u64>() as u64,
        );

        let readback = &mut self.readbacks[index];
        readback.status.store(STATUS_PENDING, Ordering::Release);
        readback.slots = Some(slots);
        Some(index)
    }

    /// Kick off the async map for a batch. Must be called after the encoder
    /// that wrote the buffer has been submitted.
    pub fn begin_map(&self, index: usize) {
        let readback = &self.readbacks[index];
        let status = readback.status.clone();
        readback
            .buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let outcome = if result.is_ok() {
                    STATUS_READY
                } else {
                    STATUS_ERROR
                };
                status.store(outcome, Ordering::Release);
            });
    }

    /// Poll the device and consume every readback whose map has completed.
    /// Returns the merged consume summary.
    pub fn drain_completed(
        &mut self,
        device: &wgpu::Device,
        tracker: &mut QueryTracker,
    ) -> ConsumeSummary {
        let _ = device.poll(wgpu::Maintain::Poll);

        let mut summary = ConsumeSummary::default();
        for readback in &mut self.readbacks {
            let Some(slots) = readback.slots.as_ref() else {
                continue;
            };
            match readback.status.load(Ordering::Acquire) {
                STATUS_READY => {
                    let samples = {
                        let mapped = readback
                            .buffer
                            .slice(..slots.len() as u64 * std::mem::size_of::<u64>() as u64)
                            .get_mapped_range();
                        // from_le_bytes rather than a cast: the mapped range
                        // carries no alignment guarantee for u64.
                        mapped
                            .chunks_exact(8)
                            .map(|chunk| {
                                let mut bytes = [0u8; 8];
                                bytes.copy_from_slice(chunk);
                                u64::from_le_bytes(bytes)
                            })
                            .collect::<Vec<u64>>()
                    };
                    let batch = tracker.consume(slots, &samples);
                    summary.consumed += batch.consumed;
                    summary.newly_occluded += batch.newly_occluded;
                    summary.newly_visible += batch.newly_visible;

                    readback.buffer.unmap();
                    readback.slots = None;
                }
                STATUS_ERROR => {
                    log::warn!(
                        "occlusion readback map failed; requeueing {} queries",
                        slots.len()
                    );
                    tracker.abandon(slots);
                    readback.slots = None;
                }
                _ => {} // still pending, check again next frame
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_gating() {
        let mut tracker = QueryTracker::new(3);
        assert!(tracker.can_issue(0));
        tracker.mark_issued(0);
        assert!(!tracker.can_issue(0));
        assert!(tracker.can_issue(1));
        assert_eq!(tracker.in_flight_count(), 1);
    }

    #[test]
    fn test_consume_updates_visibility_and_clears_flight() {
        let mut tracker = QueryTracker::new(4);
        for i in 0..4 {
            tracker.mark_issued(i);
        }
        // Objects 1 and 3 reported zero samples.
        let summary = tracker.consume(&[0, 1, 2, 3], &[12, 0, 7, 0]);
        assert_eq!(summary.consumed, 4);
        assert_eq!(summary.newly_occluded, 2);
        assert_eq!(summary.newly_visible, 0);

        assert!(!tracker.is_occluded(0));
        assert!(tracker.is_occluded(1));
        assert!(!tracker.is_occluded(2));
        assert!(tracker.is_occluded(3));
        assert_eq!(tracker.in_flight_count(), 0);
        assert_eq!(tracker.occluded_count(), 2);
    }

    #[test]
    fn test_reveal_counts_as_newly_visible() {
        let mut tracker = QueryTracker::new(1);
        tracker.mark_issued(0);
        tracker.consume(&[0], &[0]);
        assert!(tracker.is_occluded(0));

        tracker.mark_issued(0);
        let summary = tracker.consume(&[0], &[1]);
        assert_eq!(summary.newly_visible, 1);
        assert!(!tracker.is_occluded(0));
    }

    #[test]
    fn test_partial_consume_leaves_rest_in_flight() {
        let mut tracker = QueryTracker::new(3);
        for i in 0..3 {
            tracker.mark_issued(i);
        }
        tracker.consume(&[1], &[0]);
        assert!(tracker.can_issue(1));
        assert!(!tracker.can_issue(0));
        assert!(!tracker.can_issue(2));
    }

    #[test]
    fn test_abandon_keeps_last_visibility() {
        let mut tracker = QueryTracker::new(2);
        tracker.mark_issued(0);
        tracker.consume(&[0], &[0]);
        assert!(tracker.is_occluded(0));

        tracker.mark_issued(0);
        tracker.mark_issued(1);
        tracker.abandon(&[0, 1]);
        // Flags freed for reissue, occlusion state untouched.
        assert!(tracker.can_issue(0));
        assert!(tracker.can_issue(1));
        assert!(tracker.is_occluded(0));
        assert!(!tracker.is_occluded(1));
    }

    #[test]
    fn test_out_of_range_slots_are_ignored() {
        let mut tracker = QueryTracker::new(1);
        tracker.mark_issued(0);
        let summary = tracker.consume(&[0, 99], &[5, 0]);
        assert_eq!(summary.consumed, 1);
        assert!(!tracker.is_occluded(0));
    }

    #[test]
    fn test_empty_tracker() {
        let mut tracker = QueryTracker::new(0);
        assert!(tracker.is_empty());
        assert!(!tracker.can_issue(0));
        assert_eq!(tracker.consume(&[], &[]), ConsumeSummary::default());
    }
}
