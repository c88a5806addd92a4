//! 热路径分配计数
//!
//! Warm archive: publishing and releasing dataless frames must not touch the
//! global allocator.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::sync::Arc;

use archive::FrameArchive;
use contracts::{
    ArchiveConfig, FrameHeader, PixelFormat, SensorInfo, StreamKind, StreamProfile,
    TimestampDomain,
};
use frame::{Frame, FrameBuilder, FrameContext};

struct CountingAllocator;

thread_local! {
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

fn count_one() {
    // Thread teardown may run after the slot is gone
    let _ = ALLOCATIONS.try_with(|count| count.set(count.get() + 1));
}

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        count_one();
        System.alloc(layout)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        count_one();
        System.alloc_zeroed(layout)
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        count_one();
        System.realloc(ptr, layout, new_size)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

fn allocations() -> usize {
    ALLOCATIONS.with(Cell::get)
}

fn gyro_frames(count: u64) -> Vec<Frame> {
    let profile = Arc::new(StreamProfile::motion(
        StreamKind::Gyro.into(),
        PixelFormat::MotionXyz32f,
        200,
    ));
    (0..count)
        .map(|n| {
            FrameBuilder::new()
                .header(FrameHeader::new(
                    n,
                    n as f64 * 5.0,
                    TimestampDomain::HardwareClock,
                ))
                .profile(profile.clone())
                .motion()
                .build()
                .unwrap()
        })
        .collect()
}

#[test]
fn test_warm_publish_release_does_not_allocate() {
    let sensor = SensorInfo {
        name: "Motion Module".to_string(),
        serial: "831612073".to_string(),
    };
    let archive = FrameArchive::new(ArchiveConfig::default(), FrameContext::standard(), sensor);

    // Registers the stream gauge and parks the first cell
    for frame in gyro_frames(4) {
        drop(archive.publish(frame).unwrap());
    }
    assert_eq!(archive.pooled_cells(), 1);

    let mut frames = gyro_frames(1000);
    frames.reverse();

    let before = allocations();
    while let Some(frame) = frames.pop() {
        let handle = archive.publish(frame).unwrap();
        drop(handle);
    }
    let during = allocations() - before;

    assert_eq!(during, 0, "{during} allocations for 1000 publish/release cycles");
    assert_eq!(archive.in_use(), 0);
    assert_eq!(archive.published_count(StreamKind::Gyro.into()), 0);
}
