//! # Frame
//!
//! Reference-counted sensor frames.
//!
//! - [`Frame`]: header, data, metadata blob, kind (video / depth / motion / composite)
//! - [`FrameHandle`]: counted reference; the last drop recycles the frame
//! - [`FrameOwner`]: the archive a published frame reports back to
//! - [`MetadataParserMap`] / [`FrameContext`]: metadata lookup tables
//!
//! ## Lifecycle
//!
//! ```ignore
//! let frame = FrameBuilder::new()
//!     .header(header)
//!     .profile(profile)
//!     .data(buffer)
//!     .build()?;
//!
//! // Owner binds exactly once, refcount = 1
//! let handle = frame.publish(archive.clone()).ok_or(...)?;
//! let extra = handle.acquire();   // refcount = 2
//! handle.keep();                  // pin, owner notified once
//! drop(extra);
//! drop(handle);                   // continuation runs, slot recycled
//! ```

mod builder;
mod context;
mod frame;
mod handle;
mod metadata;
mod owner;

#[cfg(test)]
mod test_support;

pub use builder::FrameBuilder;
pub use context::{FrameContext, FrameContextBuilder};
pub use frame::{DepthInfo, Frame, FrameContinuation, FrameKind, VideoInfo};
pub use handle::{FrameCell, FrameHandle};
pub use metadata::{
    BlobParser, HeaderParser, MetadataParser, MetadataParserMap, ProfileFpsParser, ValueModifier,
};
pub use owner::FrameOwner;
