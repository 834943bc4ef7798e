//! Color buffers and the transient render-target pool.

use std::cell::{Cell, RefCell};
use std::ops::{Deref, DerefMut};

use image::RgbaImage;
use tracing::trace;

use crate::error::EffectError;

/// Pooled buffers kept around after release, per pool.
const DEFAULT_MAX_FREE: usize = 4;

/// Color encoding of a frame. Passes never convert between the two; the tag
/// travels with every buffer derived from a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    #[default]
    Rgba8Unorm,
    /// sRGB-encoded color, as decoded from image files.
    Rgba8UnormSrgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl FrameDescriptor {
    /// Descriptor reduced by `levels` octaves, never below 1x1.
    pub fn downsampled(&self, levels: u32) -> Self {
        let shrink = |extent: u32| extent.checked_shr(levels).unwrap_or(0).max(1);
        Self {
            width: shrink(self.width),
            height: shrink(self.height),
            format: self.format,
        }
    }
}

/// A 2D RGBA8 color buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    format: PixelFormat,
    image: RgbaImage,
}

impl Frame {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            format,
            image: RgbaImage::new(width, height),
        }
    }

    pub fn from_descriptor(desc: FrameDescriptor) -> Self {
        Self::new(desc.width, desc.height, desc.format)
    }

    pub fn from_image(image: RgbaImage, format: PixelFormat) -> Self {
        Self { format, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// True when either extent is zero.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn descriptor(&self) -> FrameDescriptor {
        FrameDescriptor {
            width: self.width(),
            height: self.height(),
            format: self.format,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Copy `other` byte for byte into this frame.
    ///
    /// # Errors
    /// Returns [`EffectError::FrameMismatch`] when the dimensions differ.
    pub fn copy_from(&mut self, other: &Frame) -> Result<(), EffectError> {
        if self.width() != other.width() || self.height() != other.height() {
            return Err(EffectError::FrameMismatch(format!(
                "cannot copy {}x{} into {}x{}",
                other.width(),
                other.height(),
                self.width(),
                self.height()
            )));
        }
        self.image.copy_from_slice(other.image.as_raw());
        Ok(())
    }
}

/// Source of short-lived off-screen render targets.
///
/// Pools are used from a single render thread, so both methods take `&self`
/// and keep their bookkeeping in cells.
pub trait FramePool {
    /// # Errors
    /// Implementations may fail when no buffer can be provided.
    fn acquire(&self, desc: FrameDescriptor) -> Result<Frame, EffectError>;

    fn release(&self, frame: Frame);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub acquired: u64,
    pub released: u64,
    pub reused: u64,
    pub live: usize,
    pub peak_live: usize,
}

impl PoolStats {
    /// Every acquired buffer has been handed back.
    pub fn is_balanced(&self) -> bool {
        self.acquired == self.released && self.live == 0
    }
}

/// Free-list pool that recycles released buffers with a matching descriptor.
#[derive(Debug)]
pub struct TransientPool {
    free: RefCell<Vec<Frame>>,
    stats: Cell<PoolStats>,
    max_free: usize,
}

impl TransientPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_FREE)
    }

    pub fn with_capacity(max_free: usize) -> Self {
        Self {
            free: RefCell::new(Vec::with_capacity(max_free)),
            stats: Cell::new(PoolStats::default()),
            max_free,
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.get()
    }

    /// Number of released buffers waiting for reuse.
    pub fn idle(&self) -> usize {
        self.free.borrow().len()
    }

    /// Drop every idle buffer.
    pub fn clear(&self) {
        self.free.borrow_mut().clear();
    }
}

impl Default for TransientPool {
    fn default() -> Self {
        Self::new()
    }
}

impl FramePool for TransientPool {
    fn acquire(&self, desc: FrameDescriptor) -> Result<Frame, EffectError> {
        let mut stats = self.stats.get();
        let recycled = {
            let mut free = self.free.borrow_mut();
            free.iter()
                .position(|frame| frame.descriptor() == desc)
                .map(|idx| free.swap_remove(idx))
        };
        let frame = match recycled {
            Some(frame) => {
                stats.reused += 1;
                frame
            }
            None => Frame::from_descriptor(desc),
        };
        stats.acquired += 1;
        stats.live += 1;
        stats.peak_live = stats.peak_live.max(stats.live);
        self.stats.set(stats);
        trace!(width = desc.width, height = desc.height, live = stats.live, "acquire transient");
        Ok(frame)
    }

    fn release(&self, frame: Frame) {
        let mut stats = self.stats.get();
        stats.released += 1;
        stats.live = stats.live.saturating_sub(1);
        self.stats.set(stats);
        let mut free = self.free.borrow_mut();
        if free.len() < self.max_free {
            free.push(frame);
        }
    }
}

/// Scoped transient buffer, handed back to its pool when dropped.
pub struct TransientFrame<'p> {
    pool: &'p dyn FramePool,
    frame: Option<Frame>,
}

impl<'p> TransientFrame<'p> {
    pub fn acquire(pool: &'p dyn FramePool, desc: FrameDescriptor) -> Result<Self, EffectError> {
        let frame = pool.acquire(desc)?;
        Ok(Self {
            pool,
            frame: Some(frame),
        })
    }
}

impl Deref for TransientFrame<'_> {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        self.frame.as_ref().expect("transient frame already released")
    }
}

impl DerefMut for TransientFrame<'_> {
    fn deref_mut(&mut self) -> &mut Frame {
        self.frame.as_mut().expect("transient frame already released")
    }
}

impl Drop for TransientFrame<'_> {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.pool.release(frame);
        }
    }
}
