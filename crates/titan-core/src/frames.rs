//! Hand-off of rendered frames from the render thread to consumers.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::trace;

use titan_engine::BYTES_PER_PIXEL;
use titan_ipc::FramePayload;

/// Which image a published frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSlot {
    Program,
    Preview,
}

/// Latest complete frames, tightly packed BGRA (`width * 4` bytes per row).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub program: Option<Bytes>,
    pub preview: Option<Bytes>,
}

impl Frame {
    /// Encode for the host boundary.
    pub fn payload(&self) -> FramePayload {
        FramePayload {
            width: self.width,
            height: self.height,
            program: self.program.as_ref().map(|pixels| STANDARD.encode(pixels)),
            preview: self.preview.as_ref().map(|pixels| STANDARD.encode(pixels)),
        }
    }
}

#[derive(Default)]
struct FrameBuffers {
    width: u32,
    height: u32,
    program: Option<Vec<u8>>,
    preview: Option<Vec<u8>>,

    /// Name of the source nominated for preview rendering.
    preview_source: Option<String>,
}

/// Frame buffers shared between the render callback and the control thread.
#[derive(Default)]
pub struct FrameExchange {
    inner: Mutex<FrameBuffers>,
}

impl FrameExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy one image into `slot`, dropping any row padding.
    ///
    /// Returns false (leaving the previous frame in place) when the image is
    /// empty or smaller than `row_stride * height` claims.
    pub fn publish(
        &self,
        slot: FrameSlot,
        pixels: &[u8],
        row_stride: usize,
        width: u32,
        height: u32,
    ) -> bool {
        self.store(slot, None, pixels, row_stride, width, height)
    }

    /// Copy a preview image rendered from `source`.
    ///
    /// Skipped when `source` is no longer the nominated preview, so a render
    /// racing a transition cannot bring back a cleared preview.
    pub fn publish_preview(
        &self,
        source: &str,
        pixels: &[u8],
        row_stride: usize,
        width: u32,
        height: u32,
    ) -> bool {
        self.store(FrameSlot::Preview, Some(source), pixels, row_stride, width, height)
    }

    fn store(
        &self,
        slot: FrameSlot,
        nominee: Option<&str>,
        pixels: &[u8],
        row_stride: usize,
        width: u32,
        height: u32,
    ) -> bool {
        let row_bytes = width as usize * BYTES_PER_PIXEL;
        let rows = height as usize;
        if row_bytes == 0 || rows == 0 || row_stride < row_bytes {
            return false;
        }
        if pixels.len() < row_stride * (rows - 1) + row_bytes {
            trace!(len = pixels.len(), row_stride, width, height, "Short image, skipping");
            return false;
        }

        let mut inner = self.inner.lock();
        if nominee.is_some() && inner.preview_source.as_deref() != nominee {
            trace!(?nominee, "Preview nomination changed, dropping frame");
            return false;
        }
        let buffer = match slot {
            FrameSlot::Program => {
                inner.width = width;
                inner.height = height;
                inner.program.get_or_insert_with(Vec::new)
            }
            FrameSlot::Preview => inner.preview.get_or_insert_with(Vec::new),
        };
        buffer.resize(row_bytes * rows, 0);
        for (dst, src) in buffer
            .chunks_exact_mut(row_bytes)
            .zip(pixels.chunks(row_stride))
        {
            dst.copy_from_slice(&src[..row_bytes]);
        }
        true
    }

    /// Free the preview buffer.
    pub fn clear_preview(&self) {
        self.inner.lock().preview = None;
    }

    /// Copy out the latest frames.
    pub fn fetch(&self) -> Frame {
        let inner = self.inner.lock();
        Frame {
            width: inner.width,
            height: inner.height,
            program: inner.program.as_deref().map(Bytes::copy_from_slice),
            preview: inner.preview.as_deref().map(Bytes::copy_from_slice),
        }
    }

    /// Dimensions of the latest program frame.
    pub fn dimensions(&self) -> (u32, u32) {
        let inner = self.inner.lock();
        (inner.width, inner.height)
    }

    /// Nominate a source for preview rendering, or stop preview rendering.
    pub fn nominate_preview(&self, source: Option<String>) {
        let mut inner = self.inner.lock();
        if source.is_none() {
            inner.preview = None;
        }
        inner.preview_source = source;
    }

    /// Source currently nominated for preview.
    pub fn preview_source(&self) -> Option<String> {
        self.inner.lock().preview_source.clone()
    }

    /// Drop every buffer and the preview nomination.
    pub fn reset(&self) {
        *self.inner.lock() = FrameBuffers::default();
    }
}
