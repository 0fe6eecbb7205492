use crate::engine::{DuplicationEngine, NativePtr, RenderEventFunc};
use crate::error::DuplicationResult;
use crate::monitor::Monitor;

/// Pixel layout of textures the engine writes into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextureFormat {
    #[default]
    Bgra32,
}

/// The host renderer's side of texture sharing.
///
/// The engine never allocates GPU memory itself; it writes into textures
/// the host creates and hands over by native pointer.
pub trait GpuHost {
    /// Allocate a `width x height` texture and return its native pointer.
    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> DuplicationResult<NativePtr>;

    fn destroy_texture(&mut self, texture: NativePtr);

    /// Queue `func(event_id)` on the render thread, after the commands
    /// already recorded for this frame.
    fn issue_plugin_event(&mut self, func: RenderEventFunc, event_id: i32);
}

/// A GPU texture owned by one monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureTexture {
    native_ptr: NativePtr,
    width: u32,
    height: u32,
}

impl CaptureTexture {
    pub fn native_ptr(&self) -> NativePtr {
        self.native_ptr
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub(crate) fn allocate(
        gpu: &mut dyn GpuHost,
        width: u32,
        height: u32,
    ) -> DuplicationResult<Self> {
        let native_ptr = gpu.create_texture(width, height, TextureFormat::Bgra32)?;
        Ok(Self {
            native_ptr,
            width,
            height,
        })
    }
}

/// What a consumer should sample for a monitor this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureView {
    Live(CaptureTexture),
    /// The monitor is degraded or has no texture yet; show the static
    /// "not available" image.
    Placeholder,
}

impl TextureView {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }

    pub fn texture(&self) -> Option<CaptureTexture> {
        match self {
            Self::Live(texture) => Some(*texture),
            Self::Placeholder => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureState {
    Absent,
    Allocated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The current allocation already matches.
    Kept,
    Allocated,
    /// Monitor unavailable or its size is degenerate.
    Skipped,
}

/// Texture lifecycle for a single monitor.
///
/// `Absent -> Allocated -> Absent`. A size change always goes through
/// `Absent` (destroy, then create); textures are never resized in place.
#[derive(Debug, Default)]
pub struct TextureSlot {
    texture: Option<CaptureTexture>,
    dirty: bool,
}

impl TextureSlot {
    pub fn state(&self) -> TextureState {
        if self.texture.is_some() {
            TextureState::Allocated
        } else {
            TextureState::Absent
        }
    }

    pub fn texture(&self) -> Option<CaptureTexture> {
        self.texture
    }

    /// Native pointer of the current texture, null when absent.
    pub fn native_ptr(&self) -> NativePtr {
        self.texture
            .map(|texture| texture.native_ptr)
            .unwrap_or_default()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Request one render at the next end-of-frame phase.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Make sure a texture of the monitor's landscape size exists.
    pub fn ensure(
        &mut self,
        monitor: &Monitor,
        gpu: &mut dyn GpuHost,
    ) -> DuplicationResult<EnsureOutcome> {
        if !monitor.is_available() {
            return Ok(EnsureOutcome::Skipped);
        }

        let (w, h) = monitor.texture_size();
        if w <= 0 || h <= 0 {
            tracing::error!(
                monitor_id = monitor.id(),
                width = w,
                height = h,
                "refusing to allocate a degenerate capture texture"
            );
            return Ok(EnsureOutcome::Skipped);
        }
        let (w, h) = (w as u32, h as u32);

        if let Some(texture) = self.texture {
            if texture.width == w && texture.height == h {
                return Ok(EnsureOutcome::Kept);
            }
        }

        self.destroy(gpu);
        let texture = CaptureTexture::allocate(gpu, w, h)?;
        tracing::debug!(
            monitor_id = monitor.id(),
            width = w,
            height = h,
            "allocated capture texture"
        );
        self.texture = Some(texture);
        Ok(EnsureOutcome::Allocated)
    }

    /// Issue the capture blit for this frame if one is due. The engine is
    /// re-pointed at the texture before every blit since its target may
    /// have moved after a reinitialize.
    pub fn render(
        &self,
        monitor: &Monitor,
        engine: &dyn DuplicationEngine,
        gpu: &mut dyn GpuHost,
    ) -> bool {
        if !self.dirty || !monitor.is_available() {
            return false;
        }
        let Some(texture) = self.texture else {
            return false;
        };
        if texture.native_ptr.is_null() {
            return false;
        }

        engine.set_texture_ptr(monitor.id(), texture.native_ptr);
        gpu.issue_plugin_event(engine.render_event_func(), monitor.id());
        true
    }

    /// End-of-frame phase: render if dirty, then clear the request
    /// whether or not anything was issued.
    pub fn present(
        &mut self,
        monitor: &Monitor,
        engine: &dyn DuplicationEngine,
        gpu: &mut dyn GpuHost,
    ) -> bool {
        let rendered = self.render(monitor, engine, gpu);
        self.dirty = false;
        rendered
    }

    /// Release the texture. Safe to call when nothing is allocated.
    pub fn destroy(&mut self, gpu: &mut dyn GpuHost) {
        if let Some(texture) = self.texture.take() {
            gpu.destroy_texture(texture.native_ptr);
        }
    }

    pub fn view(&self, monitor: &Monitor) -> TextureView {
        match self.texture {
            Some(texture) if monitor.is_available() => TextureView::Live(texture),
            _ => TextureView::Placeholder,
        }
    }
}
