use rustc_hash::FxHashMap;

use crate::engine::DuplicationEngine;
use crate::monitor::Monitor;
use crate::texture::{CaptureTexture, GpuHost};

/// Written into the presentation vector when the cursor is hidden, far
/// enough outside `[0, 1]` that shaders can test visibility by range.
pub const OFFSCREEN_COORD: f32 = -9999.0;

pub const DEFAULT_CURSOR_CACHE_CAPACITY: usize = 8;

/// How a monitor is mapped into model space for cursor placement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CursorModel {
    /// Model-space extent of the monitor quad.
    pub scale: [f32; 2],
    /// Mirror the vertical axis, for quads whose UVs are flipped.
    pub invert_y: bool,
}

impl Default for CursorModel {
    fn default() -> Self {
        Self {
            scale: [1.0, 1.0],
            invert_y: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CursorSample {
    pub monitor_id: i32,
    /// Cursor position in model space (origin at the quad center, +y up).
    /// `None` while the cursor is hidden or on another monitor.
    pub position: Option<[f32; 2]>,
    /// `(x, y, shape_width, shape_height)`, each normalized by the monitor
    /// size. `x` and `y` are [`OFFSCREEN_COORD`] while hidden.
    pub coord: [f32; 4],
    pub texture: Option<CaptureTexture>,
}

impl CursorSample {
    pub fn is_visible(&self) -> bool {
        self.position.is_some()
    }
}

#[derive(Debug)]
struct CachedShape {
    texture: CaptureTexture,
    last_used: u64,
}

/// Per-frame cursor extraction with a small texture cache keyed by shape
/// size. Shape sizes change rarely, so a handful of entries is enough.
#[derive(Debug)]
pub struct CursorSampler {
    cache: FxHashMap<(u32, u32), CachedShape>,
    capacity: usize,
    clock: u64,
}

impl CursorSampler {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: FxHashMap::default(),
            capacity: capacity.max(1),
            clock: 0,
        }
    }

    pub fn cached_shapes(&self) -> usize {
        self.cache.len()
    }

    pub fn sample(
        &mut self,
        monitor: &Monitor,
        model: &CursorModel,
        engine: &dyn DuplicationEngine,
        gpu: &mut dyn GpuHost,
    ) -> CursorSample {
        self.clock += 1;
        let cursor = monitor.cursor();
        let (w, h) = (monitor.width().max(1) as f32, monitor.height().max(1) as f32);

        let position = cursor.visible.then(|| {
            let x = (cursor.x as f32 / w - 0.5) * model.scale[0];
            let y = (0.5 - cursor.y as f32 / h) * model.scale[1];
            let y = if model.invert_y { -y } else { y };
            [x, y]
        });

        let (cx, cy) = if cursor.visible {
            (cursor.x as f32 / w, cursor.y as f32 / h)
        } else {
            (OFFSCREEN_COORD, OFFSCREEN_COORD)
        };
        let coord = [
            cx,
            cy,
            cursor.shape.width.max(0) as f32 / w,
            cursor.shape.height.max(0) as f32 / h,
        ];

        let texture = if cursor.shape.has_pixels() {
            let key = (cursor.shape.width as u32, cursor.shape.height as u32);
            let texture = self.texture_for(key, gpu);
            if let Some(texture) = texture {
                engine.update_cursor_texture(texture.native_ptr());
            }
            texture
        } else {
            None
        };

        CursorSample {
            monitor_id: monitor.id(),
            position,
            coord,
            texture,
        }
    }

    fn texture_for(&mut self, key: (u32, u32), gpu: &mut dyn GpuHost) -> Option<CaptureTexture> {
        let clock = self.clock;
        if let Some(entry) = self.cache.get_mut(&key) {
            entry.last_used = clock;
            return Some(entry.texture);
        }

        if self.cache.len() >= self.capacity {
            self.evict_least_recent(gpu);
        }

        match CaptureTexture::allocate(gpu, key.0, key.1) {
            Ok(texture) => {
                self.cache.insert(
                    key,
                    CachedShape {
                        texture,
                        last_used: clock,
                    },
                );
                Some(texture)
            }
            Err(err) => {
                tracing::warn!(
                    width = key.0,
                    height = key.1,
                    "failed to allocate cursor texture: {err}"
                );
                None
            }
        }
    }

    fn evict_least_recent(&mut self, gpu: &mut dyn GpuHost) {
        let oldest = self
            .cache
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| *key);
        if let Some(entry) = oldest.and_then(|key| self.cache.remove(&key)) {
            gpu.destroy_texture(entry.texture.native_ptr());
        }
    }

    /// Release every cached cursor texture.
    pub fn clear(&mut self, gpu: &mut dyn GpuHost) {
        for (_, entry) in self.cache.drain() {
            gpu.destroy_texture(entry.texture.native_ptr());
        }
    }
}

impl Default for CursorSampler {
    fn default() -> Self {
        Self::new(DEFAULT_CURSOR_CACHE_CAPACITY)
    }
}
