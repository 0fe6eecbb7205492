use std::fmt;

use crate::engine::{
    CursorShape, DuplicationEngine, DuplicatorState, MonitorRotation, MoveRect, NativeRect,
};
use crate::rect::{self, DirtyRect, MovedRegion};

/// DPI reported by the engine when Windows treats cloned outputs as one
/// physical unit.
const UNKNOWN_DPI: i32 = 0;
const FALLBACK_DPI: i32 = 100;
const METERS_PER_INCH: f32 = 0.0254;

/// Snapshot of the cursor as seen from one monitor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CursorState {
    /// `true` only when this monitor owns the cursor and it is shown.
    pub visible: bool,
    /// Position in monitor-relative desktop pixels.
    pub x: i32,
    pub y: i32,
    pub hotspot_x: i32,
    pub hotspot_y: i32,
    pub shape: CursorShape,
}

/// Mirror of the engine's per-display state.
///
/// The id is an index into the engine's current enumeration, not a stable
/// identity; a `Monitor` must be re-acquired by id after the session
/// reinitializes.
#[derive(Clone, Debug)]
pub struct Monitor {
    id: i32,
    state: DuplicatorState,
    name: String,
    rect: NativeRect,
    raw_dpi_x: i32,
    raw_dpi_y: i32,
    rotation: MonitorRotation,
    is_primary: bool,
    is_hdr: bool,
    cursor: CursorState,
    move_rects: Vec<MoveRect>,
    dirty_rects: Vec<NativeRect>,
    use_get_pixels: bool,
}

impl Monitor {
    /// Read monitor `id` from the engine and log any degraded state.
    pub fn new(engine: &dyn DuplicationEngine, id: i32) -> Self {
        let mut monitor = Self {
            id,
            state: DuplicatorState::NotSet,
            name: String::new(),
            rect: NativeRect::default(),
            raw_dpi_x: UNKNOWN_DPI,
            raw_dpi_y: UNKNOWN_DPI,
            rotation: MonitorRotation::Unspecified,
            is_primary: false,
            is_hdr: false,
            cursor: CursorState::default(),
            move_rects: Vec::new(),
            dirty_rects: Vec::new(),
            use_get_pixels: false,
        };
        monitor.refresh(engine);
        monitor.log_state();
        monitor
    }

    /// Re-read every cached field for this id. Has no effect on the engine.
    pub fn refresh(&mut self, engine: &dyn DuplicationEngine) {
        let id = self.id;
        self.state = engine.state(id);
        self.name = engine.name(id);
        self.rect = engine.rect(id);
        self.raw_dpi_x = engine.dpi_x(id);
        self.raw_dpi_y = engine.dpi_y(id);
        self.rotation = engine.rotation(id);
        self.is_primary = engine.is_primary(id);
        self.is_hdr = engine.is_hdr(id);
        self.move_rects = engine.move_rects(id);
        self.dirty_rects = engine.dirty_rects(id);
        self.refresh_cursor(engine);
    }

    pub(crate) fn refresh_cursor(&mut self, engine: &dyn DuplicationEngine) {
        let owns_cursor = engine.cursor_monitor_id() == self.id;
        if !owns_cursor {
            self.cursor = CursorState::default();
            return;
        }
        let (x, y) = engine.cursor_position();
        let (hotspot_x, hotspot_y) = engine.cursor_hotspot();
        self.cursor = CursorState {
            visible: engine.is_cursor_visible(),
            x,
            y,
            hotspot_x,
            hotspot_y,
            shape: engine.cursor_shape(),
        };
    }

    fn log_state(&self) {
        let (id, name) = (self.id, self.name.as_str());
        match self.state {
            DuplicatorState::Ready | DuplicatorState::Running => {}
            DuplicatorState::AccessDenied => {
                tracing::warn!(monitor_id = id, name, "access denied")
            }
            DuplicatorState::Unsupported => tracing::warn!(monitor_id = id, name, "unsupported"),
            DuplicatorState::CurrentlyNotAvailable => {
                tracing::warn!(monitor_id = id, name, "currently not available")
            }
            DuplicatorState::SessionDisconnected => {
                tracing::warn!(monitor_id = id, name, "session disconnected")
            }
            DuplicatorState::AccessLost => tracing::warn!(monitor_id = id, name, "access lost"),
            DuplicatorState::InvalidArg => tracing::error!(monitor_id = id, name, "invalid"),
            DuplicatorState::TextureSizeInconsistent => {
                tracing::error!(monitor_id = id, name, "texture size inconsistent")
            }
            DuplicatorState::NotSet => tracing::error!(monitor_id = id, name, "something wrong"),
            DuplicatorState::Unknown => tracing::error!(monitor_id = id, name, "unknown error"),
        }

        if self.raw_dpi_x == UNKNOWN_DPI || self.raw_dpi_y == UNKNOWN_DPI {
            tracing::warn!(monitor_id = id, name, "could not get DPI");
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    /// Whether this id is still inside the engine's enumeration.
    pub fn exists(&self, monitor_count: i32) -> bool {
        self.id < monitor_count
    }

    pub fn state(&self) -> DuplicatorState {
        self.state
    }

    pub fn is_available(&self) -> bool {
        self.state.is_available()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    pub fn is_hdr(&self) -> bool {
        self.is_hdr
    }

    pub fn rect(&self) -> NativeRect {
        self.rect
    }

    pub fn left(&self) -> i32 {
        self.rect.left
    }

    pub fn top(&self) -> i32 {
        self.rect.top
    }

    pub fn right(&self) -> i32 {
        self.rect.right
    }

    pub fn bottom(&self) -> i32 {
        self.rect.bottom
    }

    pub fn width(&self) -> i32 {
        self.rect.width()
    }

    pub fn height(&self) -> i32 {
        self.rect.height()
    }

    pub fn dpi_x(&self) -> i32 {
        substitute_dpi(self.raw_dpi_x)
    }

    pub fn dpi_y(&self) -> i32 {
        substitute_dpi(self.raw_dpi_y)
    }

    /// DPI as the engine reported it, `0` included.
    pub fn raw_dpi(&self) -> (i32, i32) {
        (self.raw_dpi_x, self.raw_dpi_y)
    }

    pub fn width_meters(&self) -> f32 {
        self.width() as f32 / self.dpi_x() as f32 * METERS_PER_INCH
    }

    pub fn height_meters(&self) -> f32 {
        self.height() as f32 / self.dpi_y() as f32 * METERS_PER_INCH
    }

    pub fn rotation(&self) -> MonitorRotation {
        self.rotation
    }

    pub fn aspect(&self) -> f32 {
        self.width() as f32 / self.height() as f32
    }

    pub fn is_horizontal(&self) -> bool {
        self.width() > self.height()
    }

    pub fn is_vertical(&self) -> bool {
        self.height() > self.width()
    }

    /// Size of the backing texture. Always landscape: a quarter-turned
    /// panel keeps its scan-out orientation and rotation is applied when
    /// presenting. Without rotation info the longer side is taken as width.
    pub fn texture_size(&self) -> (i32, i32) {
        let (w, h) = (self.width(), self.height());
        match self.rotation {
            MonitorRotation::Rotate90 | MonitorRotation::Rotate270 => (h, w),
            MonitorRotation::Identity | MonitorRotation::Rotate180 => (w, h),
            MonitorRotation::Unspecified if self.is_horizontal() => (w, h),
            MonitorRotation::Unspecified => (h, w),
        }
    }

    pub fn cursor(&self) -> &CursorState {
        &self.cursor
    }

    pub fn is_cursor_visible(&self) -> bool {
        self.cursor.visible
    }

    pub fn move_rects(&self) -> &[MoveRect] {
        &self.move_rects
    }

    pub fn dirty_rects(&self) -> &[NativeRect] {
        &self.dirty_rects
    }

    /// Dirty rectangles clipped to this monitor's texture.
    pub fn dirty_rects_local(&self) -> Vec<DirtyRect> {
        let (w, h) = self.texture_size();
        rect::normalize_dirty_rects(&self.dirty_rects, w.max(0) as u32, h.max(0) as u32)
    }

    /// Changed pixels in the last capture delta.
    pub fn dirty_area(&self) -> u64 {
        rect::dirty_area(&self.dirty_rects_local())
    }

    pub fn moved_regions_local(&self) -> Vec<MovedRegion> {
        let (w, h) = self.texture_size();
        rect::normalize_move_rects(&self.move_rects, w.max(0) as u32, h.max(0) as u32)
    }

    pub fn uses_get_pixels(&self) -> bool {
        self.use_get_pixels
    }

    /// Opt in to CPU readback for this monitor. The engine then keeps a
    /// staging copy of every frame.
    pub fn set_use_get_pixels(&mut self, engine: &dyn DuplicationEngine, enabled: bool) {
        self.use_get_pixels = enabled;
        engine.use_get_pixels(self.id, enabled);
    }
}

impl fmt::Display for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.name)
    }
}

fn substitute_dpi(dpi: i32) -> i32 {
    if dpi == UNKNOWN_DPI { FALLBACK_DPI } else { dpi }
}
