use std::ffi::c_void;

use crate::error::DuplicationResult;

/// Per-monitor health reported by the native duplicator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DuplicatorState {
    NotSet,
    Ready,
    Running,
    InvalidArg,
    AccessDenied,
    Unsupported,
    CurrentlyNotAvailable,
    SessionDisconnected,
    AccessLost,
    TextureSizeInconsistent,
    Unknown,
}

impl DuplicatorState {
    pub const fn from_raw(raw: i32) -> Self {
        match raw {
            -1 => Self::NotSet,
            0 => Self::Ready,
            1 => Self::Running,
            2 => Self::InvalidArg,
            3 => Self::AccessDenied,
            4 => Self::Unsupported,
            5 => Self::CurrentlyNotAvailable,
            6 => Self::SessionDisconnected,
            7 => Self::AccessLost,
            8 => Self::TextureSizeInconsistent,
            _ => Self::Unknown,
        }
    }

    pub const fn as_raw(self) -> i32 {
        match self {
            Self::NotSet => -1,
            Self::Ready => 0,
            Self::Running => 1,
            Self::InvalidArg => 2,
            Self::AccessDenied => 3,
            Self::Unsupported => 4,
            Self::CurrentlyNotAvailable => 5,
            Self::SessionDisconnected => 6,
            Self::AccessLost => 7,
            Self::TextureSizeInconsistent => 8,
            Self::Unknown => 999,
        }
    }

    /// Texture updates from the engine are trusted only in these states.
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }

    /// States that can only be cleared by tearing down and rebuilding the
    /// native session.
    pub const fn requires_reinitialize(self) -> bool {
        matches!(
            self,
            Self::NotSet
                | Self::AccessLost
                | Self::AccessDenied
                | Self::SessionDisconnected
                | Self::Unknown
        )
    }

    /// Configuration faults: logged loudly, never retried on their own.
    pub const fn is_invalid_configuration(self) -> bool {
        matches!(self, Self::InvalidArg | Self::TextureSizeInconsistent)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotSet => "not-set",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::InvalidArg => "invalid-arg",
            Self::AccessDenied => "access-denied",
            Self::Unsupported => "unsupported",
            Self::CurrentlyNotAvailable => "currently-not-available",
            Self::SessionDisconnected => "session-disconnected",
            Self::AccessLost => "access-lost",
            Self::TextureSizeInconsistent => "texture-size-inconsistent",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MonitorRotation {
    #[default]
    Unspecified,
    Identity,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl MonitorRotation {
    pub const fn from_raw(raw: i32) -> Self {
        match raw {
            1 => Self::Identity,
            2 => Self::Rotate90,
            3 => Self::Rotate180,
            4 => Self::Rotate270,
            _ => Self::Unspecified,
        }
    }

    /// Whether the physical panel is turned a quarter turn from its
    /// native scan-out orientation.
    pub const fn is_quarter_turn(self) -> bool {
        matches!(self, Self::Rotate90 | Self::Rotate270)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CursorShapeType {
    #[default]
    Unspecified,
    Monochrome,
    Color,
    MaskedColor,
}

impl CursorShapeType {
    pub const fn from_raw(raw: i32) -> Self {
        match raw {
            1 => Self::Monochrome,
            2 => Self::Color,
            4 => Self::MaskedColor,
            _ => Self::Unspecified,
        }
    }
}

/// Queued notification drained from the engine once per tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineMessage {
    None,
    Reinitialized,
    TextureSizeChanged,
}

impl EngineMessage {
    pub const fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::Reinitialized,
            1 => Self::TextureSizeChanged,
            _ => Self::None,
        }
    }
}

/// Where the native plugin writes its own diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DebugMode {
    #[default]
    None,
    File,
    /// Forward plugin log lines into `tracing`.
    Log,
}

impl DebugMode {
    pub const fn as_raw(self) -> i32 {
        match self {
            Self::None => 0,
            Self::File => 1,
            Self::Log => 2,
        }
    }
}

/// Rectangle in virtual-desktop pixel coordinates, laid out like Win32 `RECT`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NativeRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl NativeRect {
    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Win32 `POINT`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NativePoint {
    pub x: i32,
    pub y: i32,
}

/// Scrolled or dragged content: the destination rectangle was copied from
/// a same-sized rectangle whose top-left is `source_point`. Layout matches
/// `DXGI_OUTDUPL_MOVE_RECT`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MoveRect {
    pub source_point: NativePoint,
    pub destination: NativeRect,
}

/// 32-bit pixel as written by the engine's readback path.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Opaque native pointer (GPU texture, shared handle or CPU buffer).
///
/// Stored as an integer so value types holding it stay `Send` and `Copy`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NativePtr(pub usize);

impl NativePtr {
    pub const fn null() -> Self {
        Self(0)
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }
}

/// Render-thread callback exported by the engine. The host hands it to
/// its generic "issue plugin event" primitive together with a monitor id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderEventFunc(pub NativePtr);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CursorShape {
    pub width: i32,
    pub height: i32,
    pub pitch: i32,
    pub kind: CursorShapeType,
}

impl CursorShape {
    pub const fn has_pixels(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Synchronous surface of the native capture engine.
///
/// Every call is blocking and must happen on the thread that drives the
/// session. Monitors are addressed by their index in the engine's current
/// enumeration; indices are reassigned on every reinitialize.
pub trait DuplicationEngine {
    fn initialize(&self);
    fn finalize(&self);
    fn reinitialize(&self);
    fn is_initialized(&self) -> bool;
    /// Per-tick pump.
    fn update(&self);
    fn pop_message(&self) -> EngineMessage;

    fn set_debug_mode(&self, _mode: DebugMode) {}
    /// Install or remove the `tracing` forwarders for native log lines.
    fn set_log_forwarding(&self, _enabled: bool) {}
    fn set_timeout(&self, _timeout_ms: i32) {}
    fn set_frame_rate(&self, _frame_rate: u32) {}

    fn monitor_count(&self) -> i32;
    fn has_monitor_count_changed(&self) -> bool;
    fn cursor_monitor_id(&self) -> i32;
    fn total_width(&self) -> i32;
    fn total_height(&self) -> i32;

    fn state(&self, id: i32) -> DuplicatorState;
    fn name(&self, id: i32) -> String;
    fn rect(&self, id: i32) -> NativeRect;
    /// Native size of the monitor. Engines that export it separately
    /// should override; the default reads it off [`rect`](Self::rect).
    fn width(&self, id: i32) -> i32 {
        self.rect(id).width()
    }
    fn height(&self, id: i32) -> i32 {
        self.rect(id).height()
    }
    fn dpi_x(&self, id: i32) -> i32;
    fn dpi_y(&self, id: i32) -> i32;
    fn rotation(&self, id: i32) -> MonitorRotation;
    fn is_primary(&self, id: i32) -> bool;
    fn is_hdr(&self, _id: i32) -> bool {
        false
    }

    fn is_cursor_visible(&self) -> bool;
    /// Cursor position relative to the cursor-owning monitor.
    fn cursor_position(&self) -> (i32, i32);
    fn cursor_hotspot(&self) -> (i32, i32);
    fn cursor_shape(&self) -> CursorShape;
    /// Copy the current cursor bitmap into a texture of the shape's size.
    fn update_cursor_texture(&self, texture: NativePtr);

    fn set_texture_ptr(&self, id: i32, texture: NativePtr);
    fn render_event_func(&self) -> RenderEventFunc;
    fn shared_texture_handle(&self, _id: i32) -> NativePtr {
        NativePtr::null()
    }

    fn move_rects(&self, id: i32) -> Vec<MoveRect>;
    fn dirty_rects(&self, id: i32) -> Vec<NativeRect>;

    fn use_get_pixels(&self, id: i32, enabled: bool);
    /// Read a `width * height` block into `out`. `out` is at least that long.
    fn get_pixels(&self, id: i32, out: &mut [Rgba8], x: i32, y: i32, width: i32, height: i32)
    -> bool;
    fn buffer(&self, id: i32) -> NativePtr;
    fn has_been_updated(&self, id: i32) -> bool;
}

/// Load the native engine from the default location, or from
/// `DESKDUP_LIBRARY` when set.
pub fn default_engine() -> DuplicationResult<Box<dyn DuplicationEngine>> {
    crate::platform::build_engine()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ready_and_running_are_available() {
        for raw in [-1, 0, 1, 2, 3, 4, 5, 6, 7, 8, 999, 42] {
            let state = DuplicatorState::from_raw(raw);
            assert_eq!(
                state.is_available(),
                matches!(state, DuplicatorState::Ready | DuplicatorState::Running),
                "{state:?}"
            );
        }
    }

    #[test]
    fn unrecognized_state_codes_are_unknown() {
        assert_eq!(DuplicatorState::from_raw(42), DuplicatorState::Unknown);
        assert_eq!(DuplicatorState::Unknown.as_raw(), 999);
        assert!(DuplicatorState::Unknown.requires_reinitialize());
    }

    #[test]
    fn reinitialize_set_excludes_configuration_faults() {
        assert!(DuplicatorState::AccessLost.requires_reinitialize());
        assert!(DuplicatorState::SessionDisconnected.requires_reinitialize());
        assert!(!DuplicatorState::InvalidArg.requires_reinitialize());
        assert!(!DuplicatorState::CurrentlyNotAvailable.requires_reinitialize());
        assert!(!DuplicatorState::Unsupported.requires_reinitialize());
    }

    #[test]
    fn message_codes_map_to_variants() {
        assert_eq!(EngineMessage::from_raw(-1), EngineMessage::None);
        assert_eq!(EngineMessage::from_raw(0), EngineMessage::Reinitialized);
        assert_eq!(EngineMessage::from_raw(1), EngineMessage::TextureSizeChanged);
    }

    #[test]
    fn cursor_shape_type_uses_dxgi_codes() {
        assert_eq!(CursorShapeType::from_raw(4), CursorShapeType::MaskedColor);
        assert_eq!(CursorShapeType::from_raw(3), CursorShapeType::Unspecified);
    }

    #[test]
    fn move_rect_matches_native_record_size() {
        // POINT + RECT; the engine hands out a packed array of these.
        assert_eq!(std::mem::size_of::<MoveRect>(), 24);
        assert_eq!(std::mem::size_of::<NativeRect>(), 16);
    }
}
