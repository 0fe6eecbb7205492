//! Runtime binding to the `uDesktopDuplication` native plugin.
//!
//! The plugin is loaded with `libloading` and every export is resolved up
//! front, so a stale or mismatched DLL fails at load time instead of on the
//! first frame.

use std::ffi::{CStr, c_char, c_void};
use std::path::Path;

use anyhow::Context;
use libloading::Library;

use crate::engine::{
    CursorShape, CursorShapeType, DebugMode, DuplicationEngine, DuplicatorState, EngineMessage,
    MonitorRotation, MoveRect, NativePtr, NativeRect, RenderEventFunc, Rgba8,
};
use crate::error::{DuplicationError, DuplicationResult};

pub(crate) const LIBRARY_NAME: &str = "uDesktopDuplication";

/// Longest monitor name the plugin writes, including the terminator.
const NAME_CAPACITY: usize = 32;

type VoidFn = unsafe extern "system" fn();
type I32Fn = unsafe extern "system" fn() -> i32;
type BoolFn = unsafe extern "system" fn() -> u8;
type PtrFn = unsafe extern "system" fn() -> *mut c_void;
type IdI32Fn = unsafe extern "system" fn(i32) -> i32;
type IdBoolFn = unsafe extern "system" fn(i32) -> u8;
type IdPtrFn = unsafe extern "system" fn(i32) -> *mut c_void;
type SetI32Fn = unsafe extern "system" fn(i32);
type SetU32Fn = unsafe extern "system" fn(u32);
type SetPtrFn = unsafe extern "system" fn(*mut c_void);
type NameFn = unsafe extern "system" fn(i32, *mut c_char, i32);
type SetTexturePtrFn = unsafe extern "system" fn(i32, *mut c_void) -> i32;
type UseGetPixelsFn = unsafe extern "system" fn(i32, i32) -> u8;
type GetPixelsFn = unsafe extern "system" fn(i32, *mut c_void, i32, i32, i32, i32) -> u8;
type LogCallback = unsafe extern "C" fn(*const c_char);
type SetLogFn = unsafe extern "system" fn(Option<LogCallback>);

pub(crate) struct NativeEngine {
    _lib: Library,
    is_initialized: BoolFn,
    initialize: VoidFn,
    finalize: VoidFn,
    reinitialize: VoidFn,
    update: VoidFn,
    pop_message: I32Fn,
    set_debug_mode: SetI32Fn,
    set_log_func: SetLogFn,
    set_error_func: SetLogFn,
    set_timeout: Option<SetI32Fn>,
    set_frame_rate: Option<SetU32Fn>,
    get_monitor_count: I32Fn,
    has_monitor_count_changed: BoolFn,
    get_cursor_monitor_id: I32Fn,
    get_total_width: I32Fn,
    get_total_height: I32Fn,
    get_render_event_func: PtrFn,
    get_state: IdI32Fn,
    get_name: NameFn,
    get_left: IdI32Fn,
    get_right: IdI32Fn,
    get_top: IdI32Fn,
    get_bottom: IdI32Fn,
    get_width: IdI32Fn,
    get_height: IdI32Fn,
    get_dpi_x: IdI32Fn,
    get_dpi_y: IdI32Fn,
    is_hdr: Option<IdBoolFn>,
    get_rotation: IdI32Fn,
    is_primary: IdBoolFn,
    is_cursor_visible: BoolFn,
    get_cursor_x: I32Fn,
    get_cursor_y: I32Fn,
    get_cursor_shape_width: I32Fn,
    get_cursor_shape_height: I32Fn,
    get_cursor_shape_pitch: I32Fn,
    get_cursor_shape_type: I32Fn,
    get_cursor_texture: SetPtrFn,
    get_cursor_hot_spot_x: I32Fn,
    get_cursor_hot_spot_y: I32Fn,
    set_texture_ptr: SetTexturePtrFn,
    get_shared_texture_handle: Option<IdPtrFn>,
    get_move_rect_count: IdI32Fn,
    get_move_rects: IdPtrFn,
    get_dirty_rect_count: IdI32Fn,
    get_dirty_rects: IdPtrFn,
    get_pixels: GetPixelsFn,
    get_buffer: IdPtrFn,
    has_been_updated: IdBoolFn,
    use_get_pixels: UseGetPixelsFn,
}

fn symbol<T: Copy>(lib: &Library, name: &'static str) -> DuplicationResult<T> {
    // SAFETY: the caller names the export's exact signature in `T`.
    unsafe {
        lib.get::<T>(name.as_bytes())
            .map(|sym| *sym)
            .map_err(|_| DuplicationError::MissingSymbol(name))
    }
}

fn optional_symbol<T: Copy>(lib: &Library, name: &'static str) -> Option<T> {
    symbol(lib, name).ok()
}

impl NativeEngine {
    pub(crate) fn load(path: &Path) -> DuplicationResult<Self> {
        // SAFETY: loading the plugin runs its DllMain, which only sets up
        // plugin-global state.
        let lib = unsafe { Library::new(path) }
            .with_context(|| format!("failed to load {}", path.display()))
            .map_err(|e| DuplicationError::LibraryLoad(format!("{e:#}")))?;

        let engine = Self {
            is_initialized: symbol(&lib, "IsInitialized")?,
            initialize: symbol(&lib, "Initialize")?,
            finalize: symbol(&lib, "Finalize")?,
            reinitialize: symbol(&lib, "Reinitialize")?,
            update: symbol(&lib, "Update")?,
            pop_message: symbol(&lib, "PopMessage")?,
            set_debug_mode: symbol(&lib, "SetDebugMode")?,
            set_log_func: symbol(&lib, "SetLogFunc")?,
            set_error_func: symbol(&lib, "SetErrorFunc")?,
            set_timeout: optional_symbol(&lib, "SetTimeout"),
            set_frame_rate: optional_symbol(&lib, "SetFrameRate"),
            get_monitor_count: symbol(&lib, "GetMonitorCount")?,
            has_monitor_count_changed: symbol(&lib, "HasMonitorCountChanged")?,
            get_cursor_monitor_id: symbol(&lib, "GetCursorMonitorId")?,
            get_total_width: symbol(&lib, "GetTotalWidth")?,
            get_total_height: symbol(&lib, "GetTotalHeight")?,
            get_render_event_func: symbol(&lib, "GetRenderEventFunc")?,
            get_state: symbol(&lib, "GetState")?,
            get_name: symbol(&lib, "GetName")?,
            get_left: symbol(&lib, "GetLeft")?,
            get_right: symbol(&lib, "GetRight")?,
            get_top: symbol(&lib, "GetTop")?,
            get_bottom: symbol(&lib, "GetBottom")?,
            get_width: symbol(&lib, "GetWidth")?,
            get_height: symbol(&lib, "GetHeight")?,
            get_dpi_x: symbol(&lib, "GetDpiX")?,
            get_dpi_y: symbol(&lib, "GetDpiY")?,
            is_hdr: optional_symbol(&lib, "IsHDR"),
            get_rotation: symbol(&lib, "GetRotation")?,
            is_primary: symbol(&lib, "IsPrimary")?,
            is_cursor_visible: symbol(&lib, "IsCursorVisible")?,
            get_cursor_x: symbol(&lib, "GetCursorX")?,
            get_cursor_y: symbol(&lib, "GetCursorY")?,
            get_cursor_shape_width: symbol(&lib, "GetCursorShapeWidth")?,
            get_cursor_shape_height: symbol(&lib, "GetCursorShapeHeight")?,
            get_cursor_shape_pitch: symbol(&lib, "GetCursorShapePitch")?,
            get_cursor_shape_type: symbol(&lib, "GetCursorShapeType")?,
            get_cursor_texture: symbol(&lib, "GetCursorTexture")?,
            get_cursor_hot_spot_x: symbol(&lib, "GetCursorHotSpotX")?,
            get_cursor_hot_spot_y: symbol(&lib, "GetCursorHotSpotY")?,
            set_texture_ptr: symbol(&lib, "SetTexturePtr")?,
            get_shared_texture_handle: optional_symbol(&lib, "GetSharedTextureHandle"),
            get_move_rect_count: symbol(&lib, "GetMoveRectCount")?,
            get_move_rects: symbol(&lib, "GetMoveRects")?,
            get_dirty_rect_count: symbol(&lib, "GetDirtyRectCount")?,
            get_dirty_rects: symbol(&lib, "GetDirtyRects")?,
            get_pixels: symbol(&lib, "GetPixels")?,
            get_buffer: symbol(&lib, "GetBuffer")?,
            has_been_updated: symbol(&lib, "HasBeenUpdated")?,
            use_get_pixels: symbol(&lib, "UseGetPixels")?,
            _lib: lib,
        };
        tracing::debug!(path = %path.display(), "loaded desktop duplication plugin");
        Ok(engine)
    }
}

/// Copy `count` plain-old-data records out of a plugin-owned array.
///
/// # Safety
///
/// `ptr` must point to at least `count` initialized `T` values that stay
/// alive until this function returns.
unsafe fn copy_records<T: Copy>(ptr: *const T, count: i32) -> Vec<T> {
    if ptr.is_null() || count <= 0 {
        return Vec::new();
    }
    unsafe { std::slice::from_raw_parts(ptr, count as usize) }.to_vec()
}

unsafe extern "C" fn forward_log(message: *const c_char) {
    if message.is_null() {
        return;
    }
    let text = unsafe { CStr::from_ptr(message) }.to_string_lossy();
    tracing::info!(target: "deskdup::native", "{}", text.trim_end());
}

unsafe extern "C" fn forward_error(message: *const c_char) {
    if message.is_null() {
        return;
    }
    let text = unsafe { CStr::from_ptr(message) }.to_string_lossy();
    tracing::error!(target: "deskdup::native", "{}", text.trim_end());
}

// All calls below are plain synchronous exports of the plugin. Ids that are
// out of range are handled on the native side, which returns zeroed values.
impl DuplicationEngine for NativeEngine {
    fn initialize(&self) {
        unsafe { (self.initialize)() }
    }

    fn finalize(&self) {
        unsafe { (self.finalize)() }
    }

    fn reinitialize(&self) {
        unsafe { (self.reinitialize)() }
    }

    fn is_initialized(&self) -> bool {
        unsafe { (self.is_initialized)() != 0 }
    }

    fn update(&self) {
        unsafe { (self.update)() }
    }

    fn pop_message(&self) -> EngineMessage {
        EngineMessage::from_raw(unsafe { (self.pop_message)() })
    }

    fn set_debug_mode(&self, mode: DebugMode) {
        unsafe { (self.set_debug_mode)(mode.as_raw()) }
    }

    fn set_log_forwarding(&self, enabled: bool) {
        let (log, error): (Option<LogCallback>, Option<LogCallback>) = if enabled {
            (
                Some(forward_log as LogCallback),
                Some(forward_error as LogCallback),
            )
        } else {
            (None, None)
        };
        unsafe {
            (self.set_log_func)(log);
            (self.set_error_func)(error);
        }
    }

    fn set_timeout(&self, timeout_ms: i32) {
        match self.set_timeout {
            Some(set_timeout) => unsafe { set_timeout(timeout_ms) },
            None => tracing::debug!("plugin has no SetTimeout export, ignoring timeout"),
        }
    }

    fn set_frame_rate(&self, frame_rate: u32) {
        match self.set_frame_rate {
            Some(set_frame_rate) => unsafe { set_frame_rate(frame_rate) },
            None => tracing::debug!("plugin has no SetFrameRate export, ignoring frame rate"),
        }
    }

    fn monitor_count(&self) -> i32 {
        unsafe { (self.get_monitor_count)() }
    }

    fn has_monitor_count_changed(&self) -> bool {
        unsafe { (self.has_monitor_count_changed)() != 0 }
    }

    fn cursor_monitor_id(&self) -> i32 {
        unsafe { (self.get_cursor_monitor_id)() }
    }

    fn total_width(&self) -> i32 {
        unsafe { (self.get_total_width)() }
    }

    fn total_height(&self) -> i32 {
        unsafe { (self.get_total_height)() }
    }

    fn state(&self, id: i32) -> DuplicatorState {
        DuplicatorState::from_raw(unsafe { (self.get_state)(id) })
    }

    fn name(&self, id: i32) -> String {
        let mut buf = [0 as c_char; NAME_CAPACITY];
        unsafe { (self.get_name)(id, buf.as_mut_ptr(), NAME_CAPACITY as i32) };
        // The plugin truncates but may not terminate on overflow.
        buf[NAME_CAPACITY - 1] = 0;
        unsafe { CStr::from_ptr(buf.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    fn rect(&self, id: i32) -> NativeRect {
        unsafe {
            NativeRect {
                left: (self.get_left)(id),
                top: (self.get_top)(id),
                right: (self.get_right)(id),
                bottom: (self.get_bottom)(id),
            }
        }
    }

    fn width(&self, id: i32) -> i32 {
        unsafe { (self.get_width)(id) }
    }

    fn height(&self, id: i32) -> i32 {
        unsafe { (self.get_height)(id) }
    }

    fn dpi_x(&self, id: i32) -> i32 {
        unsafe { (self.get_dpi_x)(id) }
    }

    fn dpi_y(&self, id: i32) -> i32 {
        unsafe { (self.get_dpi_y)(id) }
    }

    fn rotation(&self, id: i32) -> MonitorRotation {
        MonitorRotation::from_raw(unsafe { (self.get_rotation)(id) })
    }

    fn is_primary(&self, id: i32) -> bool {
        unsafe { (self.is_primary)(id) != 0 }
    }

    fn is_hdr(&self, id: i32) -> bool {
        self.is_hdr
            .map(|is_hdr| unsafe { is_hdr(id) != 0 })
            .unwrap_or(false)
    }

    fn is_cursor_visible(&self) -> bool {
        unsafe { (self.is_cursor_visible)() != 0 }
    }

    fn cursor_position(&self) -> (i32, i32) {
        unsafe { ((self.get_cursor_x)(), (self.get_cursor_y)()) }
    }

    fn cursor_hotspot(&self) -> (i32, i32) {
        unsafe { ((self.get_cursor_hot_spot_x)(), (self.get_cursor_hot_spot_y)()) }
    }

    fn cursor_shape(&self) -> CursorShape {
        unsafe {
            CursorShape {
                width: (self.get_cursor_shape_width)(),
                height: (self.get_cursor_shape_height)(),
                pitch: (self.get_cursor_shape_pitch)(),
                kind: CursorShapeType::from_raw((self.get_cursor_shape_type)()),
            }
        }
    }

    fn update_cursor_texture(&self, texture: NativePtr) {
        if texture.is_null() {
            return;
        }
        unsafe { (self.get_cursor_texture)(texture.as_ptr()) }
    }

    fn set_texture_ptr(&self, id: i32, texture: NativePtr) {
        unsafe {
            (self.set_texture_ptr)(id, texture.as_ptr());
        }
    }

    fn render_event_func(&self) -> RenderEventFunc {
        RenderEventFunc(NativePtr::from_ptr(unsafe {
            (self.get_render_event_func)()
        }))
    }

    fn shared_texture_handle(&self, id: i32) -> NativePtr {
        self.get_shared_texture_handle
            .map(|get| NativePtr::from_ptr(unsafe { get(id) }))
            .unwrap_or_default()
    }

    fn move_rects(&self, id: i32) -> Vec<MoveRect> {
        unsafe {
            let count = (self.get_move_rect_count)(id);
            copy_records((self.get_move_rects)(id) as *const MoveRect, count)
        }
    }

    fn dirty_rects(&self, id: i32) -> Vec<NativeRect> {
        unsafe {
            let count = (self.get_dirty_rect_count)(id);
            copy_records((self.get_dirty_rects)(id) as *const NativeRect, count)
        }
    }

    fn use_get_pixels(&self, id: i32, enabled: bool) {
        unsafe {
            (self.use_get_pixels)(id, i32::from(enabled));
        }
    }

    fn get_pixels(
        &self,
        id: i32,
        out: &mut [Rgba8],
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> bool {
        unsafe { (self.get_pixels)(id, out.as_mut_ptr().cast(), x, y, width, height) != 0 }
    }

    fn buffer(&self, id: i32) -> NativePtr {
        NativePtr::from_ptr(unsafe { (self.get_buffer)(id) })
    }

    fn has_been_updated(&self, id: i32) -> bool {
        unsafe { (self.has_been_updated)(id) != 0 }
    }
}
