//! In-memory engine and GPU host used by the unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::engine::{
    CursorShape, DebugMode, DuplicationEngine, DuplicatorState, EngineMessage, MonitorRotation,
    MoveRect, NativePtr, NativeRect, RenderEventFunc, Rgba8,
};
use crate::error::{DuplicationError, DuplicationResult};
use crate::texture::{GpuHost, TextureFormat};

pub(crate) const RENDER_EVENT_FUNC: RenderEventFunc = RenderEventFunc(NativePtr(0xfeed));

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Initialize,
    Finalize,
    Reinitialize,
    SetTexturePtr { id: i32, ptr: NativePtr },
    UpdateCursorTexture(NativePtr),
    CreateTexture { width: u32, height: u32, ptr: NativePtr },
    DestroyTexture(NativePtr),
    PluginEvent { func: RenderEventFunc, event_id: i32 },
}

#[derive(Clone, Debug)]
pub(crate) struct FakeMonitor {
    pub name: String,
    pub rect: NativeRect,
    pub dpi: (i32, i32),
    pub rotation: MonitorRotation,
    pub primary: bool,
    pub state: DuplicatorState,
    pub dirty_rects: Vec<NativeRect>,
    pub move_rects: Vec<MoveRect>,
}

impl FakeMonitor {
    pub fn landscape(width: i32, height: i32) -> Self {
        Self {
            name: format!("\\\\.\\DISPLAY{width}x{height}"),
            rect: NativeRect {
                left: 0,
                top: 0,
                right: width,
                bottom: height,
            },
            dpi: (96, 96),
            rotation: MonitorRotation::Identity,
            primary: false,
            state: DuplicatorState::Ready,
            dirty_rects: Vec::new(),
            move_rects: Vec::new(),
        }
    }

    pub fn portrait(width: i32, height: i32, rotation: MonitorRotation) -> Self {
        Self {
            rotation,
            ..Self::landscape(width, height)
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }
}

#[derive(Debug, Default)]
struct EngineState {
    initialized: bool,
    /// `Initialize` leaves the engine uninitialized, like a plugin with no
    /// usable adapter.
    refuse_initialize: bool,
    monitors: Vec<FakeMonitor>,
    /// Topology that becomes current on the next native reinitialize.
    pending_monitors: Option<Vec<FakeMonitor>>,
    /// States applied to the rebuilt monitors on reinitialize.
    recover_to: Option<DuplicatorState>,
    messages: VecDeque<EngineMessage>,
    cursor_monitor: i32,
    cursor_visible: bool,
    cursor_position: (i32, i32),
    cursor_shape: CursorShape,
    get_pixels_enabled: FxHashSet<i32>,
    fail_get_pixels: bool,
    update_count: usize,
    timeout_ms: Option<i32>,
    frame_rate: Option<u32>,
    debug_mode: DebugMode,
    log_forwarding: bool,
}

/// Scriptable [`DuplicationEngine`]. Clones share state, so a test can keep
/// one handle after moving another into a session.
#[derive(Clone, Debug)]
pub(crate) struct FakeEngine {
    state: Rc<RefCell<EngineState>>,
    log: Rc<RefCell<Vec<Call>>>,
}

impl FakeEngine {
    pub fn with_monitors(monitors: Vec<FakeMonitor>) -> Self {
        Self {
            state: Rc::new(RefCell::new(EngineState {
                monitors,
                cursor_monitor: -1,
                ..EngineState::default()
            })),
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn set_state(&self, id: i32, state: DuplicatorState) {
        self.state.borrow_mut().monitors[id as usize].state = state;
    }

    pub fn set_rect(&self, id: i32, rect: NativeRect) {
        self.state.borrow_mut().monitors[id as usize].rect = rect;
    }

    pub fn set_dirty_rects(&self, id: i32, rects: Vec<NativeRect>) {
        self.state.borrow_mut().monitors[id as usize].dirty_rects = rects;
    }

    pub fn set_cursor(&self, monitor_id: i32, visible: bool, position: (i32, i32)) {
        let mut state = self.state.borrow_mut();
        state.cursor_monitor = monitor_id;
        state.cursor_visible = visible;
        state.cursor_position = position;
    }

    pub fn set_cursor_shape(&self, shape: CursorShape) {
        self.state.borrow_mut().cursor_shape = shape;
    }

    /// Stage a new monitor list. `monitor_count` keeps reporting the old
    /// list until the next reinitialize, like the native plugin does.
    pub fn change_topology(&self, monitors: Vec<FakeMonitor>) {
        self.state.borrow_mut().pending_monitors = Some(monitors);
    }

    /// Make the next reinitialize bring every monitor back to `state`.
    pub fn recover_on_reinitialize(&self, state: DuplicatorState) {
        self.state.borrow_mut().recover_to = Some(state);
    }

    pub fn refuse_initialize(&self) {
        self.state.borrow_mut().refuse_initialize = true;
    }

    pub fn push_message(&self, message: EngineMessage) {
        self.state.borrow_mut().messages.push_back(message);
    }

    pub fn fail_get_pixels(&self, fail: bool) {
        self.state.borrow_mut().fail_get_pixels = fail;
    }

    pub fn get_pixels_enabled(&self, id: i32) -> bool {
        self.state.borrow().get_pixels_enabled.contains(&id)
    }

    pub fn reinitialize_count(&self) -> usize {
        self.count(|call| *call == Call::Reinitialize)
    }

    pub fn update_count(&self) -> usize {
        self.state.borrow().update_count
    }

    pub fn pending_messages(&self) -> usize {
        self.state.borrow().messages.len()
    }

    pub fn timeout_ms(&self) -> Option<i32> {
        self.state.borrow().timeout_ms
    }

    pub fn frame_rate(&self) -> Option<u32> {
        self.state.borrow().frame_rate
    }

    pub fn debug_mode(&self) -> DebugMode {
        self.state.borrow().debug_mode
    }

    pub fn log_forwarding(&self) -> bool {
        self.state.borrow().log_forwarding
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.log.borrow().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: Call) {
        self.log.borrow_mut().push(call);
    }

    fn with_monitor<T: Default>(&self, id: i32, read: impl FnOnce(&FakeMonitor) -> T) -> T {
        let state = self.state.borrow();
        usize::try_from(id)
            .ok()
            .and_then(|index| state.monitors.get(index))
            .map(read)
            .unwrap_or_default()
    }
}

impl DuplicationEngine for FakeEngine {
    fn initialize(&self) {
        {
            let mut state = self.state.borrow_mut();
            state.initialized = !state.refuse_initialize;
        }
        self.record(Call::Initialize);
    }

    fn finalize(&self) {
        self.state.borrow_mut().initialized = false;
        self.record(Call::Finalize);
    }

    fn reinitialize(&self) {
        {
            let mut state = self.state.borrow_mut();
            if let Some(monitors) = state.pending_monitors.take() {
                state.monitors = monitors;
            }
            if let Some(recovered) = state.recover_to.take() {
                for monitor in &mut state.monitors {
                    monitor.state = recovered;
                }
            }
            state.messages.push_back(EngineMessage::Reinitialized);
        }
        self.record(Call::Reinitialize);
    }

    fn is_initialized(&self) -> bool {
        self.state.borrow().initialized
    }

    fn update(&self) {
        self.state.borrow_mut().update_count += 1;
    }

    fn pop_message(&self) -> EngineMessage {
        self.state
            .borrow_mut()
            .messages
            .pop_front()
            .unwrap_or(EngineMessage::None)
    }

    fn set_debug_mode(&self, mode: DebugMode) {
        self.state.borrow_mut().debug_mode = mode;
    }

    fn set_log_forwarding(&self, enabled: bool) {
        self.state.borrow_mut().log_forwarding = enabled;
    }

    fn set_timeout(&self, timeout_ms: i32) {
        self.state.borrow_mut().timeout_ms = Some(timeout_ms);
    }

    fn set_frame_rate(&self, frame_rate: u32) {
        self.state.borrow_mut().frame_rate = Some(frame_rate);
    }

    fn monitor_count(&self) -> i32 {
        self.state.borrow().monitors.len() as i32
    }

    fn has_monitor_count_changed(&self) -> bool {
        let state = self.state.borrow();
        state
            .pending_monitors
            .as_ref()
            .is_some_and(|pending| pending.len() != state.monitors.len())
    }

    fn cursor_monitor_id(&self) -> i32 {
        self.state.borrow().cursor_monitor
    }

    fn total_width(&self) -> i32 {
        let state = self.state.borrow();
        let left = state.monitors.iter().map(|m| m.rect.left).min().unwrap_or(0);
        let right = state.monitors.iter().map(|m| m.rect.right).max().unwrap_or(0);
        right - left
    }

    fn total_height(&self) -> i32 {
        let state = self.state.borrow();
        let top = state.monitors.iter().map(|m| m.rect.top).min().unwrap_or(0);
        let bottom = state.monitors.iter().map(|m| m.rect.bottom).max().unwrap_or(0);
        bottom - top
    }

    fn state(&self, id: i32) -> DuplicatorState {
        let state = self.state.borrow();
        usize::try_from(id)
            .ok()
            .and_then(|index| state.monitors.get(index))
            .map(|monitor| monitor.state)
            .unwrap_or(DuplicatorState::NotSet)
    }

    fn name(&self, id: i32) -> String {
        self.with_monitor(id, |m| m.name.clone())
    }

    fn rect(&self, id: i32) -> NativeRect {
        self.with_monitor(id, |m| m.rect)
    }

    fn dpi_x(&self, id: i32) -> i32 {
        self.with_monitor(id, |m| m.dpi.0)
    }

    fn dpi_y(&self, id: i32) -> i32 {
        self.with_monitor(id, |m| m.dpi.1)
    }

    fn rotation(&self, id: i32) -> MonitorRotation {
        self.with_monitor(id, |m| m.rotation)
    }

    fn is_primary(&self, id: i32) -> bool {
        self.with_monitor(id, |m| m.primary)
    }

    fn is_cursor_visible(&self) -> bool {
        self.state.borrow().cursor_visible
    }

    fn cursor_position(&self) -> (i32, i32) {
        self.state.borrow().cursor_position
    }

    fn cursor_hotspot(&self) -> (i32, i32) {
        (0, 0)
    }

    fn cursor_shape(&self) -> CursorShape {
        self.state.borrow().cursor_shape
    }

    fn update_cursor_texture(&self, texture: NativePtr) {
        self.record(Call::UpdateCursorTexture(texture));
    }

    fn set_texture_ptr(&self, id: i32, texture: NativePtr) {
        self.record(Call::SetTexturePtr { id, ptr: texture });
    }

    fn render_event_func(&self) -> RenderEventFunc {
        RENDER_EVENT_FUNC
    }

    fn move_rects(&self, id: i32) -> Vec<MoveRect> {
        self.with_monitor(id, |m| m.move_rects.clone())
    }

    fn dirty_rects(&self, id: i32) -> Vec<NativeRect> {
        self.with_monitor(id, |m| m.dirty_rects.clone())
    }

    fn use_get_pixels(&self, id: i32, enabled: bool) {
        let mut state = self.state.borrow_mut();
        if enabled {
            state.get_pixels_enabled.insert(id);
        } else {
            state.get_pixels_enabled.remove(&id);
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
        if self.state.borrow().fail_get_pixels {
            return false;
        }
        // Encode the source coordinate so tests can check the window.
        for row in 0..height {
            for col in 0..width {
                out[(row * width + col) as usize] = Rgba8 {
                    r: (x + col) as u8,
                    g: (y + row) as u8,
                    b: id as u8,
                    a: 255,
                };
            }
        }
        true
    }

    fn buffer(&self, id: i32) -> NativePtr {
        NativePtr(0x10_0000 + id as usize)
    }

    fn has_been_updated(&self, id: i32) -> bool {
        self.with_monitor(id, |m| !m.dirty_rects.is_empty())
    }
}

#[derive(Debug, Default)]
struct GpuState {
    next_ptr: usize,
    live: FxHashSet<NativePtr>,
    allocations: usize,
    destroyed: Vec<NativePtr>,
    fail_allocations: bool,
}

/// [`GpuHost`] handing out never-reused fake pointers.
#[derive(Clone, Debug)]
pub(crate) struct FakeGpu {
    state: Rc<RefCell<GpuState>>,
    log: Rc<RefCell<Vec<Call>>>,
}

impl FakeGpu {
    /// A GPU host that records into the same call log as `engine`.
    pub fn sharing_log(engine: &FakeEngine) -> Self {
        Self {
            state: Rc::new(RefCell::new(GpuState {
                next_ptr: 0x1000,
                ..GpuState::default()
            })),
            log: engine.log.clone(),
        }
    }

    pub fn allocations(&self) -> usize {
        self.state.borrow().allocations
    }

    pub fn destroyed(&self) -> Vec<NativePtr> {
        self.state.borrow().destroyed.clone()
    }

    pub fn live_textures(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn fail_allocations(&self, fail: bool) {
        self.state.borrow_mut().fail_allocations = fail;
    }

    pub fn plugin_events(&self) -> Vec<i32> {
        self.log
            .borrow()
            .iter()
            .filter_map(|call| match call {
                Call::PluginEvent { event_id, .. } => Some(*event_id),
                _ => None,
            })
            .collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }
}

impl GpuHost for FakeGpu {
    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        _format: TextureFormat,
    ) -> DuplicationResult<NativePtr> {
        let ptr = {
            let mut state = self.state.borrow_mut();
            if state.fail_allocations {
                return Err(DuplicationError::TextureAllocation("out of video memory".into()));
            }
            let ptr = NativePtr(state.next_ptr);
            state.next_ptr += 0x100;
            state.allocations += 1;
            state.live.insert(ptr);
            ptr
        };
        self.log
            .borrow_mut()
            .push(Call::CreateTexture { width, height, ptr });
        Ok(ptr)
    }

    fn destroy_texture(&mut self, texture: NativePtr) {
        {
            let mut state = self.state.borrow_mut();
            state.live.remove(&texture);
            state.destroyed.push(texture);
        }
        self.log.borrow_mut().push(Call::DestroyTexture(texture));
    }

    fn issue_plugin_event(&mut self, func: RenderEventFunc, event_id: i32) {
        self.log
            .borrow_mut()
            .push(Call::PluginEvent { func, event_id });
    }
}
