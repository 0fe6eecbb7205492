use std::time::Duration;

use crate::cursor::{CursorModel, CursorSample, CursorSampler, DEFAULT_CURSOR_CACHE_CAPACITY};
use crate::engine::{self, DebugMode, DuplicationEngine, EngineMessage, NativePtr, Rgba8};
use crate::env_config;
use crate::error::{DuplicationError, DuplicationResult};
use crate::monitor::Monitor;
use crate::reinit::{DEFAULT_RETRY_DURATION, ReinitializationController};
use crate::texture::{EnsureOutcome, GpuHost, TextureSlot, TextureView};

const RETRY_ENV: &str = "DESKDUP_RETRY_MS";
const TIMEOUT_ENV: &str = "DESKDUP_TIMEOUT_MS";
const FRAME_RATE_ENV: &str = "DESKDUP_FRAME_RATE";
const DEBUG_ENV: &str = "DESKDUP_DEBUG";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Delay between detecting a degraded monitor or topology change and
    /// rebuilding the native session.
    pub retry_reinitialization: Duration,
    /// Frame acquisition timeout forwarded to the duplication API.
    pub duplication_timeout_ms: i32,
    /// Capture rate cap forwarded to the engine, when set.
    pub frame_rate: Option<u32>,
    pub debug_mode: DebugMode,
    /// Number of cursor shape sizes kept as textures.
    pub cursor_cache_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_reinitialization: DEFAULT_RETRY_DURATION,
            duplication_timeout_ms: 0,
            frame_rate: None,
            debug_mode: DebugMode::None,
            cursor_cache_capacity: DEFAULT_CURSOR_CACHE_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Defaults overlaid with `DESKDUP_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(env_config::process_var)
    }

    /// Defaults overlaid with `DESKDUP_*` values from `lookup`. Values that
    /// do not parse, and a zero retry delay or frame rate, keep the
    /// default.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(ms) = env_config::positive_u64(lookup(RETRY_ENV).as_deref()) {
            config.retry_reinitialization = Duration::from_millis(ms);
        }
        if let Some(timeout) = env_config::signed_i32(lookup(TIMEOUT_ENV).as_deref()) {
            config.duplication_timeout_ms = timeout;
        }
        if let Some(fps) = env_config::positive_u32(lookup(FRAME_RATE_ENV).as_deref()) {
            config.frame_rate = Some(fps);
        }
        if env_config::truthy(lookup(DEBUG_ENV).as_deref()) {
            config.debug_mode = DebugMode::File;
        }
        config
    }
}

/// Why the monitor list was rebuilt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReinitializeCause {
    /// The retry controller fired after a degraded state or topology change.
    Retry,
    /// The engine rebuilt itself and posted a `Reinitialized` message.
    EngineRequested,
    /// [`DuplicationSession::reinitialize`] was called.
    Manual,
}

/// Broadcast after every rebuild. Any [`Monitor`] borrowed before this
/// event is stale and must be re-acquired by id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReinitializeEvent {
    pub generation: u64,
    pub monitor_count: usize,
    pub cause: ReinitializeCause,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Summary of one simulation phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub reinitialized: Option<ReinitializeCause>,
    pub messages: usize,
    pub textures_allocated: usize,
    pub degraded_monitors: usize,
}

struct MonitorSlot {
    monitor: Monitor,
    texture: TextureSlot,
    /// A consumer asked for this monitor's texture at least once.
    wanted: bool,
}

impl MonitorSlot {
    fn new(monitor: Monitor) -> Self {
        Self {
            monitor,
            texture: TextureSlot::default(),
            wanted: false,
        }
    }
}

type Listener = Box<dyn FnMut(&ReinitializeEvent)>;

pub struct DuplicationSessionBuilder {
    engine: Option<Box<dyn DuplicationEngine>>,
    gpu: Option<Box<dyn GpuHost>>,
    config: SessionConfig,
}

impl DuplicationSessionBuilder {
    pub fn new() -> Self {
        Self {
            engine: None,
            gpu: None,
            config: SessionConfig::default(),
        }
    }

    /// Use `engine` instead of loading the native library.
    pub fn with_engine(mut self, engine: impl DuplicationEngine + 'static) -> Self {
        self.engine = Some(Box::new(engine));
        self
    }

    pub fn with_gpu(mut self, gpu: impl GpuHost + 'static) -> Self {
        self.gpu = Some(Box::new(gpu));
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn retry_reinitialization(mut self, delay: Duration) -> Self {
        self.config.retry_reinitialization = delay;
        self
    }

    pub fn duplication_timeout_ms(mut self, timeout_ms: i32) -> Self {
        self.config.duplication_timeout_ms = timeout_ms;
        self
    }

    pub fn frame_rate(mut self, frame_rate: u32) -> Self {
        self.config.frame_rate = Some(frame_rate);
        self
    }

    pub fn debug_mode(mut self, mode: DebugMode) -> Self {
        self.config.debug_mode = mode;
        self
    }

    pub fn cursor_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cursor_cache_capacity = capacity;
        self
    }

    /// Initialize the engine, enumerate monitors and enable presenting.
    pub fn build(self) -> DuplicationResult<DuplicationSession> {
        let gpu = self.gpu.ok_or_else(|| {
            DuplicationError::InvalidConfig("a GpuHost is required to build a session".into())
        })?;
        let engine = match self.engine {
            Some(engine) => engine,
            None => engine::default_engine()?,
        };
        let config = self.config;

        engine.set_debug_mode(config.debug_mode);
        if !engine.is_initialized() {
            engine.initialize();
            if !engine.is_initialized() {
                tracing::error!("desktop duplication engine failed to initialize");
                return Err(DuplicationError::NotInitialized);
            }
        }
        engine.set_timeout(config.duplication_timeout_ms);
        if let Some(fps) = config.frame_rate {
            engine.set_frame_rate(fps);
        }

        let mut session = DuplicationSession {
            engine,
            gpu,
            slots: Vec::new(),
            reinit: ReinitializationController::new(config.retry_reinitialization),
            cursor: CursorSampler::new(config.cursor_cache_capacity),
            config,
            generation: 0,
            listeners: Vec::new(),
            next_listener: 0,
            pending_engine_echoes: 0,
            presenting: false,
            finalized: false,
        };
        session.rebuild_monitors();
        session.enable();
        tracing::info!(
            monitor_count = session.slots.len(),
            "desktop duplication session ready"
        );
        Ok(session)
    }
}

impl Default for DuplicationSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Owner of the engine handle, the monitor list and every monitor texture.
///
/// Drive it from the host frame loop in two phases: call
/// [`poll_and_reconcile`](Self::poll_and_reconcile) during the update phase
/// and [`present_dirty_textures`](Self::present_dirty_textures) once all of
/// the frame's rendering has been recorded.
pub struct DuplicationSession {
    engine: Box<dyn DuplicationEngine>,
    gpu: Box<dyn GpuHost>,
    slots: Vec<MonitorSlot>,
    reinit: ReinitializationController,
    cursor: CursorSampler,
    config: SessionConfig,
    generation: u64,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    /// Every native reinitialize issued by this session queues its own
    /// `Reinitialized` message; the next drain swallows that many.
    pending_engine_echoes: u32,
    presenting: bool,
    finalized: bool,
}

impl DuplicationSession {
    pub fn builder() -> DuplicationSessionBuilder {
        DuplicationSessionBuilder::new()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Simulation phase: pump the engine, refresh every monitor, run the
    /// health check, drain all queued engine messages and allocate the
    /// textures consumers asked for.
    pub fn poll_and_reconcile(&mut self, dt: Duration) -> TickReport {
        let mut report = TickReport::default();
        if self.finalized {
            return report;
        }

        self.engine.update();
        self.refresh_monitors();

        report.degraded_monitors = self
            .slots
            .iter()
            .filter(|slot| !slot.monitor.is_available())
            .count();
        let needs_reinitialize = self
            .slots
            .iter()
            .any(|slot| slot.monitor.state().requires_reinitialize())
            || self.engine.has_monitor_count_changed();
        if self.reinit.tick(needs_reinitialize, dt) {
            self.reinitialize_with(ReinitializeCause::Retry);
            report.reinitialized = Some(ReinitializeCause::Retry);
        }

        loop {
            match self.engine.pop_message() {
                EngineMessage::None => break,
                EngineMessage::Reinitialized if self.pending_engine_echoes > 0 => {
                    report.messages += 1;
                    self.pending_engine_echoes -= 1;
                    tracing::trace!("engine acknowledged reinitialize");
                }
                EngineMessage::Reinitialized => {
                    report.messages += 1;
                    self.rebuild_after_reinitialize(ReinitializeCause::EngineRequested);
                    report.reinitialized = Some(ReinitializeCause::EngineRequested);
                }
                EngineMessage::TextureSizeChanged => {
                    report.messages += 1;
                    tracing::debug!("engine reported a texture size change");
                    self.refresh_monitors();
                }
            }
        }

        // Echoes are queued synchronously by the engine, so one not seen in
        // this drain is not coming.
        self.pending_engine_echoes = 0;

        report.textures_allocated = self.ensure_wanted_textures();
        report
    }

    /// End-of-frame phase: issue the capture blit for every monitor whose
    /// update was requested this frame, then clear every request. Does
    /// nothing while the session is disabled.
    pub fn present_dirty_textures(&mut self) -> usize {
        if !self.presenting || self.finalized {
            return 0;
        }
        let engine = self.engine.as_ref();
        let gpu = self.gpu.as_mut();
        let mut rendered = 0;
        for slot in &mut self.slots {
            if slot.texture.present(&slot.monitor, engine, gpu) {
                rendered += 1;
            }
        }
        rendered
    }

    /// Start presenting and forward native log lines. Returns `false` if
    /// the session was already enabled.
    pub fn enable(&mut self) -> bool {
        if self.presenting || self.finalized {
            return false;
        }
        self.engine.set_log_forwarding(true);
        self.presenting = true;
        true
    }

    /// Stop presenting. Pending update requests are kept until the next
    /// end-of-frame phase after re-enabling.
    pub fn disable(&mut self) -> bool {
        if !self.presenting {
            return false;
        }
        self.engine.set_log_forwarding(false);
        self.presenting = false;
        true
    }

    pub fn is_enabled(&self) -> bool {
        self.presenting
    }

    /// Tear down and rebuild the native session right away.
    pub fn reinitialize(&mut self) {
        if self.finalized {
            return;
        }
        self.reinitialize_with(ReinitializeCause::Manual);
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn monitors(&self) -> impl Iterator<Item = &Monitor> {
        self.slots.iter().map(|slot| &slot.monitor)
    }

    pub fn monitor_count(&self) -> usize {
        self.slots.len()
    }

    pub fn monitor(&self, id: i32) -> Option<&Monitor> {
        self.slot(id).map(|slot| &slot.monitor)
    }

    /// Look up a monitor by id, clamping out-of-range ids into the
    /// current enumeration. `None` only when there are no monitors.
    pub fn acquire_monitor(&self, id: i32) -> Option<&Monitor> {
        self.clamp_id(id).and_then(|id| self.monitor(id))
    }

    pub fn primary(&self) -> Option<&Monitor> {
        self.monitors().find(|monitor| monitor.is_primary())
    }

    pub fn cursor_monitor_id(&self) -> i32 {
        self.engine.cursor_monitor_id()
    }

    /// Size of the virtual desktop spanning every monitor.
    pub fn total_size(&self) -> (i32, i32) {
        (self.engine.total_width(), self.engine.total_height())
    }

    pub(crate) fn clamp_id(&self, id: i32) -> Option<i32> {
        let last = self.slots.len().checked_sub(1)?;
        Some(id.clamp(0, last as i32))
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&ReinitializeEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, _)| *listener != id);
        self.listeners.len() != before
    }

    /// Ask for one capture blit into monitor `id` at the next end-of-frame
    /// phase. Must be repeated every frame fresh content is wanted.
    pub fn request_update(&mut self, id: i32) -> DuplicationResult<()> {
        let slot = self.slot_mut(id)?;
        slot.wanted = true;
        slot.texture.mark_dirty();
        Ok(())
    }

    pub fn update_requested(&self, id: i32) -> bool {
        self.slot(id).is_some_and(|slot| slot.texture.is_dirty())
    }

    /// What a consumer should sample for monitor `id`, allocating the
    /// texture on first use.
    pub fn texture_view(&mut self, id: i32) -> DuplicationResult<TextureView> {
        let gpu = self.gpu.as_mut();
        let slot = self
            .slots
            .get_mut(slot_index(id)?)
            .ok_or(DuplicationError::InvalidMonitor(id))?;
        slot.wanted = true;
        if let Err(err) = slot.texture.ensure(&slot.monitor, gpu) {
            tracing::warn!(monitor_id = id, "capture texture allocation failed: {err}");
        }
        Ok(slot.texture.view(&slot.monitor))
    }

    /// Native pointer of the monitor's texture, or the engine's shared
    /// texture handle when `shared` is set.
    pub fn native_texture(&self, id: i32, shared: bool) -> DuplicationResult<NativePtr> {
        let slot = self.slot(id).ok_or(DuplicationError::InvalidMonitor(id))?;
        if shared {
            Ok(self.engine.shared_texture_handle(id))
        } else {
            Ok(slot.texture.native_ptr())
        }
    }

    pub fn sample_cursor(
        &mut self,
        id: i32,
        model: &CursorModel,
    ) -> DuplicationResult<CursorSample> {
        let engine = self.engine.as_ref();
        let gpu = self.gpu.as_mut();
        let slot = self
            .slots
            .get(slot_index(id)?)
            .ok_or(DuplicationError::InvalidMonitor(id))?;
        Ok(self.cursor.sample(&slot.monitor, model, engine, gpu))
    }

    pub fn set_use_get_pixels(&mut self, id: i32, enabled: bool) -> DuplicationResult<()> {
        let engine = self.engine.as_ref();
        let slot = self
            .slots
            .get_mut(slot_index(id)?)
            .ok_or(DuplicationError::InvalidMonitor(id))?;
        slot.monitor.set_use_get_pixels(engine, enabled);
        Ok(())
    }

    /// Read a `width x height` block at `(x, y)` into `out`, row-major.
    pub fn get_pixels(
        &self,
        id: i32,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        out: &mut [Rgba8],
    ) -> DuplicationResult<()> {
        let monitor = self.monitor(id).ok_or(DuplicationError::InvalidMonitor(id))?;
        if !monitor.uses_get_pixels() {
            return Err(DuplicationError::PixelReadDisabled(id));
        }
        if width <= 0 || height <= 0 {
            return Err(DuplicationError::InvalidConfig(format!(
                "pixel block must be non-empty, got {width}x{height}"
            )));
        }
        let required = width as usize * height as usize;
        if out.len() < required {
            return Err(DuplicationError::BufferTooSmall {
                required,
                actual: out.len(),
            });
        }
        if self.engine.get_pixels(id, out, x, y, width, height) {
            Ok(())
        } else {
            Err(DuplicationError::PixelReadFailed(id))
        }
    }

    pub fn pixels(
        &self,
        id: i32,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> DuplicationResult<Vec<Rgba8>> {
        let len = width.max(0) as usize * height.max(0) as usize;
        let mut out = vec![Rgba8::default(); len];
        self.get_pixels(id, x, y, width, height, &mut out)?;
        Ok(out)
    }

    pub fn get_pixel(&self, id: i32, x: i32, y: i32) -> DuplicationResult<Rgba8> {
        let mut out = [Rgba8::default()];
        self.get_pixels(id, x, y, 1, 1, &mut out)?;
        Ok(out[0])
    }

    /// Raw CPU-side frame buffer of monitor `id`.
    pub fn buffer(&self, id: i32) -> DuplicationResult<NativePtr> {
        self.slot(id).ok_or(DuplicationError::InvalidMonitor(id))?;
        Ok(self.engine.buffer(id))
    }

    pub fn has_been_updated(&self, id: i32) -> DuplicationResult<bool> {
        self.slot(id).ok_or(DuplicationError::InvalidMonitor(id))?;
        Ok(self.engine.has_been_updated(id))
    }

    /// Release every texture and finalize the engine. Also run on drop.
    pub fn shutdown(&mut self) {
        if self.finalized {
            return;
        }
        self.disable();
        self.destroy_textures();
        self.cursor.clear(self.gpu.as_mut());
        self.engine.finalize();
        self.finalized = true;
        tracing::info!("desktop duplication session finalized");
    }

    fn slot(&self, id: i32) -> Option<&MonitorSlot> {
        usize::try_from(id).ok().and_then(|index| self.slots.get(index))
    }

    fn slot_mut(&mut self, id: i32) -> DuplicationResult<&mut MonitorSlot> {
        self.slots
            .get_mut(slot_index(id)?)
            .ok_or(DuplicationError::InvalidMonitor(id))
    }

    fn refresh_monitors(&mut self) {
        let engine = self.engine.as_ref();
        for slot in &mut self.slots {
            slot.monitor.refresh(engine);
        }
    }

    fn ensure_wanted_textures(&mut self) -> usize {
        let gpu = self.gpu.as_mut();
        let mut allocated = 0;
        for slot in self.slots.iter_mut().filter(|slot| slot.wanted) {
            match slot.texture.ensure(&slot.monitor, gpu) {
                Ok(EnsureOutcome::Allocated) => allocated += 1,
                Ok(_) => {}
                Err(err) => tracing::warn!(
                    monitor_id = slot.monitor.id(),
                    "capture texture allocation failed: {err}"
                ),
            }
        }
        allocated
    }

    fn destroy_textures(&mut self) {
        let gpu = self.gpu.as_mut();
        for slot in &mut self.slots {
            slot.texture.destroy(gpu);
        }
    }

    fn reinitialize_with(&mut self, cause: ReinitializeCause) {
        tracing::info!(?cause, "reinitializing desktop duplication");
        self.destroy_textures();
        self.engine.reinitialize();
        self.pending_engine_echoes += 1;
        self.rebuild_after_reinitialize(cause);
    }

    fn rebuild_after_reinitialize(&mut self, cause: ReinitializeCause) {
        self.reinit.reset();
        self.destroy_textures();
        self.rebuild_monitors();
        self.generation += 1;

        let event = ReinitializeEvent {
            generation: self.generation,
            monitor_count: self.slots.len(),
            cause,
        };
        tracing::debug!(
            generation = event.generation,
            monitor_count = event.monitor_count,
            "monitor list rebuilt"
        );
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
    }

    /// Re-enumerate ids `0..count`. Per-id consumer interest and readback
    /// opt-in survive the rebuild; the `Monitor` values do not.
    fn rebuild_monitors(&mut self) {
        let engine = self.engine.as_ref();
        let count = engine.monitor_count().max(0);
        let previous = std::mem::take(&mut self.slots);
        self.slots = (0..count)
            .map(|id| {
                let mut slot = MonitorSlot::new(Monitor::new(engine, id));
                if let Some(old) = previous.get(id as usize) {
                    slot.wanted = old.wanted;
                    if old.monitor.uses_get_pixels() {
                        slot.monitor.set_use_get_pixels(engine, true);
                    }
                }
                slot
            })
            .collect();
    }
}

impl Drop for DuplicationSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn slot_index(id: i32) -> DuplicationResult<usize> {
    usize::try_from(id).map_err(|_| DuplicationError::InvalidMonitor(id))
}
