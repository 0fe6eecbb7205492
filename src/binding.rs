//! Consumer side of a monitor texture: which monitor a surface shows, how
//! it is flipped, rotated and clipped, and when it re-binds.

use crate::cursor::{CursorModel, CursorSample};
use crate::engine::MonitorRotation;
use crate::error::{DuplicationError, DuplicationResult};
use crate::session::DuplicationSession;
use crate::texture::TextureView;

pub const KEYWORD_INVERT_X: &str = "INVERT_X";
pub const KEYWORD_INVERT_Y: &str = "INVERT_Y";
pub const KEYWORD_ROTATE90: &str = "ROTATE90";
pub const KEYWORD_ROTATE180: &str = "ROTATE180";
pub const KEYWORD_ROTATE270: &str = "ROTATE270";
pub const KEYWORD_USE_CLIP: &str = "USE_CLIP";

/// Sub-rectangle of the texture to show, in normalized UV units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipRect {
    pub position: [f32; 2],
    pub scale: [f32; 2],
}

impl Default for ClipRect {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0],
            scale: [0.2, 0.2],
        }
    }
}

impl ClipRect {
    /// `(x, y, width, height)` as one shader vector.
    pub fn as_vec4(&self) -> [f32; 4] {
        [
            self.position[0],
            self.position[1],
            self.scale[0],
            self.scale[1],
        ]
    }
}

/// Everything a renderer needs to draw one monitor surface this frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Presentation {
    pub monitor_id: i32,
    pub texture: TextureView,
    pub rotation: MonitorRotation,
    /// Shader keywords to enable; every other known keyword is disabled.
    pub keywords: Vec<&'static str>,
    pub clip: Option<[f32; 4]>,
    /// The binding switched to a different `Monitor` this frame, so any
    /// cached material state must be rebuilt.
    pub rebound: bool,
}

impl Presentation {
    pub fn has_keyword(&self, keyword: &str) -> bool {
        self.keywords.iter().any(|enabled| *enabled == keyword)
    }
}

/// Binds one rendered surface to a monitor of a [`DuplicationSession`].
///
/// Holds the monitor id and the session generation it was resolved in,
/// never a `Monitor` borrow, so a reinitialize can only leave it stale
/// until its next [`update`](Self::update).
#[derive(Clone, Debug)]
pub struct MonitorBinding {
    monitor_id: i32,
    generation: Option<u64>,
    pub invert_x: bool,
    pub invert_y: bool,
    pub clip: Option<ClipRect>,
    pub cursor_model: CursorModel,
}

impl MonitorBinding {
    /// Bind to the primary monitor, or monitor 0 when none is primary.
    pub fn primary(session: &DuplicationSession) -> Self {
        let id = session.primary().map(|monitor| monitor.id()).unwrap_or(0);
        Self::new(id)
    }

    pub fn new(monitor_id: i32) -> Self {
        Self {
            monitor_id,
            generation: None,
            invert_x: false,
            invert_y: false,
            clip: None,
            cursor_model: CursorModel::default(),
        }
    }

    pub fn monitor_id(&self) -> i32 {
        self.monitor_id
    }

    /// Whether the monitor handle was resolved before the session's last
    /// rebuild.
    pub fn is_stale(&self, session: &DuplicationSession) -> bool {
        self.generation != Some(session.generation())
    }

    /// Switch to another monitor and re-bind immediately.
    pub fn set_monitor_id(
        &mut self,
        session: &mut DuplicationSession,
        id: i32,
    ) -> DuplicationResult<Presentation> {
        self.monitor_id = id;
        self.generation = None;
        self.present(session)
    }

    /// Per-frame entry point: re-acquire the monitor if the session was
    /// rebuilt, request a fresh capture for the end-of-frame phase and
    /// report how to draw it.
    pub fn update(&mut self, session: &mut DuplicationSession) -> DuplicationResult<Presentation> {
        let presentation = self.present(session)?;
        session.request_update(self.monitor_id)?;
        Ok(presentation)
    }

    pub fn sample_cursor(
        &self,
        session: &mut DuplicationSession,
    ) -> DuplicationResult<CursorSample> {
        session.sample_cursor(self.monitor_id, &self.cursor_model)
    }

    fn present(&mut self, session: &mut DuplicationSession) -> DuplicationResult<Presentation> {
        let rebound = self.is_stale(session);
        if rebound {
            self.rebind(session)?;
        }

        let rotation = session
            .monitor(self.monitor_id)
            .map(|monitor| monitor.rotation())
            .unwrap_or_default();
        let texture = session.texture_view(self.monitor_id)?;
        Ok(Presentation {
            monitor_id: self.monitor_id,
            texture,
            rotation,
            keywords: self.keywords(rotation),
            clip: self.clip.map(|clip| clip.as_vec4()),
            rebound,
        })
    }

    fn rebind(&mut self, session: &DuplicationSession) -> DuplicationResult<()> {
        let monitor = session
            .acquire_monitor(self.monitor_id)
            .ok_or(DuplicationError::InvalidMonitor(self.monitor_id))?;
        if monitor.id() != self.monitor_id {
            tracing::debug!(
                requested = self.monitor_id,
                monitor_id = monitor.id(),
                "monitor id clamped to current enumeration"
            );
        }
        self.monitor_id = monitor.id();
        self.generation = Some(session.generation());
        Ok(())
    }

    fn keywords(&self, rotation: MonitorRotation) -> Vec<&'static str> {
        let mut keywords = Vec::with_capacity(4);
        if self.invert_x {
            keywords.push(KEYWORD_INVERT_X);
        }
        if self.invert_y {
            keywords.push(KEYWORD_INVERT_Y);
        }
        match rotation {
            MonitorRotation::Rotate90 => keywords.push(KEYWORD_ROTATE90),
            MonitorRotation::Rotate180 => keywords.push(KEYWORD_ROTATE180),
            MonitorRotation::Rotate270 => keywords.push(KEYWORD_ROTATE270),
            MonitorRotation::Identity | MonitorRotation::Unspecified => {}
        }
        if self.clip.is_some() {
            keywords.push(KEYWORD_USE_CLIP);
        }
        keywords
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::engine::DuplicatorState;
    use crate::testing::{FakeEngine, FakeGpu, FakeMonitor};

    fn session_with(monitors: Vec<FakeMonitor>) -> (FakeEngine, FakeGpu, DuplicationSession) {
        let engine = FakeEngine::with_monitors(monitors);
        let gpu = FakeGpu::sharing_log(&engine);
        let session = DuplicationSession::builder()
            .with_engine(engine.clone())
            .with_gpu(gpu.clone())
            .build()
            .unwrap();
        (engine, gpu, session)
    }

    #[test]
    fn primary_binding_picks_primary_monitor() {
        let (_engine, _gpu, session) = session_with(vec![
            FakeMonitor::landscape(1280, 1024),
            FakeMonitor::landscape(1920, 1080).primary(),
        ]);
        assert_eq!(MonitorBinding::primary(&session).monitor_id(), 1);
    }

    #[test]
    fn update_requests_a_render_every_frame() -> DuplicationResult<()> {
        let (_engine, gpu, mut session) = session_with(vec![FakeMonitor::landscape(1920, 1080)]);
        let mut binding = MonitorBinding::new(0);

        let first = binding.update(&mut session)?;
        assert!(first.rebound);
        assert!(first.texture.is_live());
        assert_eq!(session.present_dirty_textures(), 1);

        let second = binding.update(&mut session)?;
        assert!(!second.rebound);
        assert_eq!(session.present_dirty_textures(), 1);
        assert_eq!(gpu.plugin_events(), vec![0, 0]);
        Ok(())
    }

    #[test]
    fn set_monitor_id_rebinds_synchronously() -> DuplicationResult<()> {
        let (_engine, _gpu, mut session) = session_with(vec![
            FakeMonitor::landscape(1920, 1080),
            FakeMonitor::portrait(1080, 1920, MonitorRotation::Rotate90),
        ]);
        let mut binding = MonitorBinding::new(0);
        binding.update(&mut session)?;

        let presentation = binding.set_monitor_id(&mut session, 1)?;
        assert!(presentation.rebound);
        assert_eq!(presentation.monitor_id, 1);
        assert!(presentation.has_keyword(KEYWORD_ROTATE90));
        let texture = presentation.texture.texture().unwrap();
        assert_eq!((texture.width(), texture.height()), (1920, 1080));
        Ok(())
    }

    #[test]
    fn reinitialize_makes_binding_reacquire_clamped_id() -> DuplicationResult<()> {
        let (engine, _gpu, mut session) = session_with(vec![
            FakeMonitor::landscape(1920, 1080),
            FakeMonitor::landscape(1280, 1024),
        ]);
        let mut binding = MonitorBinding::new(1);
        binding.update(&mut session)?;
        assert!(!binding.is_stale(&session));

        engine.change_topology(vec![FakeMonitor::landscape(1920, 1080)]);
        session.reinitialize();
        assert!(binding.is_stale(&session));

        let presentation = binding.update(&mut session)?;
        assert!(presentation.rebound);
        assert_eq!(presentation.monitor_id, 0);
        assert_eq!(binding.monitor_id(), 0);
        Ok(())
    }

    #[test]
    fn keywords_follow_flags_and_clip() -> DuplicationResult<()> {
        let (_engine, _gpu, mut session) = session_with(vec![FakeMonitor {
            rotation: MonitorRotation::Rotate180,
            ..FakeMonitor::landscape(1920, 1080)
        }]);
        let mut binding = MonitorBinding::new(0);
        binding.invert_y = true;
        binding.clip = Some(ClipRect {
            position: [0.25, 0.5],
            scale: [0.5, 0.25],
        });

        let presentation = binding.update(&mut session)?;
        assert_eq!(
            presentation.keywords,
            vec![KEYWORD_INVERT_Y, KEYWORD_ROTATE180, KEYWORD_USE_CLIP]
        );
        assert_eq!(presentation.clip, Some([0.25, 0.5, 0.5, 0.25]));
        assert!(!presentation.has_keyword(KEYWORD_INVERT_X));
        Ok(())
    }

    #[test]
    fn degraded_monitor_presents_placeholder_until_recovery() -> DuplicationResult<()> {
        let (engine, _gpu, mut session) = session_with(vec![FakeMonitor::landscape(1920, 1080)]);
        engine.set_state(0, DuplicatorState::AccessLost);
        engine.recover_on_reinitialize(DuplicatorState::Ready);
        let mut binding = MonitorBinding::new(0);

        session.poll_and_reconcile(Duration::ZERO);
        assert_eq!(binding.update(&mut session)?.texture, TextureView::Placeholder);

        session.poll_and_reconcile(Duration::from_secs(1));
        let presentation = binding.update(&mut session)?;
        assert!(presentation.rebound);
        assert!(presentation.texture.is_live());
        Ok(())
    }

    #[test]
    fn binding_without_monitors_reports_invalid_monitor() {
        let (_engine, _gpu, mut session) = session_with(Vec::new());
        let mut binding = MonitorBinding::new(0);
        assert!(matches!(
            binding.update(&mut session),
            Err(DuplicationError::InvalidMonitor(0))
        ));
    }

    #[test]
    fn cursor_sample_uses_binding_model() -> DuplicationResult<()> {
        let (engine, _gpu, mut session) = session_with(vec![FakeMonitor::landscape(1000, 500)]);
        engine.set_cursor(0, true, (1000, 0));
        session.poll_and_reconcile(Duration::ZERO);
        let mut binding = MonitorBinding::new(0);
        binding.cursor_model.scale = [4.0, 2.0];
        let sample = binding.sample_cursor(&mut session)?;
        assert_eq!(sample.position, Some([2.0, 1.0]));
        Ok(())
    }
}
