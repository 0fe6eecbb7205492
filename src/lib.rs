pub mod binding;
pub mod cursor;
pub mod driver;
pub mod engine;
pub(crate) mod env_config;
pub mod error;
pub mod monitor;
mod platform;
pub mod rect;
pub mod reinit;
pub mod session;
pub mod texture;

#[cfg(test)]
mod testing;

use error::DuplicationResult;

pub use binding::{ClipRect, MonitorBinding, Presentation};
pub use cursor::{CursorModel, CursorSample, CursorSampler};
pub use driver::{
    DriverConfig, DriverStats, DriverStatsSnapshot, FrameContext, FrameDriver, StopHandle,
};
pub use engine::{
    CursorShape, CursorShapeType, DebugMode, DuplicationEngine, DuplicatorState, EngineMessage,
    MonitorRotation, MoveRect, NativePoint, NativePtr, NativeRect, RenderEventFunc, Rgba8,
};
pub use error::{DuplicationError, DuplicationErrorClass};
pub use monitor::{CursorState, Monitor};
pub use rect::{DirtyRect, MovedRegion};
pub use reinit::ReinitializationController;
pub use session::{
    DuplicationSession, DuplicationSessionBuilder, ListenerId, ReinitializeCause,
    ReinitializeEvent, SessionConfig, TickReport,
};
pub use texture::{CaptureTexture, GpuHost, TextureFormat, TextureSlot, TextureView};

/// Load the native engine and start a session configured from the
/// environment.
pub fn open_session(gpu: impl GpuHost + 'static) -> DuplicationResult<DuplicationSession> {
    DuplicationSession::builder()
        .config(SessionConfig::from_env())
        .with_gpu(gpu)
        .build()
}
