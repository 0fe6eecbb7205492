//! Lists the monitors seen by the native plugin, then runs a short paced
//! loop reading back a pixel block from the primary monitor.
//!
//! The GPU host here only hands out placeholder handles and records the
//! render events it would have queued; CPU readback is used for output.
//!
//! ```text
//! RUST_LOG=deskdup=debug cargo run --example monitor_probe
//! ```

use deskdup::{
    DriverConfig, FrameDriver, GpuHost, MonitorBinding, NativePtr, RenderEventFunc, Rgba8,
    TextureFormat, error::DuplicationResult,
};
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct HeadlessGpu {
    next_handle: usize,
    events: usize,
}

impl GpuHost for HeadlessGpu {
    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> DuplicationResult<NativePtr> {
        self.next_handle += 1;
        tracing::debug!(width, height, ?format, handle = self.next_handle, "texture");
        Ok(NativePtr(self.next_handle))
    }

    fn destroy_texture(&mut self, texture: NativePtr) {
        tracing::debug!(handle = texture.0, "release");
    }

    fn issue_plugin_event(&mut self, _func: RenderEventFunc, event_id: i32) {
        self.events += 1;
        tracing::trace!(event_id, total = self.events, "render event");
    }
}

fn average(pixels: &[Rgba8]) -> [u32; 3] {
    let n = pixels.len().max(1) as u32;
    let sum = pixels.iter().fold([0u32; 3], |acc, px| {
        [acc[0] + px.r as u32, acc[1] + px.g as u32, acc[2] + px.b as u32]
    });
    [sum[0] / n, sum[1] / n, sum[2] / n]
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut session = deskdup::open_session(HeadlessGpu::default())?;
    let (total_w, total_h) = session.total_size();
    println!("virtual desktop {total_w}x{total_h}");
    for monitor in session.monitors() {
        println!(
            "  {monitor} {}x{} dpi={}x{} {:?} state={} primary={}",
            monitor.width(),
            monitor.height(),
            monitor.dpi_x(),
            monitor.dpi_y(),
            monitor.rotation(),
            monitor.state().as_str(),
            monitor.is_primary(),
        );
    }

    let mut binding = MonitorBinding::primary(&session);
    session.set_use_get_pixels(binding.monitor_id(), true)?;

    let driver = FrameDriver::new(DriverConfig {
        target_fps: 30,
        max_frames: Some(90),
    });
    let stats = driver.run(&mut session, |session, context| {
        if let Err(err) = binding.update(session) {
            tracing::warn!("binding update failed: {err}");
            return false;
        }
        if context.index % 30 == 0 {
            let id = binding.monitor_id();
            match session.pixels(id, 0, 0, 16, 16) {
                Ok(block) => println!(
                    "frame {:>3}: top-left avg rgb {:?}",
                    context.index,
                    average(&block)
                ),
                Err(err) => println!("frame {:>3}: readback unavailable ({err})", context.index),
            }
        }
        true
    })?;

    println!(
        "{} frames, {} blits, {} reinitializations",
        stats.frames, stats.renders, stats.reinitializations
    );
    session.shutdown();
    Ok(())
}
