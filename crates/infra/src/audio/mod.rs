//! Device controller implementations
//!
//! - macOS: CoreAudio HAL, full read/write access to the nominal rate
//! - elsewhere: CPAL, read-only

#[cfg(target_os = "macos")]
pub mod coreaudio;
pub mod cpal_backend;

#[cfg(target_os = "macos")]
pub use coreaudio::CoreAudioController;
pub use cpal_backend::CpalController;

use purerate_core::domain::audio::DeviceController;
use std::sync::Arc;

/// The controller best suited to the current platform
pub fn platform_controller() -> Arc<dyn DeviceController> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(CoreAudioController::new())
    }
    #[cfg(not(target_os = "macos"))]
    {
        Arc::new(CpalController::new())
    }
}
