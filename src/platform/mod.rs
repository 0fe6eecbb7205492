use crate::engine::DuplicationEngine;
#[cfg(not(target_os = "windows"))]
use crate::error::DuplicationError;
use crate::error::DuplicationResult;

#[cfg(target_os = "windows")]
pub(crate) mod native;

/// Environment override for the native library location.
const LIBRARY_ENV: &str = "DESKDUP_LIBRARY";

#[cfg(target_os = "windows")]
pub(crate) fn build_engine() -> DuplicationResult<Box<dyn DuplicationEngine>> {
    let path = std::env::var_os(LIBRARY_ENV)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| libloading::library_filename(native::LIBRARY_NAME).into());
    Ok(Box::new(native::NativeEngine::load(&path)?))
}

#[cfg(not(target_os = "windows"))]
pub(crate) fn build_engine() -> DuplicationResult<Box<dyn DuplicationEngine>> {
    let _ = LIBRARY_ENV;
    Err(DuplicationError::BackendUnavailable(
        "desktop duplication is only supported on Windows".into(),
    ))
}

#[cfg(all(test, not(target_os = "windows")))]
mod tests {
    use super::*;

    #[test]
    fn non_windows_hosts_report_unavailable_engine() {
        match build_engine() {
            Err(DuplicationError::BackendUnavailable(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("engine should not load off Windows"),
        }
    }
}
