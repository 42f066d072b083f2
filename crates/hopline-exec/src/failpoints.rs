//! Chaos/failpoint hooks (feature: `failpoints`).
//!
//! The macro expands to nothing unless the feature is enabled. When enabled,
//! a point panics if its name is listed in `HOPLINE_FAILPOINTS`
//! (comma-separated), e.g. `HOPLINE_FAILPOINTS=process_batch.gen`.

/// Whether the named point is armed for this process.
#[cfg(feature = "failpoints")]
pub fn armed(name: &str) -> bool {
    std::env::var("HOPLINE_FAILPOINTS")
        .map(|v| v.split(',').any(|p| p.trim() == name))
        .unwrap_or(false)
}

#[cfg(feature = "failpoints")]
#[macro_export]
macro_rules! fail_point {
    ($name:expr) => {{
        let name: &str = &$name;
        if $crate::failpoints::armed(name) {
            panic!("failpoint triggered: {}", name);
        }
    }};
}

#[cfg(not(feature = "failpoints"))]
#[macro_export]
macro_rules! fail_point {
    ($name:expr) => {};
}
