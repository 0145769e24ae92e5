//! Workspace facade crate.
//!
//! Host applications depend on `waveline` and pick a feature instead of wiring
//! each workspace crate by hand. `desktop-shims` (default) pulls in the
//! desktop bridge implementations; `headless` exposes the same service facade
//! for hosts that inject every bridge themselves.

#[cfg(any(feature = "desktop-shims", feature = "headless"))]
pub use core_service::*;
