//! Compiled-in deployment manifest.
//!
//! Bumping `CACHE_VERSION` is the only way to invalidate the offline cache:
//! the next activation deletes every cache under any other tag.

/// Tag of the cache owned by this build.
pub const CACHE_VERSION: &str = "shellcache-v1";

/// Application shell, relative to the worker scope. Fetched in full at install.
pub const CORE_ASSETS: &[&str] = &[
  "./",
  "./index.html",
  "./manifest.webmanifest",
  "./styles.css",
  "./app.js",
  "./icons/icon-192.png",
  "./icons/icon-512.png",
];
