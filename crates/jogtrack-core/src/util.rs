//! Utility functions for jogtrack-core.
//!
//! This module contains shared utility functions used across the crate.

use std::sync::{Mutex, MutexGuard};

/// Lock a std mutex, recovering the data if a previous holder panicked.
///
/// Only used for state that is never held across an `.await`.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Normalize a backend base URL: trim trailing slashes and require an
/// `http://` or `https://` scheme.
pub(crate) fn normalize_base_url(base_url: &str) -> Option<String> {
    let base_url = base_url.trim().trim_end_matches('/');
    if base_url.starts_with("http://") || base_url.starts_with("https://") {
        Some(base_url.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_recovers_from_poison() {
        let mutex = std::sync::Arc::new(Mutex::new(1));
        let clone = mutex.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert!(mutex.is_poisoned());
        assert_eq!(*lock(&mutex), 1);
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("http://localhost:5000/api/").as_deref(),
            Some("http://localhost:5000/api")
        );
        assert_eq!(
            normalize_base_url("https://example.com").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(normalize_base_url("localhost:5000"), None);
        assert_eq!(normalize_base_url("ftp://example.com"), None);
    }
}
