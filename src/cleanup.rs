use std::sync::Mutex;

static CLEANUP_HOOKS: Mutex<Vec<(u64, Box<dyn Fn() + Send>)>> = Mutex::new(Vec::new());

/// Run all cleanup functions.
pub fn cleanup() {
    let mut cleanup = CLEANUP_HOOKS.lock().unwrap();
    for (_, f) in cleanup.drain(..) {
        f();
    }
}

/// Add a cleanup function to be run when the program is interrupted.
/// Returns a token for [`remove_cleanup`].
pub fn add_cleanup<F: Fn() + Send + 'static>(f: F) -> u64 {
    static NEXT: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let id = NEXT.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    let mut cleanup = CLEANUP_HOOKS.lock().unwrap();
    cleanup.push((id, Box::new(f)));
    id
}

/// Remove a previously registered cleanup function, once the work it guarded completed.
pub fn remove_cleanup(id: u64) {
    let mut cleanup = CLEANUP_HOOKS.lock().unwrap();
    cleanup.retain(|(i, _)| *i != id);
}
