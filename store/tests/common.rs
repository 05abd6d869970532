use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Route crate logs to the test output. Set RUST_LOG=reactive_store=trace to see dispatch.
#[allow(unused)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).with_test_writer().try_init();
}

/// Returns a recorder closure and a function that drains what it recorded so far
#[allow(unused)]
pub fn change_watcher<T: Send + Sync + 'static>() -> (Box<dyn Fn(T) + Send + Sync>, Box<dyn Fn() -> Vec<T> + Send + Sync>) {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let watcher = {
        let changes = changes.clone();
        Box::new(move |value: T| {
            changes.lock().unwrap().push(value);
        })
    };

    let check = Box::new(move || {
        let changes: Vec<T> = changes.lock().unwrap().drain(..).collect();
        changes
    });

    (watcher, check)
}

#[derive(Clone, Default)]
#[allow(unused)]
pub struct Counter(Arc<AtomicUsize>);

#[allow(unused)]
impl Counter {
    pub fn new() -> Self { Self::default() }
    pub fn hit(&self) { self.0.fetch_add(1, Ordering::SeqCst); }
    pub fn get(&self) -> usize { self.0.load(Ordering::SeqCst) }
}
