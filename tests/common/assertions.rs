//! Custom test assertions for integration tests

use std::path::Path;
use tokio::sync::broadcast;
use wwdc_dl::Event;

/// Drain every event already sent on `rx`
pub fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}

/// Assert no `.part` file exists anywhere below `dir`
pub fn assert_no_partial_files(dir: &Path) {
    if !dir.exists() {
        return;
    }
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries = std::fs::read_dir(&current)
            .unwrap_or_else(|e| panic!("cannot read {}: {}", current.display(), e));
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == "part") {
                panic!("partial file left behind: {}", path.display());
            }
        }
    }
}

/// Position of the first event matching `pred`
pub fn position_of(events: &[Event], pred: impl Fn(&Event) -> bool) -> Option<usize> {
    events.iter().position(pred)
}
