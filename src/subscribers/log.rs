//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints events to stdout in a human-readable format.
//! This is primarily useful for development, debugging, and examples.
//!
//! ## Output format
//! ```text
//! [state] probe=probe://accelerometer enabled -> running
//! [failed] probe=probe://accelerometer reason="on_start: sensor offline"
//! [wake-programmed] probe=probe://accelerometer delay_ms=30000 exact=false
//! [wake-fired] probe=probe://accelerometer
//! [request-accepted] probe=probe://accelerometer key=pipeline/accel-50hz
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Simple stdout logging subscriber.
///
/// Enabled via the `logging` feature. Prints human-readable event
/// descriptions to stdout for debugging and demonstration purposes.
///
/// Not intended for production use - implement a custom [`Subscribe`] for
/// structured logging or metrics collection.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let probe = e.probe.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::StateChanged => {
                if let (Some(prev), Some(state)) = (e.prev, e.state) {
                    println!("[state] probe={probe} {prev} -> {state}");
                }
            }
            EventKind::ProbeFailed => {
                println!("[failed] probe={probe} reason={:?}", e.reason);
            }
            EventKind::GraceExceeded => {
                println!(
                    "[grace-exceeded] probe={probe} hook={:?} grace_ms={:?}",
                    e.reason, e.delay_ms
                );
            }
            EventKind::WakeProgrammed => {
                println!(
                    "[wake-programmed] probe={probe} delay_ms={:?} exact={:?}",
                    e.delay_ms, e.exact
                );
            }
            EventKind::WakeCancelled => {
                println!("[wake-cancelled] probe={probe}");
            }
            EventKind::WakeFired => {
                println!("[wake-fired] probe={probe}");
            }
            EventKind::RequestAccepted => {
                println!("[request-accepted] probe={probe} key={:?}", e.reason);
            }
            EventKind::RequestWithdrawn => {
                println!("[request-withdrawn] probe={probe} key={:?}", e.reason);
            }
            EventKind::ListenerPanicked => {
                println!("[listener-panicked] probe={probe} reason={:?}", e.reason);
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
