// ============================
// location-core/src/telemetry.rs
// ============================
//! Observability seam plus the central place for metric keys.
use metrics::counter;
use tracing::{debug, error};
use uuid::Uuid;

pub const FIX_WRITTEN: &str = "location.fix.written";
pub const FIX_REJECTED: &str = "location.fix.rejected";
pub const TASK_STOPPED: &str = "location.task.stopped";
pub const SHARING_STARTED: &str = "sharing.started";
pub const SHARING_STOPPED: &str = "sharing.stopped";
pub const SHARING_FAILED: &str = "sharing.failed";
pub const RECORD_CLEANUP: &str = "sharing.record.cleanup";
pub const FEED_EVENT_APPLIED: &str = "feed.event.applied";
pub const FEED_EVENT_REJECTED: &str = "feed.event.rejected";
pub const FEED_RESYNC: &str = "feed.resync";
pub const EXCEPTION_CAPTURED: &str = "telemetry.exception";

/// Error reporting collaborator.
///
/// Fire-and-forget: implementations must never block or fail the caller.
pub trait Reporter: Send + Sync {
    fn capture_exception(&self, error: &(dyn std::error::Error + 'static));
    fn add_breadcrumb(&self, message: &str);
}

/// Reporter that writes to the tracing pipeline and counts captures
#[derive(Debug, Default, Clone)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn capture_exception(&self, error: &(dyn std::error::Error + 'static)) {
        let event_id = Uuid::new_v4();
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        error!(%event_id, error = %error, causes = ?causes, "captured exception");
        counter!(EXCEPTION_CAPTURED).increment(1);
    }

    fn add_breadcrumb(&self, message: &str) {
        debug!(breadcrumb = message);
    }
}
