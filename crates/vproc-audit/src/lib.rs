pub mod event;
pub mod sink;

pub use event::AuditEvent;
pub use sink::{AuditSink, InMemoryAuditSink, TracingAuditSink};
