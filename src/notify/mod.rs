//! Asynchronous notification fan-out.
//!
//! Commands build [`NotificationEvent`]s and hand them to the
//! [`NotificationDispatcher`], which buffers them in a bounded queue drained by
//! a fixed pool of workers into a [`NotificationSink`].

pub mod dispatcher;
pub mod event;
pub mod sink;

pub use dispatcher::{
    DeliveryPolicy, DispatchError, DispatchStats, DispatcherState, EnqueueOutcome, FanoutReport,
    NotificationDispatcher,
};
pub use event::{NotificationEvent, NotificationKind};
pub use sink::{NotificationSink, SinkError, SqliteNotificationSink};
