//! Protocol error types.

use rampart_core::error::StreamError;
use thiserror::Error;

/// Sticky reliable-channel failures.
///
/// Once one of these is raised the channel refuses further sends, stops
/// producing packets and ignores received ones until [`reset`] — continuing
/// after losing a message would silently break ordered delivery.
///
/// [`reset`]: crate::channel::Channel::reset
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("message send queue is full")]
    SendQueueFull,

    #[error("message serialize measure failed: {0}")]
    SerializeMeasureFailed(StreamError),
}
