//! Render request and reply types

use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};

use super::geometry::RenderSize;
use super::types::{Artifact, OutputKind};

/// Unique identifier for render requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors reported by a rasterizer session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RasterError {
    #[error("unable to open document: {reason}")]
    OpenFailed { reason: String },

    #[error("rasterizer has already been run and cannot be recycled")]
    AlreadyStarted,

    #[error("rasterizer has not been started")]
    NotStarted,

    #[error("rasterizer has been stopped")]
    Stopped,

    #[error("rasterizer has been cleaned up after a failed start")]
    CleanedUp,

    #[error("page {page} is out of range (document has {page_count} pages)")]
    BadPage { page: usize, page_count: usize },

    #[error("failed to render page {page}: {reason}")]
    RenderFailed { page: usize, reason: String },
}

impl RasterError {
    pub fn open_failed(reason: impl Into<String>) -> Self {
        Self::OpenFailed {
            reason: reason.into(),
        }
    }

    pub fn render_failed(page: usize, reason: impl Into<String>) -> Self {
        Self::RenderFailed {
            page,
            reason: reason.into(),
        }
    }
}

/// Outcome delivered to a request's reply slot
pub type Reply = Result<Artifact, RasterError>;

/// One render job travelling through the request queue
#[derive(Debug)]
pub struct RasterRequest {
    pub id: RequestId,
    /// Page number (1-based)
    pub page: usize,
    pub size: RenderSize,
    pub kind: OutputKind,
    /// Single-use reply slot
    pub reply: Sender<Reply>,
}

impl RasterRequest {
    /// Create a request together with the receiving end of its reply slot
    #[must_use]
    pub fn new(id: RequestId, page: usize, size: RenderSize, kind: OutputKind) -> (Self, PendingReply) {
        let (reply, rx) = flume::bounded(1);
        let request = Self {
            id,
            page,
            size,
            kind,
            reply,
        };
        (request, PendingReply { id, rx })
    }

    /// Deliver the reply, consuming the request
    pub fn respond(self, reply: Reply) {
        // The caller may have given up waiting; nothing to do then.
        let _ = self.reply.send(reply);
    }
}

/// Caller side of a submitted request
#[derive(Debug)]
pub struct PendingReply {
    id: RequestId,
    rx: Receiver<Reply>,
}

impl PendingReply {
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Block until the reply arrives.
    ///
    /// A request dropped without a reply (the session went away underneath it)
    /// reports `Stopped`.
    pub fn wait(self) -> Reply {
        self.rx.recv().unwrap_or(Err(RasterError::Stopped))
    }

    /// Block for at most `timeout`. On timeout the render may still complete;
    /// its result is then discarded.
    pub fn wait_timeout(self, timeout: Duration) -> Option<Reply> {
        match self.rx.recv_timeout(timeout) {
            Ok(reply) => Some(reply),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(RasterError::Stopped)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> (RasterRequest, PendingReply) {
        RasterRequest::new(RequestId::new(7), 1, RenderSize::auto(), OutputKind::Vector)
    }

    #[test]
    fn reply_reaches_pending_side() {
        let (req, pending) = request();
        assert_eq!(pending.id(), RequestId::new(7));

        req.respond(Ok(Artifact::Vector("<svg/>".into())));
        match pending.wait() {
            Ok(Artifact::Vector(svg)) => assert_eq!(svg, "<svg/>"),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn dropped_request_reports_stopped() {
        let (req, pending) = request();
        drop(req);
        assert_eq!(pending.wait().unwrap_err(), RasterError::Stopped);
    }

    #[test]
    fn wait_timeout_returns_none_while_pending() {
        let (_req, pending) = request();
        assert!(pending.wait_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn respond_after_caller_left_is_harmless() {
        let (req, pending) = request();
        drop(pending);
        req.respond(Err(RasterError::Stopped));
    }

    #[test]
    fn error_messages_name_the_condition() {
        assert!(RasterError::CleanedUp.to_string().contains("has been cleaned up"));
        assert!(RasterError::NotStarted.to_string().contains("has not been started"));
        assert!(RasterError::Stopped.to_string().contains("has been stopped"));
        assert!(
            RasterError::AlreadyStarted
                .to_string()
                .contains("cannot be recycled")
        );
        assert!(
            RasterError::open_failed("bad header")
                .to_string()
                .starts_with("unable to open document")
        );
    }
}
