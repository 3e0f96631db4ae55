//! Request dispatcher - runs in its own thread and fans jobs out to the render pool

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use flume::Receiver;
use log::{debug, error, info, warn};
use rayon::ThreadPool;

use super::backend::PageSource;
use super::geometry::{self, DefaultScales};
use super::locks::PageLocks;
use super::request::{RasterError, RasterRequest, Reply};
use super::types::{Artifact, DocumentInfo, OutputKind};

/// Everything a render job needs, shared by all jobs of one session
pub(crate) struct RenderContext {
    pub source: Arc<dyn PageSource>,
    pub info: Arc<DocumentInfo>,
    pub locks: Arc<PageLocks<RasterRequest>>,
    pub defaults: DefaultScales,
}

/// Main dispatcher loop.
///
/// Dequeues requests in submission order. A request for a free page starts a
/// pool job that owns the page until its backlog is empty; a request for a
/// busy page joins that backlog. Every request received here is rendered.
/// Returns once every sender is gone and every job has delivered its replies.
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
pub(crate) fn dispatch_loop(ctx: RenderContext, requests: Receiver<RasterRequest>, pool: ThreadPool) {
    let ctx = &ctx;
    let mut received = 0usize;
    let mut jobs = 0usize;

    pool.in_place_scope(|scope| {
        for request in requests.iter() {
            received += 1;
            let page = request.page;
            match ctx.locks.acquire(page, request) {
                Some(first) => {
                    jobs += 1;
                    scope.spawn(move |_| drain_page(ctx, page, first));
                }
                None => debug!(
                    "Page {page} busy, {} request(s) waiting",
                    ctx.locks.waiting(page)
                ),
            }
        }
    });

    info!("Dispatcher finished: {received} requests in {jobs} page jobs");
}

/// Render `first` and then every request queued behind it for `page`
fn drain_page(ctx: &RenderContext, page: usize, first: RasterRequest) {
    let mut next = Some(first);
    while let Some(request) = next {
        handle_request(ctx, request);
        next = ctx.locks.release(page);
    }
}

fn handle_request(ctx: &RenderContext, request: RasterRequest) {
    let started = Instant::now();
    let reply = render_request(ctx, &request);

    match &reply {
        Ok(_) => debug!(
            "Request {} page {} ({}) done in {:?}",
            request.id,
            request.page,
            request.kind.as_str(),
            started.elapsed()
        ),
        Err(e) => warn!("Request {} failed: {e}", request.id),
    }

    request.respond(reply);
}

/// Render a single request. Called while holding the request's page.
fn render_request(ctx: &RenderContext, request: &RasterRequest) -> Reply {
    let page_count = ctx.info.page_count();
    let Some(page_geometry) = ctx.info.page(request.page) else {
        return Err(RasterError::BadPage {
            page: request.page,
            page_count,
        });
    };

    let resolved = geometry::resolve(page_geometry, request.size, ctx.info.landscape, ctx.defaults);
    let index = request.page - 1;
    let source = ctx.source.as_ref();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match request.kind {
        OutputKind::Image => source
            .render_image(index, resolved.scale)
            .map(Artifact::Image),
        OutputKind::Vector => source
            .render_vector(index, resolved.scale)
            .map(Artifact::Vector),
    }));

    outcome.unwrap_or_else(|payload| {
        let reason = panic_message(payload.as_ref());
        error!("Render of page {} panicked: {reason}", request.page);
        Err(RasterError::render_failed(request.page, format!("panic: {reason}")))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
