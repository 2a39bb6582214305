//! Tile pipeline: one tile level is served from a local file.

use std::path::PathBuf;

use axum::body::Body;
use axum::http::Response;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::routing::handlers::{ForwardHandler, RequestContext, RequestHandler};
use crate::routing::matcher::RelativePathInfo;

/// Serves `<...>/tile/<level>/...` from `file` and forwards everything else.
#[derive(Debug, Clone)]
pub struct TileHandler {
    base: ForwardHandler,
    local: Option<(String, PathBuf)>,
}

impl TileHandler {
    /// Without a local override the handler behaves like `base`.
    pub fn new(base: ForwardHandler, local: Option<(String, PathBuf)>) -> Self {
        Self { base, local }
    }

    /// Local file for this sub-path, if it is an overridden tile.
    pub fn local_file(&self, info: &RelativePathInfo) -> Option<&PathBuf> {
        let (level, file) = self.local.as_ref()?;
        (info.part(0) == Some("tile") && info.part(1) == Some(level.as_str())).then_some(file)
    }

    async fn handle(&self, ctx: RequestContext) -> Response<Body> {
        let Some(file) = self.local_file(&ctx.path_info) else {
            return self.base.forward(ctx).await;
        };

        tracing::debug!(router = %ctx.router, path = %ctx.path_info.path, file = %file.display(), "Serving local tile");
        match ServeFile::new(file).oneshot(ctx.request).await {
            Ok(response) => response.map(Body::new),
            Err(never) => match never {},
        }
    }
}

impl RequestHandler for TileHandler {
    fn on_request(&self, ctx: RequestContext) -> BoxFuture<'_, Response<Body>> {
        self.handle(ctx).boxed()
    }
}
