//! Authentication hook.
//!
//! The stage hands each request to the configured [`Authenticator`]. The
//! default, [`AllowAll`](crate::AllowAll), lets everything through unchanged.

use super::{Chain, Stage};
use crate::{Authenticator, BoxResponseFuture};

use {axum::extract::Request, std::sync::Arc};

pub struct Authentication {
    authenticator: Arc<dyn Authenticator>,
}

impl Authentication {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self { authenticator }
    }
}

impl Stage for Authentication {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn handle(&self, req: Request, next: Chain) -> BoxResponseFuture {
        let verdict = self.authenticator.authenticate(req);
        Box::pin(async move {
            match verdict.await {
                Ok(req) => next.run(req).await,
                Err(response) => {
                    tracing::debug!(status = response.status().as_u16(), "Request refused by authenticator");
                    response
                }
            }
        })
    }
}
