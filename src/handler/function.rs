//! The server-side request handler trait.
//!
//! Any `Fn(Form, RequestContext) -> impl Future<Output = Form>` closure is a
//! handler. Synchronous `Fn(Form) -> Form` functions can be wrapped with
//! [`sync_handler`].

use std::future::Future;
use std::pin::Pin;

use super::RequestContext;
use crate::codec::Form;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Maps a request form to a response form.
///
/// Handlers are shared by every connection of a server and may run
/// concurrently, one invocation per connection at a time.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Form, ctx: RequestContext) -> BoxFuture<'static, Form>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Form, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Form> + Send + 'static,
{
    fn call(&self, request: Form, ctx: RequestContext) -> BoxFuture<'static, Form> {
        Box::pin((self)(request, ctx))
    }
}

/// Adapt a plain `Form -> Form` function into a [`Handler`].
pub fn sync_handler<F>(f: F) -> impl Handler
where
    F: Fn(Form) -> Form + Send + Sync + 'static,
{
    move |request: Form, _ctx: RequestContext| {
        let response = f(request);
        async move { response }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ctx() -> RequestContext {
        RequestContext::new(0, None, "1".to_string())
    }

    #[tokio::test]
    async fn test_async_closure_handler() {
        let handler = |request: Form, ctx: RequestContext| async move {
            let mut response = Form::new();
            response.set_string("echo", &request.get_string("p1"));
            response.set_i64("peer", ctx.peer_id() as i64);
            response
        };

        let mut request = Form::new();
        request.set_string("p1", "aaaa");
        let response = handler.call(request, ctx()).await;
        assert_eq!(response.get_string("echo"), "aaaa");
        assert_eq!(response.get_i64("peer"), 0);
    }

    #[tokio::test]
    async fn test_sync_handler() {
        let handler = sync_handler(|mut form: Form| {
            form.set_bool("seen", true);
            form
        });
        let response = handler.call(Form::new(), ctx()).await;
        assert!(response.get_bool("seen"));
    }

    #[tokio::test]
    async fn test_handler_as_trait_object() {
        let handler: Arc<dyn Handler> = Arc::new(sync_handler(|form| form));
        let mut request = Form::new();
        request.set_i64("n", 5);
        let response = handler.call(request, ctx()).await;
        assert_eq!(response.get_i64("n"), 5);
    }
}
