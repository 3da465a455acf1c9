//! Handler module - server-side request handling.
//!
//! Provides:
//! - [`Handler`] - maps a request form to a response form
//! - [`RequestContext`] - which connection and transaction a request belongs to
//!
//! # Example
//!
//! ```
//! use formlink::handler::{sync_handler, Handler, RequestContext};
//! use formlink::Form;
//!
//! // Async closure with context
//! let tagged = |request: Form, ctx: RequestContext| async move {
//!     let mut response = request;
//!     response.set_i64("peer", ctx.peer_id() as i64);
//!     response
//! };
//!
//! // Plain function
//! let echo = sync_handler(|request: Form| request);
//!
//! fn assert_handler<H: Handler>(_: &H) {}
//! assert_handler(&tagged);
//! assert_handler(&echo);
//! ```

mod context;
mod function;

pub use context::RequestContext;
pub use function::{sync_handler, BoxFuture, Handler};
