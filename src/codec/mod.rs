//! Codec module - the self-describing form format.
//!
//! Every request and response payload is a [`Form`]: a set of named fields,
//! each holding raw bytes and a one-byte [`TypeTag`].
//!
//! - [`Form`] - typed setters/getters over the raw field values
//! - [`record`] - the `[len][name][tag][len][value]` record encoding
//! - [`TypeTag`] - wire tag constants
//!
//! # Example
//!
//! ```
//! use formlink::codec::Form;
//!
//! let mut form = Form::new();
//! form.set_string("p1", "aaaa");
//! form.set_i64_vec("samples", &[1, 2, 3]);
//!
//! let bytes = form.serialize();
//! let decoded = Form::parse(&bytes).unwrap();
//! assert_eq!(decoded.get_string("p1"), "aaaa");
//! assert_eq!(decoded.get_i64_vec("samples"), vec![1, 2, 3]);
//! ```

mod form;
pub mod record;
mod types;

pub use form::{Form, TRANSACTION_ID_FIELD};
pub use types::TypeTag;
