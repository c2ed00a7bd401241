//! Rill diagnostics - error codes, rich diagnostics, rendering.
//!
//! Every error the runtime can produce is tagged with a closed
//! [`ErrorCode`]; a [`Diagnostic`] carries the code plus labeled source
//! spans and human-guidance notes. Rendering against source text goes
//! through [`emitter`].

mod diagnostic;
mod error_code;
pub mod emitter;
mod suggest;

pub use diagnostic::{Diagnostic, Label, Severity};
pub use error_code::ErrorCode;
pub use suggest::{edit_distance, suggest_similar};
