//! Plumbing shared by the trailpush crates: errors, logging and the small
//! encoding and clock helpers the push core leans on.

#[macro_use]
extern crate slog;
#[macro_use]
extern crate slog_scope;

pub mod errors;
pub mod logging;
pub mod util;
