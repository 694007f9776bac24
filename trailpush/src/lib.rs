#![warn(rust_2018_idioms)]

#[macro_use]
extern crate slog_scope;

pub mod error;
pub mod message;
pub mod metrics;
pub mod notifier;
pub mod routers;
pub mod settings;
pub mod subscriber;
pub mod trail;
pub mod vapid;
