//! Room command handling for xm2toot
//!
//! Commands addressed to the bot are resolved against a registry of
//! directives; each processed command yields exactly one outbound slot.

pub mod directive;
pub mod processor;
pub mod stats;

pub use directive::{Directive, DirectiveError, DirectiveRegistry};
pub use processor::CommandProcessor;
pub use stats::{format_stats, StatsDirective};
