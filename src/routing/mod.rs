//! # Route Matching
//!
//! Resolves inbound calls under a tenant's module prefix to the configured
//! route, its connector and the captured path parameters.

pub mod matcher;
pub mod pattern;
pub mod template;

pub use matcher::{split_module, RouteMatch, RouteMatcher, RoutingError};
pub use pattern::{split_path, CompiledPattern, PatternError, Segment};
pub use template::TemplateError;
