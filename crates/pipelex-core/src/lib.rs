//! Pipelex bundle model and builder.
//!
//! Parses `.plx` bundles into concept and pipe blueprints, binds them into a pipe library,
//! dry-runs pipes without inference, and assembles or repairs bundle specs produced by the
//! builder pipeline.

pub mod blueprint;
pub mod builder;
pub mod builder_loop;
pub mod bundle;
pub mod concept;
pub mod dry_run;
pub mod errors;
pub mod flow;
pub mod library;
pub mod multiplicity;
pub mod operators;
pub mod pipe_type;
pub mod plx;
pub mod registry;
pub mod signature;
pub mod table;
pub mod validation;
pub mod working_memory;

pub use blueprint::*;
pub use builder::*;
pub use builder_loop::*;
pub use bundle::*;
pub use concept::*;
pub use dry_run::*;
pub use errors::*;
pub use flow::*;
pub use library::*;
pub use multiplicity::*;
pub use operators::*;
pub use pipe_type::*;
pub use plx::*;
pub use registry::*;
pub use signature::*;
pub use table::*;
pub use validation::*;
pub use working_memory::*;
