//! Model routing for Pipelex operators.
//!
//! Maps a logical model choice to a model handle (through the model deck) and then to a
//! concrete inference backend (through the active routing profile).

pub mod config;
pub mod deck;
pub mod errors;
pub mod profile;
pub mod resolver;

pub use config::*;
pub use deck::*;
pub use errors::*;
pub use profile::*;
pub use resolver::*;
