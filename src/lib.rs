pub mod config;
pub mod embed_position;
pub mod error;
pub mod recurrence;
pub mod reference;
pub mod scan;
pub mod state;
pub mod utils;
pub mod weights;

pub use config::EmbedPositionConfig;
pub use embed_position::{EmbedPosition, StreamingEmbedPosition};
pub use error::{EmbedPositionError, Result};
pub use weights::EmbedPositionWeights;

#[macro_use]
extern crate shrinkwraprs;
