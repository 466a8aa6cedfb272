//! Lazarillo - assistive-vision description relay.
//!
//! Takes a camera frame from the mobile client, relays it to a vision LLM
//! provider, and deterministically recovers a well-typed description record
//! from whatever text the model emits — surviving malformed JSON, rejected
//! response formats, and stale model names along the way.

pub mod config;
pub mod describe;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod prompt;
pub mod providers;
pub mod record;
pub mod recovery;

pub use config::Config;
pub use describe::{DescribeRequest, DescriptionPipeline, WarmUpReport};
pub use error::{LazarilloError, Result};
pub use prompt::{build_prompt, PolicyMode};
pub use record::{DescriptionRecord, Timing};
pub use recovery::{HeuristicRepair, RecoveryEngine, RepairStrategy};
