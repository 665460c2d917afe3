//! Questline Common - shared data model and pure progression logic
//!
//! Everything in this crate is deterministic and side-effect free: the
//! leveling curve, streak arithmetic, achievement evaluation, tier gating,
//! the verification step model, and reward accounting. Orchestration against
//! the entity store and the verification oracle lives in `questline_engine`.

pub mod achievement;
pub mod config;
pub mod error;
pub mod finance;
pub mod leveling;
pub mod mission;
pub mod reward;
pub mod streak;
pub mod tier;
pub mod verification;

pub use achievement::*;
pub use config::*;
pub use error::*;
pub use finance::*;
pub use leveling::*;
pub use mission::*;
pub use reward::*;
pub use streak::*;
pub use tier::*;
pub use verification::*;
