//! Questline Engine - async orchestration around the progression core.
//!
//! Wires the pure logic in `questline_common` to two fallible collaborators:
//! the entity store holding users/missions/achievements/tiers/debts, and the
//! verification oracle that plans evidence collection and judges it. Both
//! sit behind traits with fake implementations for deterministic tests.
//!
//! Per-user writes to progression state are serialized through a per-user
//! lock so concurrent reward applications never lose an XP grant.

pub mod engine;
pub mod oracle;
pub mod rewards;
pub mod session;
pub mod store;

pub use engine::ProgressionEngine;
pub use oracle::{FakeOracle, HttpOracle, VerificationOracle};
pub use session::SessionView;
pub use store::{EntityStore, MemoryStore};
