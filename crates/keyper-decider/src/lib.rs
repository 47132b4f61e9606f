//! Orchestration layer for a single keyper: the observed event log
//! (`event_log`), the read-only views built from it (`observed`), phase
//! timing (`schedule`), private evaluation transport (`transport`), the
//! outbound effect vocabulary (`actions`), and the per-step Decider that
//! ties them together (`decider`). Depends on `keyper-dkg` for the pure
//! state machines and `keyper-pairing` for the curve and ECIES primitives;
//! owns all chain-facing and scheduling concerns that those crates
//! deliberately don't know about.

pub mod actions;
pub mod decider;
pub mod event_log;
pub mod observed;
pub mod schedule;
pub mod transport;
