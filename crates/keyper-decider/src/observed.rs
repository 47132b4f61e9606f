//! Read-only views over the observed event log (§6) that the Decider needs
//! but that don't belong on the raw append-only log itself: "what does the
//! latest batch config say", "who has checked in and with which transport
//! key", "what eons have started since we last looked". Everything here is
//! a pure query; nothing advances a cursor — cursor bookkeeping is the
//! Decider's `State`, not the log's.

use std::collections::BTreeMap;

use keyper_dkg::dkg::RosterCurve;
use keyper_dkg::messages::Eon;
use keyper_dkg::roster::Address;
use keyper_pairing::group::PairingCurve;

use crate::event_log::{BatchConfigEvent, EonStart, Height, ObservedLog};

/// The full state an external observer reconstructs from the consensus
/// chain and hands to the Decider each step (§4.8's "reads ... current
/// observed Shutter state").
#[derive(Clone, Debug)]
pub struct ObservedState<PC: PairingCurve> {
    pub log: ObservedLog<PC>,
}

impl<PC: PairingCurve> Default for ObservedState<PC> {
    fn default() -> Self {
        Self { log: ObservedLog::default() }
    }
}

impl<PC: PairingCurve> ObservedState<PC> {
    /// The most recently observed batch config, if any.
    pub fn latest_batch_config(&self) -> Option<&BatchConfigEvent> {
        self.log.batch_configs.suffix_from(0).last().map(|o| &o.payload)
    }

    /// The most recent batch config whose `started` flag is set — the
    /// "most-recent finalized one" step 3 votes past.
    pub fn most_recent_started_config_index(&self) -> Option<u64> {
        self.log
            .batch_configs
            .suffix_from(0)
            .iter()
            .rev()
            .find(|o| o.payload.started)
            .map(|o| o.payload.config_index)
    }

    /// The batch config that governs the given start-batch-index, if one
    /// has been observed.
    pub fn batch_config_for_start(&self, start_batch_index: u64) -> Option<&BatchConfigEvent> {
        self.log
            .batch_configs
            .suffix_from(0)
            .iter()
            .map(|o| &o.payload)
            .find(|c| c.start_batch_index == start_batch_index)
    }

    /// Whether `address` is part of the latest observed batch config's
    /// keyper set (§4.8 step 1's "not a keyper" check).
    pub fn is_keyper(&self, address: Address) -> bool {
        self.latest_batch_config()
            .map(|c| c.keypers.contains(&address))
            .unwrap_or(false)
    }

    /// Every address's registered transport (encryption) public key, built
    /// from the full `checked_in` category. A real implementation would
    /// cache this incrementally; the core takes the simpler "recompute from
    /// the log" view since Decide() is only ever called on state changes,
    /// not in a hot loop.
    pub fn checked_in_pubkeys(&self) -> BTreeMap<Address, <RosterCurve<PC> as keyper_pairing::group::Curve>::Point> {
        let mut map = BTreeMap::new();
        for obs in self.log.checked_in.suffix_from(0) {
            map.entry(obs.payload.address).or_insert_with(|| obs.payload.encryption_pubkey.clone());
        }
        map
    }

    /// Eon starts observed with `eon > after` (or all of them if `after` is
    /// `None`), in log order.
    pub fn eon_starts_after(&self, after: Option<Eon>) -> impl Iterator<Item = &EonStart> {
        self.log
            .eon_starts
            .suffix_from(0)
            .iter()
            .map(|o| &o.payload)
            .filter(move |e| after.map_or(true, |a| e.eon > a))
    }
}

/// Main-chain state the Decider consults for batch execution and appeals
/// (§4.8 steps 8-9). Reconstructed by the same external observer that
/// builds `ObservedState`; this core never talks to the chain directly.
#[derive(Clone, Debug, Default)]
pub struct MainChainState {
    pub current_height: Height,
    pub current_batch_index: u64,
    /// Count of execution half-steps the chain has recorded so far (§4.9's
    /// `h`); even = cipher batch, odd = plain batch.
    pub num_execution_half_steps: u64,
    /// The block height at which `num_execution_half_steps` last changed —
    /// the baseline §4.9's staggering delay is measured from.
    pub half_step_start_height: Height,
    /// The cipher-batch hash for the current half-step, if the chain has
    /// one ready. `None` means there is nothing yet to execute.
    pub cipher_batch_hash: Option<[u8; 32]>,
    /// Accusation identifiers currently pending against our own address,
    /// without a confirmed appeal yet.
    pub accusations_against_me: std::collections::BTreeSet<u64>,
    /// Accusation identifiers that already have a confirmed appeal on
    /// chain.
    pub appeals_confirmed: std::collections::BTreeSet<u64>,
}
