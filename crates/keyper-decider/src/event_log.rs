//! The observed, append-only event log the Decider reads each step (§6).
//! Each category advances monotonically; cursors into it only ever move
//! forward (I4), so replaying an already-observed prefix is always a
//! suffix of length zero.

use keyper_dkg::dkg::RosterCurve;
use keyper_dkg::messages::{
    AccusationMsg, ApologyMsg, CheckInMsg, Eon, EpochSecretKeyShareMsg, PolyCommitmentMsg,
    PolyEvalBundleMsg,
};
use keyper_dkg::roster::Address;
use keyper_pairing::group::PairingCurve;

pub type Height = u64;

/// An observed fact, carrying the minimum metadata every category needs:
/// the block height it was observed at and the address that produced it.
#[derive(Clone, Debug)]
pub struct Observed<T> {
    pub height: Height,
    pub sender: Address,
    pub payload: T,
}

/// One eon's start: the batch index its key-shares begin covering and the
/// block height its DKG schedule is anchored to.
#[derive(Clone, Debug)]
pub struct EonStart {
    pub eon: Eon,
    pub start_batch_index: u64,
    pub start_height: Height,
}

/// A batch configuration voted on-chain, naming the keyper set and
/// threshold a DKG started from that config must use.
#[derive(Clone, Debug)]
pub struct BatchConfigEvent {
    pub start_batch_index: u64,
    pub keypers: Vec<Address>,
    pub threshold: usize,
    pub config_contract_addr: Address,
    pub config_index: u64,
    pub started: bool,
    pub validators_updated: bool,
}

/// One category of the observed log: an append-only sequence plus a helper
/// for reading its unread suffix.
#[derive(Clone, Debug)]
pub struct Category<T> {
    entries: Vec<Observed<T>>,
}

impl<T> Default for Category<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T> Category<T> {
    pub fn push(&mut self, height: Height, sender: Address, payload: T) {
        self.entries.push(Observed { height, sender, payload });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The unread suffix starting at `cursor`. Callers advance their stored
    /// cursor to `len()` after fully draining this suffix (I4: cursors only
    /// ever advance).
    pub fn suffix_from(&self, cursor: usize) -> &[Observed<T>] {
        &self.entries[cursor.min(self.entries.len())..]
    }
}

/// The full observed event log: one category per event kind named in §6,
/// each independently monotone.
#[derive(Clone, Debug)]
pub struct ObservedLog<PC: PairingCurve> {
    pub eon_starts: Category<EonStart>,
    pub batch_configs: Category<BatchConfigEvent>,
    pub checked_in: Category<CheckInMsg<RosterCurve<PC>>>,
    pub commitments: Category<PolyCommitmentMsg<RosterCurve<PC>>>,
    pub poly_evals: Category<PolyEvalBundleMsg>,
    pub accusations: Category<AccusationMsg>,
    pub apologies: Category<ApologyMsg<RosterCurve<PC>>>,
    pub epoch_secret_key_shares: Category<EpochSecretKeyShareMsg<PC>>,
}

impl<PC: PairingCurve> Default for ObservedLog<PC> {
    fn default() -> Self {
        Self {
            eon_starts: Category::default(),
            batch_configs: Category::default(),
            checked_in: Category::default(),
            commitments: Category::default(),
            poly_evals: Category::default(),
            accusations: Category::default(),
            apologies: Category::default(),
            epoch_secret_key_shares: Category::default(),
        }
    }
}

/// The monotone read positions into each category of one DKG/EKG's
/// observed log (I4: `{CommitmentsIndex, PolyEvalsIndex, AccusationsIndex,
/// ApologiesIndex}` only ever advance).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Cursors {
    pub commitments: usize,
    pub poly_evals: usize,
    pub accusations: usize,
    pub apologies: usize,
    pub epoch_secret_key_shares: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_from_advances_monotonically() {
        let mut cat = Category::<u32>::default();
        let addr = Address([0u8; 20]);
        cat.push(1, addr, 10);
        cat.push(2, addr, 20);
        cat.push(3, addr, 30);

        assert_eq!(cat.suffix_from(0).len(), 3);
        assert_eq!(cat.suffix_from(2).len(), 1);
        assert_eq!(cat.suffix_from(3).len(), 0);
        assert_eq!(cat.suffix_from(100).len(), 0);
    }
}
