//! Epoch key generator (§4.4): a per-eon object that ingests
//! `EpochSecretKeyShare`s from qualified peers, verifying each via a
//! pairing check against the sender's public share from the DKG, and
//! Lagrange-combines them into the epoch secret key once threshold is met.

use crate::dkg::DkgOutput;
use crate::errors::EpochKeygenError;
use crate::messages::{Eon, EpochSecretKeyShareMsg};
use keyper_pairing::group::{Element, PairingCurve, Point, Scalar};
use keyper_pairing::poly::{Eval, Idx, Poly};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;

/// `EpochID`: for epoch index e (0-based), ID = (e+1)·g1.
pub fn epoch_id<PC: PairingCurve>(epoch: u64) -> PC::G1 {
    let mut scalar = PC::Scalar::new();
    scalar.set_int(epoch + 1);
    let mut id = PC::G1::one();
    id.mul(&scalar);
    id
}

#[derive(Default, Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "PC::G1: DeserializeOwned")]
struct EpochState<PC: PairingCurve> {
    shares: BTreeMap<Idx, PC::G1>,
    secret_key: Option<PC::G1>,
}

/// Per-eon object; one instance is created per DKG finalization and fed
/// `EpochSecretKeyShare`s across every epoch belonging to that eon.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "PC::G1: DeserializeOwned, PC::G2: DeserializeOwned")]
pub struct EpochKeyGenerator<PC: PairingCurve> {
    eon: Eon,
    threshold: usize,
    /// Public shares in the DKG's output, indexed by keyper index.
    public_shares: Vec<PC::G2>,
    epochs: BTreeMap<u64, EpochState<PC>>,
}

impl<PC: PairingCurve> EpochKeyGenerator<PC> {
    pub fn new(output: &DkgOutput<PC>, threshold: usize) -> Self {
        let mut public_shares = vec![PC::G2::zero(); output.public_shares.len()];
        for Eval { index, value } in &output.public_shares {
            public_shares[*index as usize] = value.clone();
        }
        Self { eon: output.eon, threshold, public_shares, epochs: BTreeMap::new() }
    }

    pub fn eon(&self) -> Eon {
        self.eon
    }

    /// Computes this participant's own contribution for `epoch`, given its
    /// eon secret key share.
    pub fn compute_own_share(&self, epoch: u64, my_eon_share: &PC::Scalar) -> PC::G1 {
        let mut share = epoch_id::<PC>(epoch);
        share.mul(my_eon_share);
        share
    }

    /// Verifies `share` via `pairing_check([share, -epoch_id], [g2,
    /// sender_pub_share])` and, once the unique-sender set for this epoch
    /// reaches threshold, Lagrange-combines the assembled epoch secret key.
    /// Duplicate shares from an already-recorded sender are ignored.
    pub fn handle_epoch_secret_key_share(
        &mut self,
        sender: Idx,
        msg: EpochSecretKeyShareMsg<PC>,
    ) -> Result<(), EpochKeygenError> {
        let sender_pub_share = self
            .public_shares
            .get(sender as usize)
            .ok_or(EpochKeygenError::UnknownSender)?
            .clone();

        let state = self.epochs.entry(msg.epoch).or_default();
        if state.shares.contains_key(&sender) || state.secret_key.is_some() {
            return Ok(());
        }

        let neg_epoch_id = epoch_id::<PC>(msg.epoch).negated();
        let ok = PC::pairing_check(&[msg.share.clone(), neg_epoch_id], &[PC::G2::one(), sender_pub_share]);
        if !ok {
            return Err(EpochKeygenError::BadShare(sender));
        }

        state.shares.insert(sender, msg.share);
        if state.shares.len() == self.threshold {
            let shares: Vec<Eval<PC::G1>> = state
                .shares
                .iter()
                .map(|(&index, value)| Eval { index, value: value.clone() })
                .collect();
            let combined = Poly::<PC::G1>::recover(self.threshold, shares)
                .map_err(EpochKeygenError::InvalidRecovery)?;
            state.secret_key = Some(combined);
        }
        Ok(())
    }

    pub fn epoch_secret_key(&self, epoch: u64) -> Option<&PC::G1> {
        self.epochs.get(&epoch).and_then(|s| s.secret_key.as_ref())
    }
}
