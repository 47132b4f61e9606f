//! Message types exchanged during a DKG run and by the epoch key generator
//! (§6, §4.3, §4.4). These are semantic payloads: the Decider is responsible
//! for draining them off the observed event log and handing them to
//! `Dkg::handle_*`/`EpochKeyGenerator::handle_*`; wire encoding and event-log
//! framing live outside this crate.

use crate::roster::Address;
use keyper_pairing::group::{Curve, PairingCurve};
use keyper_pairing::poly::Idx;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Identifies the logical epoch-range a DKG run produces key shares for.
pub type Eon = u64;

/// A dealer's public commitment to its polynomial: `gammas[i] = a_i·g2`
/// (§4.2's Γ).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "C::Point: DeserializeOwned")]
pub struct PolyCommitmentMsg<C: Curve> {
    pub eon: Eon,
    pub gammas: Vec<C::Point>,
}

/// One dealer's full batch of private per-receiver evaluations, each
/// ECIES-encrypted to the receiver's registered transport key — the
/// on-wire/event-log shape of §6's `PolyEval{eon, receivers[],
/// encrypted_evals[]}`. `receivers[i]`'s evaluation is `encrypted_evals[i]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolyEvalBundleMsg {
    pub eon: Eon,
    pub receivers: Vec<Idx>,
    pub encrypted_evals: Vec<Vec<u8>>,
}

impl PolyEvalBundleMsg {
    pub fn encrypted_eval_for(&self, receiver: Idx) -> Option<&[u8]> {
        self.receivers
            .iter()
            .position(|&r| r == receiver)
            .map(|i| self.encrypted_evals[i].as_slice())
    }
}

/// A single decrypted evaluation addressed to `to`: what `Dkg::handle_poly_eval`
/// actually verifies against the sender's previously-recorded commitment,
/// after the bundle above has been unpacked and ECIES-decrypted.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "C::Scalar: DeserializeOwned")]
pub struct PolyEvalMsg<C: Curve> {
    pub eon: Eon,
    pub to: Idx,
    pub value: C::Scalar,
}

/// Accusation against one or more dealers, raised in Phase 2 (Dealing →
/// Accusing).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccusationMsg {
    pub eon: Eon,
    pub accused: Vec<Idx>,
}

/// Apology published in Phase 3 in response to accusation(s) against the
/// sender: for each accuser, the evaluation the sender originally computed
/// for them, revealed in the clear so that anyone can recheck it against
/// the sender's commitment.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "C::Scalar: DeserializeOwned")]
pub struct ApologyMsg<C: Curve> {
    pub eon: Eon,
    pub accusers: Vec<Idx>,
    pub poly_evals: Vec<C::Scalar>,
}

impl<C: Curve> ApologyMsg<C> {
    /// The evaluation the apology reveals for `accuser`, if present.
    pub fn eval_for(&self, accuser: Idx) -> Option<&C::Scalar> {
        self.accusers
            .iter()
            .position(|&a| a == accuser)
            .map(|i| &self.poly_evals[i])
    }
}

/// Registration of an address's DKG group key and ECIES transport key, the
/// event the roster (`roster.rs`) is built from. A restriction of §6's
/// `CheckIn{validator_pubkey, encryption_pubkey}` to the field this crate
/// consumes; `validator_pubkey` belongs to the chain-facing layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "C::Point: DeserializeOwned")]
pub struct CheckInMsg<C: Curve> {
    pub address: Address,
    pub encryption_pubkey: C::Point,
}

/// One keyper's contribution toward an epoch secret key (§4.4, §6's
/// `EpochSecretKeyShare{eon, epoch, share}`). The share lives in G1, like
/// the epoch id it is derived from (`EpochSecretKeyShare = s_k·EpochID`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "PC::G1: DeserializeOwned")]
pub struct EpochSecretKeyShareMsg<PC: PairingCurve> {
    pub eon: Eon,
    pub epoch: u64,
    pub share: PC::G1,
}
