//! Per-participant distributed key generation state machine (§4.3).
//!
//! Phases form a strict total order — Off < Dealing < Accusing < Apologizing
//! < Finalized — and only ever advance. Each phase is its own type, so an
//! `start_phaseN_*` call that transitions the machine both consumes the
//! previous phase by value and returns the next one: a caller holding a
//! `DkgDealing` cannot accidentally invoke a Dealing-only handler once it
//! has moved on. Within a phase, `handle_*` methods take `&mut self` and are
//! idempotent per (sender, type) pair, since the orchestrator driving this
//! machine drains the observed log incrementally, one message at a time,
//! across many steps, rather than delivering a single bundle the way a
//! batch-oriented DKG implementation would.

use crate::errors::{DkgError, DkgResult};
use crate::messages::{AccusationMsg, ApologyMsg, Eon, PolyCommitmentMsg, PolyEvalMsg};
use crate::roster::Roster;
use keyper_pairing::group::{CurveFrom, Element, PairingCurve};
use keyper_pairing::poly::{Eval, Idx, Poly};
use rand_core::RngCore;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The curve commitments and roster keys live on: G2, bundled with the
/// scalar field shared by both source groups of the pairing.
pub type RosterCurve<PC> = CurveFrom<<PC as PairingCurve>::Scalar, <PC as PairingCurve>::G2>;

/// Parameters fixed for the lifetime of one DKG run, shared by every phase.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "PC::Scalar: DeserializeOwned, PC::G2: DeserializeOwned")]
pub struct DkgParams<PC: PairingCurve> {
    pub eon: Eon,
    pub roster: Roster<RosterCurve<PC>>,
    pub my_index: Idx,
}

impl<PC: PairingCurve> DkgParams<PC> {
    pub fn n(&self) -> usize {
        self.roster.len()
    }

    pub fn threshold(&self) -> usize {
        self.roster.threshold
    }
}

/// What every dealer published, and what this participant received from
/// each, accumulated through Dealing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "PC::Scalar: DeserializeOwned, PC::G2: DeserializeOwned")]
struct DealerBooks<PC: PairingCurve> {
    /// Commitments received so far, keyed by dealer index.
    commitments: BTreeMap<Idx, Poly<PC::G2>>,
    /// Evaluations sent to me, keyed by dealer index, once verified against
    /// that dealer's commitment. Includes my own evaluation of myself,
    /// inserted directly at dealing time (I2: a participant never consumes
    /// its own PolyEval off the log).
    verified_evals: BTreeMap<Idx, PC::Scalar>,
    /// Evaluations received before the corresponding commitment arrived;
    /// verified and drained into `verified_evals`/`failed_evals` once the
    /// commitment shows up.
    pending_evals: BTreeMap<Idx, PC::Scalar>,
    /// Dealers whose evaluation to me failed verification against their
    /// commitment.
    failed_evals: BTreeSet<Idx>,
    /// Dealers from whom an evaluation was expected but has not arrived.
    /// Seeded with every other participant at dealing time and cleared as
    /// evaluations (verified or not) come in.
    missing_evals: BTreeSet<Idx>,
}

impl<PC: PairingCurve> DealerBooks<PC> {
    fn verify_eval(commitment: &Poly<PC::G2>, at: Idx, value: &PC::Scalar) -> bool {
        let mut expected = PC::G2::one();
        expected.mul(value);
        commitment.eval(at).value == expected
    }

    fn record_eval(&mut self, my_index: Idx, dealer: Idx, value: PC::Scalar) {
        if self.verified_evals.contains_key(&dealer) || self.failed_evals.contains(&dealer) {
            return;
        }
        self.missing_evals.remove(&dealer);
        match self.commitments.get(&dealer) {
            Some(commitment) if Self::verify_eval(commitment, my_index, &value) => {
                self.verified_evals.insert(dealer, value);
            }
            Some(_) => {
                self.failed_evals.insert(dealer);
            }
            None => {
                self.pending_evals.insert(dealer, value);
            }
        }
    }

    fn record_commitment(&mut self, my_index: Idx, dealer: Idx, commitment: Poly<PC::G2>) {
        if self.commitments.contains_key(&dealer) {
            return;
        }
        if let Some(value) = self.pending_evals.remove(&dealer) {
            if Self::verify_eval(&commitment, my_index, &value) {
                self.verified_evals.insert(dealer, value);
            } else {
                self.failed_evals.insert(dealer);
            }
        }
        self.commitments.insert(dealer, commitment);
    }

    fn locally_faulty(&self, dealer: Idx) -> bool {
        !self.commitments.contains_key(&dealer)
            || self.failed_evals.contains(&dealer)
            || self.missing_evals.contains(&dealer)
    }
}

/// Accusations and apologies observed so far, keyed by (accused dealer,
/// accuser). Any participant can verify an apology's entries against the
/// accused dealer's public commitment, regardless of whether it was the one
/// accusing — this is shared, not per-accuser-private, bookkeeping.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct AccusationBooks {
    accusations: BTreeSet<(Idx, Idx)>,
    resolved: BTreeSet<(Idx, Idx)>,
}

impl AccusationBooks {
    fn disqualified(&self) -> BTreeSet<Idx> {
        self.accusations
            .iter()
            .filter(|pair| !self.resolved.contains(pair))
            .map(|&(dealer, _)| dealer)
            .collect()
    }
}

/// Off: before `start_phase1_dealing` has been called.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "PC::Scalar: DeserializeOwned, PC::G2: DeserializeOwned")]
pub struct DkgOff<PC: PairingCurve> {
    params: DkgParams<PC>,
}

impl<PC: PairingCurve> DkgOff<PC> {
    pub fn new(params: DkgParams<PC>) -> Self {
        Self { params }
    }

    /// Off → Dealing. Samples a degree-`threshold-1` polynomial, commits it,
    /// records our own evaluation of ourselves directly (I2), and returns
    /// the commitment plus the private evaluations to deliver to every
    /// other participant.
    pub fn start_phase1_dealing<R: RngCore>(
        self,
        rng: &mut R,
    ) -> (
        DkgDealing<PC>,
        PolyCommitmentMsg<RosterCurve<PC>>,
        Vec<PolyEvalMsg<RosterCurve<PC>>>,
    ) {
        let degree = self.params.threshold() - 1;
        let secret = Poly::<PC::Scalar>::new_from(degree, rng);
        let commitment = secret.commit::<PC::G2>();

        let my_index = self.params.my_index;
        let mut books = DealerBooks::<PC> {
            commitments: BTreeMap::new(),
            verified_evals: BTreeMap::new(),
            pending_evals: BTreeMap::new(),
            failed_evals: BTreeSet::new(),
            missing_evals: BTreeSet::new(),
        };

        let mut evals = Vec::with_capacity(self.params.n().saturating_sub(1));
        for (j, _) in self.params.roster.iter() {
            if j == my_index {
                continue;
            }
            books.missing_evals.insert(j);
            evals.push(PolyEvalMsg {
                eon: self.params.eon,
                to: j,
                value: secret.eval(j).value,
            });
        }

        books.verified_evals.insert(my_index, secret.eval(my_index).value);
        books.commitments.insert(my_index, commitment.clone());

        let msg = PolyCommitmentMsg {
            eon: self.params.eon,
            gammas: commitment.clone().into(),
        };

        let dealing = DkgDealing {
            params: self.params,
            my_poly: secret,
            books,
        };

        (dealing, msg, evals)
    }
}

/// Dealing: commitments and private evaluations are being exchanged.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "PC::Scalar: DeserializeOwned, PC::G2: DeserializeOwned")]
pub struct DkgDealing<PC: PairingCurve> {
    params: DkgParams<PC>,
    my_poly: Poly<PC::Scalar>,
    books: DealerBooks<PC>,
}

impl<PC: PairingCurve> DkgDealing<PC> {
    /// Accepted only in Dealing; commitment length must equal the threshold.
    pub fn handle_commitment(
        &mut self,
        sender: Idx,
        msg: PolyCommitmentMsg<RosterCurve<PC>>,
    ) -> DkgResult<()> {
        if !self.params.roster.contains_index(sender) {
            return Err(DkgError::UnknownSender);
        }
        let threshold = self.params.threshold();
        if msg.gammas.len() != threshold {
            return Err(keyper_pairing::errors::DegreeMismatchError(msg.gammas.len(), threshold).into());
        }
        self.books.record_commitment(self.params.my_index, sender, Poly::from(msg.gammas));
        Ok(())
    }

    /// Accepted only in Dealing; addressed to me; must verify against the
    /// sender's previously-recorded commitment, queueing until the
    /// commitment arrives otherwise.
    pub fn handle_poly_eval(&mut self, sender: Idx, msg: PolyEvalMsg<RosterCurve<PC>>) -> DkgResult<()> {
        if !self.params.roster.contains_index(sender) {
            return Err(DkgError::UnknownSender);
        }
        // I2: nobody, honest or not, has a meaningful evaluation of
        // themselves to send us this way.
        if msg.to != self.params.my_index || sender == self.params.my_index {
            return Ok(());
        }
        self.books.record_eval(self.params.my_index, sender, msg.value);
        if self.books.failed_evals.contains(&sender) {
            return Err(DkgError::BadEvaluation(sender));
        }
        Ok(())
    }

    /// Dealing → Accusing. Emits one accusation for every dealer that (i)
    /// never published a commitment, (ii) sent an evaluation that failed
    /// verification, or (iii) sent no evaluation at all — our own
    /// accusation is recorded directly into the shared accusation books,
    /// the same way I2 records our own evaluation directly.
    pub fn start_phase2_accusing(self) -> (DkgAccusing<PC>, Option<AccusationMsg>) {
        let my_index = self.params.my_index;
        let mut accused = Vec::new();
        let mut accusation_books = AccusationBooks::default();

        for (j, _) in self.params.roster.iter() {
            if j == my_index || !self.books.locally_faulty(j) {
                continue;
            }
            accused.push(j);
            accusation_books.accusations.insert((j, my_index));
        }

        let msg = if accused.is_empty() {
            None
        } else {
            Some(AccusationMsg { eon: self.params.eon, accused })
        };

        let accusing = DkgAccusing {
            params: self.params,
            my_poly: self.my_poly,
            books: self.books,
            accusation_books,
        };

        (accusing, msg)
    }
}

/// Accusing: accusations are being exchanged.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "PC::Scalar: DeserializeOwned, PC::G2: DeserializeOwned")]
pub struct DkgAccusing<PC: PairingCurve> {
    params: DkgParams<PC>,
    my_poly: Poly<PC::Scalar>,
    books: DealerBooks<PC>,
    accusation_books: AccusationBooks,
}

impl<PC: PairingCurve> DkgAccusing<PC> {
    /// Accepted only in Accusing.
    pub fn handle_accusation(&mut self, sender: Idx, msg: AccusationMsg) -> DkgResult<()> {
        if !self.params.roster.contains_index(sender) {
            return Err(DkgError::UnknownSender);
        }
        for dealer in msg.accused {
            self.accusation_books.accusations.insert((dealer, sender));
        }
        Ok(())
    }

    /// Accusing → Apologizing. For each participant that accused us,
    /// reveal the evaluation we originally computed for them, so anyone can
    /// recheck it against our public commitment.
    pub fn start_phase3_apologizing(self) -> (DkgApologizing<PC>, Option<ApologyMsg<RosterCurve<PC>>>) {
        let my_index = self.params.my_index;
        let accusers: Vec<Idx> = self
            .accusation_books
            .accusations
            .iter()
            .filter(|&&(dealer, _)| dealer == my_index)
            .map(|&(_, accuser)| accuser)
            .collect();

        let msg = if accusers.is_empty() {
            None
        } else {
            let poly_evals = accusers.iter().map(|&a| self.my_poly.eval(a).value).collect();
            Some(ApologyMsg { eon: self.params.eon, accusers, poly_evals })
        };

        let apologizing = DkgApologizing {
            params: self.params,
            books: self.books,
            accusation_books: self.accusation_books,
        };

        (apologizing, msg)
    }
}

/// Apologizing: accused dealers publish apologies; any participant can
/// verify each revealed evaluation against the accused dealer's own
/// commitment.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "PC::Scalar: DeserializeOwned, PC::G2: DeserializeOwned")]
pub struct DkgApologizing<PC: PairingCurve> {
    params: DkgParams<PC>,
    books: DealerBooks<PC>,
    accusation_books: AccusationBooks,
}

impl<PC: PairingCurve> DkgApologizing<PC> {
    /// Accepted only in Apologizing; verification recomputes
    /// `Γ_accused.Pi(x_accuser) =? eval·g2` for every accuser the apology
    /// addresses.
    pub fn handle_apology(&mut self, sender: Idx, msg: ApologyMsg<RosterCurve<PC>>) -> DkgResult<()> {
        if !self.params.roster.contains_index(sender) {
            return Err(DkgError::UnknownSender);
        }
        let commitment = match self.books.commitments.get(&sender) {
            Some(c) => c.clone(),
            // no commitment at all: this dealer was already disqualified
            // regardless of any apology it might publish.
            None => return Ok(()),
        };

        for (&accuser, eval) in msg.accusers.iter().zip(msg.poly_evals.iter()) {
            let mut expected = PC::G2::one();
            expected.mul(eval);
            let ok = commitment.eval(accuser).value == expected;
            if ok {
                self.accusation_books.resolved.insert((sender, accuser));
            }
            if accuser == self.params.my_index && ok {
                self.books.failed_evals.remove(&sender);
                self.books.missing_evals.remove(&sender);
                self.books.verified_evals.insert(sender, eval.clone());
            }
        }
        Ok(())
    }

    /// Apologizing → Finalized. A dealer is disqualified iff there exists an
    /// unresolved accusation against it: no apology arrived for that
    /// accuser, or the apology's evaluation still fails verification.
    ///
    /// Borrows rather than consumes `self`: an orchestrator driving many
    /// eons forward (`keyper_decider::decider`) needs to retry finalization
    /// on a later step without losing the accumulated books if too few
    /// dealers are currently qualified (`ThresholdNotMet`).
    pub fn finalize(&self) -> DkgResult<DkgOutput<PC>> {
        let disqualified = self.accusation_books.disqualified();

        let qualified: Vec<Idx> = self
            .params
            .roster
            .iter()
            .map(|(j, _)| j)
            .filter(|j| !disqualified.contains(j))
            .collect();

        let threshold = self.params.threshold();
        if qualified.len() < threshold {
            return Err(DkgError::ThresholdNotMet(qualified.len(), threshold));
        }

        debug_assert!(
            qualified.contains(&self.params.my_index),
            "a participant must never end up disqualifying itself"
        );

        let mut my_share = PC::Scalar::zero();
        for &j in &qualified {
            if let Some(eval) = self.books.verified_evals.get(&j) {
                my_share.add(eval);
            }
        }

        let mut eon_public_key = PC::G2::zero();
        let mut public_shares = vec![PC::G2::zero(); self.params.n()];
        for &j in &qualified {
            let commitment = match self.books.commitments.get(&j) {
                Some(c) => c,
                None => continue,
            };
            eon_public_key.add(commitment.public_key());
            for (k, share_k) in public_shares.iter_mut().enumerate() {
                share_k.add(&commitment.eval(k as Idx).value);
            }
        }

        let public_shares = public_shares
            .into_iter()
            .enumerate()
            .map(|(k, value)| Eval { index: k as Idx, value })
            .collect();

        Ok(DkgOutput {
            eon: self.params.eon,
            my_index: self.params.my_index,
            my_share,
            eon_public_key,
            public_shares,
            qualified_dealers: qualified,
        })
    }
}

/// The result of a finalized DKG run: this participant's share of the eon
/// secret key, the combined eon public key, every participant's public
/// share (needed to verify `EpochSecretKeyShare`s later), and which dealers
/// were qualified.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "PC::Scalar: DeserializeOwned, PC::G2: DeserializeOwned")]
pub struct DkgOutput<PC: PairingCurve> {
    pub eon: Eon,
    pub my_index: Idx,
    pub my_share: PC::Scalar,
    pub eon_public_key: PC::G2,
    pub public_shares: Vec<Eval<PC::G2>>,
    pub qualified_dealers: Vec<Idx>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::{Address, KeyperEntry};
    use keyper_pairing::curve::bls12381::PairingCurve as Bls;
    use rand::thread_rng;

    fn roster_of(n: u8) -> Roster<RosterCurve<Bls>> {
        let entries: Vec<_> = (0..n)
            .map(|i| KeyperEntry {
                address: Address([i; 20]),
                encryption_pubkey: <Bls as PairingCurve>::G2::rand(&mut thread_rng()),
            })
            .collect();
        Roster::new(entries, 2)
    }

    struct Dealt {
        dealings: Vec<DkgDealing<Bls>>,
        bundles: Vec<(Idx, PolyCommitmentMsg<RosterCurve<Bls>>, Vec<PolyEvalMsg<RosterCurve<Bls>>>)>,
    }

    fn deal(roster: &Roster<RosterCurve<Bls>>) -> Dealt {
        let mut dealings = Vec::new();
        let mut bundles = Vec::new();
        for i in 0..roster.len() as Idx {
            let params = DkgParams::<Bls> { eon: 1, roster: roster.clone(), my_index: i };
            let (dealing, commitment, evals) = DkgOff::new(params).start_phase1_dealing(&mut thread_rng());
            dealings.push(dealing);
            bundles.push((i, commitment, evals));
        }
        Dealt { dealings, bundles }
    }

    fn deliver(dealt: &mut Dealt, skip_dealer: Option<Idx>, tamper: Option<(Idx, Idx)>) {
        for (dealer, commitment, evals) in &dealt.bundles {
            if Some(*dealer) == skip_dealer {
                continue;
            }
            for (receiver, dealing) in dealt.dealings.iter_mut().enumerate() {
                let receiver = receiver as Idx;
                if receiver == *dealer {
                    continue;
                }
                dealing.handle_commitment(*dealer, commitment.clone()).unwrap();
                for eval in evals {
                    if eval.to != receiver {
                        continue;
                    }
                    let mut eval = eval.clone();
                    if tamper == Some((*dealer, receiver)) {
                        eval.value = <Bls as PairingCurve>::Scalar::rand(&mut thread_rng());
                    }
                    let _ = dealing.handle_poly_eval(*dealer, eval);
                }
            }
        }
    }

    #[test]
    fn honest_run_finalizes_with_all_dealers_qualified() {
        let roster = roster_of(3);
        let mut dealt = deal(&roster);
        deliver(&mut dealt, None, None);

        let mut accusings = Vec::new();
        for dealing in dealt.dealings {
            let (accusing, accusation) = dealing.start_phase2_accusing();
            assert!(accusation.is_none());
            accusings.push(accusing);
        }

        let mut apologizings = Vec::new();
        for accusing in accusings {
            let (apologizing, apology) = accusing.start_phase3_apologizing();
            assert!(apology.is_none());
            apologizings.push(apologizing);
        }

        let outputs: Vec<_> = apologizings.into_iter().map(|a| a.finalize().unwrap()).collect();
        let pk0 = outputs[0].eon_public_key.clone();
        for out in &outputs {
            assert_eq!(out.eon_public_key, pk0);
            assert_eq!(out.qualified_dealers, vec![0, 1, 2]);
        }
    }

    #[test]
    fn tampered_evaluation_is_accused_and_resolved_by_apology() {
        let roster = roster_of(3);
        let mut dealt = deal(&roster);
        deliver(&mut dealt, None, Some((1, 0)));

        let mut accusings = Vec::new();
        let mut accusations = Vec::new();
        for (i, dealing) in dealt.dealings.into_iter().enumerate() {
            let (accusing, accusation) = dealing.start_phase2_accusing();
            if let Some(msg) = accusation {
                assert_eq!(i as Idx, 0);
                assert_eq!(msg.accused, vec![1]);
                accusations.push((i as Idx, msg));
            }
            accusings.push(accusing);
        }
        assert_eq!(accusations.len(), 1);

        for (sender, msg) in &accusations {
            for accusing in accusings.iter_mut() {
                accusing.handle_accusation(*sender, msg.clone()).unwrap();
            }
        }

        let mut apologizings = Vec::new();
        let mut apologies = Vec::new();
        for (i, accusing) in accusings.into_iter().enumerate() {
            let (apologizing, apology) = accusing.start_phase3_apologizing();
            if let Some(msg) = apology {
                assert_eq!(i as Idx, 1);
                apologies.push((1_u32, msg));
            }
            apologizings.push(apologizing);
        }
        assert_eq!(apologies.len(), 1);

        for (sender, msg) in &apologies {
            for apologizing in apologizings.iter_mut() {
                apologizing.handle_apology(*sender, msg.clone()).unwrap();
            }
        }

        let outputs: Vec<_> = apologizings.into_iter().map(|a| a.finalize().unwrap()).collect();
        for out in &outputs {
            assert_eq!(out.qualified_dealers, vec![0, 1, 2]);
        }
    }

    #[test]
    fn missing_commitment_disqualifies_dealer() {
        let roster = roster_of(3);
        let mut dealt = deal(&roster);
        deliver(&mut dealt, Some(2), None);

        let mut accusings = Vec::new();
        for dealing in dealt.dealings {
            let (accusing, accusation) = dealing.start_phase2_accusing();
            if let Some(msg) = accusation {
                assert_eq!(msg.accused, vec![2]);
            }
            accusings.push(accusing);
        }

        // every surviving dealer independently accused 2; fan each of their
        // accusations out to everyone else.
        let mut accusation_msgs = Vec::new();
        for i in 0..3u32 {
            if i == 2 {
                continue;
            }
            accusation_msgs.push((i, AccusationMsg { eon: 1, accused: vec![2] }));
        }
        for (sender, msg) in &accusation_msgs {
            for accusing in accusings.iter_mut() {
                accusing.handle_accusation(*sender, msg.clone()).unwrap();
            }
        }

        let mut apologizings = Vec::new();
        for accusing in accusings {
            let (apologizing, apology) = accusing.start_phase3_apologizing();
            assert!(apology.is_none());
            apologizings.push(apologizing);
        }

        let out0 = apologizings.remove(0).finalize().unwrap();
        let out1 = apologizings.remove(0).finalize().unwrap();
        assert_eq!(out0.qualified_dealers, vec![0, 1]);
        assert_eq!(out1.qualified_dealers, vec![0, 1]);
    }
}
