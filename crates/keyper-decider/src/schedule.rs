//! Phase timing (§4.7). Phases are driven by an external monotone block
//! height; `PhaseSchedule` gives absolute offsets from an eon's
//! `start_height` for each phase boundary. An explicit value rather than a
//! constant, so tests can compress phases (§9 "No global state").

use keyper_dkg::dkg::DkgOff;
use keyper_pairing::group::PairingCurve;
use serde::{Deserialize, Serialize};

/// The local phase of a DKG/EKG run, mirroring `dkg::Dkg*`'s own type
/// progression but usable before the corresponding phase object has
/// actually been constructed (the schedule is computed from block height
/// alone, ahead of any message having arrived).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    Off,
    Dealing,
    Accusing,
    Apologizing,
    Finalized,
}

/// Absolute block-height offsets from an eon's `start_height` for each
/// phase boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSchedule {
    pub dealing_blocks: u64,
    pub accusing_blocks: u64,
    pub apologizing_blocks: u64,
}

impl Default for PhaseSchedule {
    /// §4.7's example schedule: Dealing=0..30, Accusing=30..60,
    /// Apologizing=60..90, Finalized≥90.
    fn default() -> Self {
        Self { dealing_blocks: 30, accusing_blocks: 30, apologizing_blocks: 30 }
    }
}

impl PhaseSchedule {
    /// `phase_at(h, start)`: Off if h<start; Dealing if h<start+dealing;
    /// Accusing if h<start+dealing+accusing; Apologizing if
    /// h<start+dealing+accusing+apologizing; else Finalized.
    pub fn phase_at(&self, height: u64, start_height: u64) -> Phase {
        if height < start_height {
            return Phase::Off;
        }
        let elapsed = height - start_height;
        let dealing_end = self.dealing_blocks;
        let accusing_end = dealing_end + self.accusing_blocks;
        let apologizing_end = accusing_end + self.apologizing_blocks;

        if elapsed < dealing_end {
            Phase::Dealing
        } else if elapsed < accusing_end {
            Phase::Accusing
        } else if elapsed < apologizing_end {
            Phase::Apologizing
        } else {
            Phase::Finalized
        }
    }
}

/// Starts phase 1 for a freshly created DKG once its schedule says the
/// current phase is at least Dealing. Thin wrapper kept here (rather than
/// in `keyper_dkg::dkg`) since only the Decider decides *when* to call it —
/// the pure state machine has no notion of block height.
pub fn start_dealing_if_due<PC: PairingCurve, R: rand_core::RngCore>(
    off: DkgOff<PC>,
    schedule: &PhaseSchedule,
    current_height: u64,
    start_height: u64,
    rng: &mut R,
) -> Result<
    (
        keyper_dkg::dkg::DkgDealing<PC>,
        keyper_dkg::messages::PolyCommitmentMsg<keyper_dkg::dkg::RosterCurve<PC>>,
        Vec<keyper_dkg::messages::PolyEvalMsg<keyper_dkg::dkg::RosterCurve<PC>>>,
    ),
    DkgOff<PC>,
> {
    if schedule.phase_at(current_height, start_height) >= Phase::Dealing {
        Ok(off.start_phase1_dealing(rng))
    } else {
        Err(off)
    }
}
