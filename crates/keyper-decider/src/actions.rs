//! Outbound effects produced by `Decider::decide`. Actions are value types
//! carrying all the data their runner needs; dispatch is a closed sum rather
//! than a capability trait object — a small enum plus a dispatch match is
//! sufficient, no inheritance hierarchy needed.

use serde::{Deserialize, Serialize};

/// A message destined for the consensus-layer transport. The transport's
/// own wire encoding is out of scope here; this carries the already-encoded
/// bytes of one of `keyper_dkg::messages`' tagged variants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuttermintMessage {
    pub kind: &'static str,
    pub payload: Vec<u8>,
}

/// Outbound effects written by the Decider, consumed by an external runner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    SendShuttermintMessage { msg: ShuttermintMessage },
    ExecuteCipherBatch { half_step: u64, cipher_batch_hash: [u8; 32], transactions: Vec<Vec<u8>>, keyper_index: u32 },
    ExecutePlainBatch { half_step: u64, transactions: Vec<Vec<u8>> },
    SkipCipherBatch { half_step: u64 },
    Accuse { half_step: u64, keyper_index: u32 },
    Appeal { authorization: Vec<u8> },
}

impl Action {
    pub fn describe(&self) -> String {
        match self {
            Action::SendShuttermintMessage { msg } => format!("send {}", msg.kind),
            Action::ExecuteCipherBatch { half_step, .. } => format!("execute cipher batch at half-step {half_step}"),
            Action::ExecutePlainBatch { half_step, .. } => format!("execute plain batch at half-step {half_step}"),
            Action::SkipCipherBatch { half_step } => format!("skip cipher batch at half-step {half_step}"),
            Action::Accuse { half_step, keyper_index } => {
                format!("accuse keyper {keyper_index} for half-step {half_step}")
            }
            Action::Appeal { .. } => "appeal".to_string(),
        }
    }
}

/// For half-step `h` and a config with `n` keypers, keypers take turns as
/// "first proposer" round-robin by half-step.
pub fn staggered_execution_delay(half_step: u64, my_keyper_index: u32, n: usize, execution_staggering_blocks: u64) -> u64 {
    let n = n as u64;
    let offset = (half_step + my_keyper_index as u64) % n;
    offset * execution_staggering_blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staggered_delay_matches_worked_example() {
        assert_eq!(staggered_execution_delay(0, 2, 4, 5), 10);
        assert_eq!(staggered_execution_delay(0, 0, 4, 5), 0);
    }

    #[test]
    fn staggered_delay_wraps_with_half_step() {
        // half_step=3, my_index=2, n=4 => (3+2) mod 4 = 1 => delay = staggering
        assert_eq!(staggered_execution_delay(3, 2, 4, 5), 5);
    }
}
