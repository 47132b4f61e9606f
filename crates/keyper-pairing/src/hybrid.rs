//! Deterministic IBE-like hybrid encryption to an eon public key and an
//! epoch identifier (§4.5). Encryption is deterministic given the blinding
//! scalar `sigma`; decryption recomputes `sigma` from the recovered payload
//! and rejects the ciphertext if it does not match, following a
//! Fujisaki-Okamoto-style transform.

use crate::errors::DecryptionFailureError;
use crate::group::{Element, PairingCurve, Scalar as ScalarTrait};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A hybrid ciphertext: `c1` is the blinded G2 point `sigma·g2`, `c2` is the
/// payload masked by a GT-derived keystream, `c3` is `sigma` masked by a
/// hash of the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ciphertext<G2> {
    pub c1: G2,
    pub c2: Vec<u8>,
    pub c3: Vec<u8>,
}

/// Encrypts `message` to `(eon_pk, epoch_id)` using blinding scalar `sigma`.
/// `eon_pk` is the eon's combined public key (a G2 point); `epoch_id` is
/// `(epoch_index+1)·g1` (a G1 point, see `ComputeEpochID`).
pub fn encrypt<PC: PairingCurve>(
    message: &[u8],
    eon_pk: &PC::G2,
    epoch_id: &PC::G1,
    sigma: &PC::Scalar,
) -> Ciphertext<PC::G2> {
    let mut c1 = PC::G2::one();
    c1.mul(sigma);

    let mut sigma_eon_pk = eon_pk.clone();
    sigma_eon_pk.mul(sigma);

    let shared = PC::pair(epoch_id, &sigma_eon_pk);
    let keystream = hash_gt_to_bytes::<PC>(&shared, message.len());
    let c2 = xor(message, &keystream);

    let sigma_bytes = bincode::serialize(sigma).expect("scalar serialization should not fail");
    let mask = hash_payload_mask(message, sigma_bytes.len());
    let c3 = xor(&sigma_bytes, &mask);

    Ciphertext { c1, c2, c3 }
}

/// Decrypts a hybrid ciphertext given the combined epoch secret key (a G1
/// point, `EpochSecretKey`). Fails with `DecryptionFailureError` if the
/// recomputed `sigma` is inconsistent with `c1`.
pub fn decrypt<PC: PairingCurve>(
    ct: &Ciphertext<PC::G2>,
    epoch_sk: &PC::G1,
) -> Result<Vec<u8>, DecryptionFailureError> {
    let shared = PC::pair(epoch_sk, &ct.c1);
    let keystream = hash_gt_to_bytes::<PC>(&shared, ct.c2.len());
    let payload = xor(&ct.c2, &keystream);

    let mask = hash_payload_mask(&payload, ct.c3.len());
    let sigma_bytes = xor(&ct.c3, &mask);

    let sigma: PC::Scalar =
        bincode::deserialize(&sigma_bytes).map_err(|_| DecryptionFailureError)?;

    let mut recomputed_c1 = PC::G2::one();
    recomputed_c1.mul(&sigma);

    if recomputed_c1 != ct.c1 {
        return Err(DecryptionFailureError);
    }

    Ok(payload)
}

/// Expands a GT element into a keystream of the requested length via
/// SHA-256 in counter mode.
fn hash_gt_to_bytes<PC: PairingCurve>(gt: &PC::GT, len: usize) -> Vec<u8> {
    let base = bincode::serialize(gt).expect("GT serialization should not fail");
    let mut out = Vec::with_capacity(len + 32);
    let mut counter: u32 = 0;
    while out.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(&base);
        hasher.update(counter.to_le_bytes());
        out.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    out.truncate(len);
    out
}

fn hash_payload_mask(payload: &[u8], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 32);
    let mut counter: u32 = 0;
    while out.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(payload);
        hasher.update(counter.to_le_bytes());
        out.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    out.truncate(len);
    out
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}
