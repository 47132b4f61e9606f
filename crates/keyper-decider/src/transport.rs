//! Point-to-point transport for private `PolyEval` delivery (§4.5's
//! `encrypt_to(pubkey, bytes) -> bytes` / `decrypt(bytes) -> bytes`
//! abstraction), instantiated with `keyper_pairing::ecies`. The Decider is
//! the only layer that knows evaluations must be encrypted before they
//! leave the process and decrypted on arrival; `keyper_dkg::dkg` only ever
//! sees plaintext `PolyEvalMsg`s.

use keyper_dkg::messages::PolyEvalMsg;
use keyper_pairing::ecies;
use keyper_pairing::group::Curve;

/// Encrypts a single evaluation to its receiver's registered transport key.
/// Panics only on a serialization bug (both sides are plain Rust types with
/// no externally-controlled content), never on cryptographic failure.
pub fn encrypt_eval<C: Curve, R: rand_core::RngCore>(
    to_pubkey: &C::Point,
    msg: &PolyEvalMsg<C>,
    rng: &mut R,
) -> Vec<u8> {
    let plaintext = bincode::serialize(msg).expect("PolyEvalMsg serialization should not fail");
    let cipher = ecies::encrypt::<C, R>(to_pubkey, &plaintext, rng);
    bincode::serialize(&cipher).expect("EciesCipher serialization should not fail")
}

/// Decrypts a single evaluation addressed to us. Returns `None` on any
/// failure (malformed framing or a wrong/failed ECIES decryption) — the
/// caller treats this exactly like any other contained cryptographic error
/// (§7): logged, dropped, cursor still advances.
pub fn decrypt_eval<C: Curve>(my_secret: &C::Scalar, bytes: &[u8]) -> Option<PolyEvalMsg<C>> {
    let cipher: ecies::EciesCipher<C> = bincode::deserialize(bytes).ok()?;
    let plaintext = ecies::decrypt::<C>(my_secret, &cipher).ok()?;
    bincode::deserialize(&plaintext).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyper_dkg::dkg::RosterCurve;
    use keyper_pairing::curve::bls12381::PairingCurve as Bls;
    use keyper_pairing::group::{Element, PairingCurve};
    use rand::thread_rng;

    type RC = RosterCurve<Bls>;

    #[test]
    fn roundtrips_through_encryption() {
        let rng = &mut thread_rng();
        let secret = <Bls as PairingCurve>::Scalar::rand(rng);
        let mut pubkey = <Bls as PairingCurve>::G2::one();
        pubkey.mul(&secret);

        let msg = PolyEvalMsg::<RC> { eon: 3, to: 1, value: <Bls as PairingCurve>::Scalar::rand(rng) };
        let wire = encrypt_eval::<RC, _>(&pubkey, &msg, rng);
        let decoded = decrypt_eval::<RC>(&secret, &wire).unwrap();

        assert_eq!(decoded.eon, msg.eon);
        assert_eq!(decoded.to, msg.to);
        assert_eq!(decoded.value, msg.value);
    }

    #[test]
    fn garbage_bytes_decrypt_to_none() {
        let rng = &mut thread_rng();
        let secret = <Bls as PairingCurve>::Scalar::rand(rng);
        assert!(decrypt_eval::<RC>(&secret, &[1, 2, 3]).is_none());
    }
}
