//! Elliptic Curve Integrated Encryption Scheme using HKDF-SHA256 as the key
//! derivation function and ChaCha20-Poly1305 as the AEAD. Used for private,
//! authenticated point-to-point delivery of DKG polynomial evaluations
//! (§4.5's `encrypt_to`/`decrypt` abstraction).

use crate::group::{Curve, Element};
use chacha20poly1305::{
    aead::{Aead, Error as AError, KeyInit},
    ChaCha20Poly1305,
};
use hkdf::Hkdf;
use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

pub use chacha20poly1305::aead::Error as EciesError;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const DOMAIN: [u8; 4] = [1, 9, 6, 9];

/// An ECIES ciphertext: AEAD output, ephemeral public key, and nonce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EciesCipher<C: Curve> {
    aead: Vec<u8>,
    ephemeral: C::Point,
    nonce: [u8; NONCE_LEN],
}

/// Encrypts `msg` to the recipient's public key (a curve point).
pub fn encrypt<C: Curve, R: RngCore>(to: &C::Point, msg: &[u8], rng: &mut R) -> EciesCipher<C> {
    let eph_secret = C::Scalar::rand(rng);

    let mut ephemeral = C::Point::one();
    ephemeral.mul(&eph_secret);

    let mut dh = to.clone();
    dh.mul(&eph_secret);

    let ephemeral_key = derive::<C>(&dh);
    let aead = ChaCha20Poly1305::new(&ephemeral_key.into());

    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);

    let aead = aead
        .encrypt(&nonce.into(), msg)
        .expect("aead encryption should not fail");

    EciesCipher {
        aead,
        nonce,
        ephemeral,
    }
}

/// Decrypts an ECIES ciphertext with the recipient's secret key.
pub fn decrypt<C: Curve>(private: &C::Scalar, cipher: &EciesCipher<C>) -> Result<Vec<u8>, AError> {
    let mut dh = cipher.ephemeral.clone();
    dh.mul(private);

    let ephemeral_key = derive::<C>(&dh);
    let aead = ChaCha20Poly1305::new(&ephemeral_key.into());
    aead.decrypt(&cipher.nonce.into(), &cipher.aead[..])
}

fn derive<C: Curve>(dh: &C::Point) -> [u8; KEY_LEN] {
    let serialized = bincode::serialize(dh).expect("could not serialize group element");

    // no salt needed: ephemeral-static DH already supplies entropy
    let h = Hkdf::<Sha256>::new(None, &serialized);
    let mut ephemeral_key = [0u8; KEY_LEN];
    h.expand(&DOMAIN, &mut ephemeral_key)
        .expect("hkdf expand of a fixed-size output should not fail");

    ephemeral_key
}
