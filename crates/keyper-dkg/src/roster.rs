//! The deterministically-ordered participant set a DKG run is keyed by
//! (§3 "Keyper index"). Each keyper is identified by a wallet address and
//! carries the encryption public key it registered via `CheckIn`; position
//! in the sorted roster is the keyper's index, and `x_k = k+1` is its
//! secret-sharing evaluation point (never 0, which is reserved for the
//! secret itself).

use keyper_pairing::group::Curve;
use keyper_pairing::poly::Idx;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A keyper's wallet address; roster ordering is by this value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "0x")?;
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// A single participant: their address and the encryption public key they
/// registered (the `CheckIn` message's `encryption_pubkey`, used to deliver
/// them their private polynomial evaluations via ECIES).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "C::Scalar: DeserializeOwned")]
pub struct KeyperEntry<C: Curve> {
    pub address: Address,
    pub encryption_pubkey: C::Point,
}

/// The roster a DKG or epoch key generator is parameterized by: an ordered
/// set of keypers plus the protocol's threshold.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "C::Scalar: DeserializeOwned")]
pub struct Roster<C: Curve> {
    keypers: Vec<KeyperEntry<C>>,
    pub threshold: usize,
}

impl<C: Curve> Roster<C> {
    /// Builds a roster, sorting keypers by address to fix their indices
    /// deterministically regardless of input order.
    pub fn new(mut keypers: Vec<KeyperEntry<C>>, threshold: usize) -> Self {
        keypers.sort_by_key(|k| k.address);
        Self { keypers, threshold }
    }

    pub fn len(&self) -> usize {
        self.keypers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypers.is_empty()
    }

    pub fn index_of(&self, address: Address) -> Option<Idx> {
        self.keypers
            .iter()
            .position(|k| k.address == address)
            .map(|i| i as Idx)
    }

    pub fn entry(&self, index: Idx) -> Option<&KeyperEntry<C>> {
        self.keypers.get(index as usize)
    }

    pub fn contains_index(&self, index: Idx) -> bool {
        (index as usize) < self.keypers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Idx, &KeyperEntry<C>)> {
        self.keypers
            .iter()
            .enumerate()
            .map(|(i, k)| (i as Idx, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyper_pairing::curve::bls12381::G2Curve;
    use keyper_pairing::group::Element;

    fn addr(b: u8) -> Address {
        Address([b; 20])
    }

    fn entry(b: u8) -> KeyperEntry<G2Curve> {
        KeyperEntry {
            address: addr(b),
            encryption_pubkey: keyper_pairing::curve::bls12381::G2::rand(&mut rand::thread_rng()),
        }
    }

    #[test]
    fn roster_sorts_by_address() {
        let roster = Roster::<G2Curve>::new(vec![entry(9), entry(1), entry(5)], 2);
        assert_eq!(roster.index_of(addr(1)), Some(0));
        assert_eq!(roster.index_of(addr(5)), Some(1));
        assert_eq!(roster.index_of(addr(9)), Some(2));
    }

    #[test]
    fn unknown_address_is_none() {
        let roster = Roster::<G2Curve>::new(vec![entry(1)], 1);
        assert_eq!(roster.index_of(addr(2)), None);
    }
}
