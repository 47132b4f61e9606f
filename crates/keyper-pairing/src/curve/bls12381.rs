use crate::errors::MalformedPointError;
use crate::group::PrimeOrder;
use crate::group::{self, Element, PairingCurve as PC, Point, Scalar as Sc};
use ark_bls12_381 as bls381;
use ark_ec::hashing::curve_maps::wb::WBMap;
use ark_ec::hashing::map_to_curve_hasher::MapToCurveBasedHasher;
use ark_ec::hashing::{HashToCurve, HashToCurveError};
use ark_ec::pairing::Pairing;
use ark_ec::{AffineRepr, CurveGroup, Group};
use ark_ff::field_hashers::DefaultFieldHasher;
use ark_ff::{Field, One, PrimeField, UniformRand, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize, Compress};
use rand_core::RngCore;
use serde::{
    de::{Error as DeserializeError, SeqAccess, Visitor},
    ser::{Error as SerializationError, SerializeTuple},
    Deserialize, Deserializer, Serialize, Serializer,
};
use sha2::Sha256;
use std::{
    fmt,
    marker::PhantomData,
    ops::{AddAssign, MulAssign, Neg, SubAssign},
};

/// Domain separator for hash-to-curve mapping.
pub const MAP_DOMAIN: &[u8] = b"keyper-dkg-v1";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize, Serialize)]
pub struct Scalar(
    #[serde(deserialize_with = "deserialize_field")]
    #[serde(serialize_with = "serialize_field")]
    <bls381::Bls12_381 as Pairing>::ScalarField,
);

type ZG1 = <bls381::Bls12_381 as Pairing>::G1;

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct G1(
    #[serde(deserialize_with = "deserialize_group")]
    #[serde(serialize_with = "serialize_group")]
    ZG1,
);

type ZG2 = <bls381::Bls12_381 as Pairing>::G2;

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct G2(
    #[serde(deserialize_with = "deserialize_group")]
    #[serde(serialize_with = "serialize_group")]
    ZG2,
);

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct GT(
    #[serde(deserialize_with = "deserialize_field")]
    #[serde(serialize_with = "serialize_field")]
    <bls381::Bls12_381 as Pairing>::TargetField,
);

impl Element for Scalar {
    type RHS = Scalar;

    fn new() -> Self {
        Self(Zero::zero())
    }

    fn one() -> Self {
        Self(One::one())
    }

    fn add(&mut self, s2: &Self) {
        self.0.add_assign(s2.0);
    }

    fn mul(&mut self, mul: &Scalar) {
        self.0.mul_assign(mul.0)
    }

    fn rand<R: RngCore>(rng: &mut R) -> Self {
        Self(bls381::Fr::rand(rng))
    }
}

impl Sc for Scalar {
    fn set_int(&mut self, i: u64) {
        *self = Self(bls381::Fr::from(i))
    }

    fn inverse(&self) -> Option<Self> {
        Some(Self(Field::inverse(&self.0)?))
    }

    fn negate(&mut self) {
        *self = Self(self.0.neg())
    }

    fn sub(&mut self, other: &Self) {
        self.0.sub_assign(other.0);
    }

    fn from_random_bytes(bytes: &[u8]) -> Option<Self> {
        let fr = bls381::Fr::from_random_bytes(bytes)?;
        Some(Self(fr))
    }

    fn serialized_size(&self) -> usize {
        self.0.serialized_size(Compress::Yes)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{{:?}}}", self.0)
    }
}

/// G1 points can be multiplied by Fr elements.
impl Element for G1 {
    type RHS = Scalar;

    fn new() -> Self {
        Self(Zero::zero())
    }

    fn one() -> Self {
        Self(ZG1::generator())
    }

    fn rand<R: RngCore>(rng: &mut R) -> Self {
        Self(ZG1::rand(rng))
    }

    fn add(&mut self, s2: &Self) {
        self.0.add_assign(s2.0);
    }

    fn mul(&mut self, mul: &Scalar) {
        self.0.mul_assign(mul.0);
    }
}

impl Point for G1 {
    type Error = HashToCurveError;

    fn map(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        let hasher = MapToCurveBasedHasher::<
            ZG1,
            DefaultFieldHasher<Sha256>,
            WBMap<bls381::g1::Config>,
        >::new(MAP_DOMAIN)?;

        let hash = hasher.hash(data)?;
        *self = Self(hash.into());
        Ok(())
    }
}

impl fmt::Display for G1 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{{:?}}}", self.0)
    }
}

/// G2 points can be multiplied by Fr elements.
impl Element for G2 {
    type RHS = Scalar;

    fn new() -> Self {
        Self(Zero::zero())
    }

    fn one() -> Self {
        Self(ZG2::generator())
    }

    fn rand<R: RngCore>(mut rng: &mut R) -> Self {
        Self(ZG2::rand(&mut rng))
    }

    fn add(&mut self, s2: &Self) {
        self.0.add_assign(s2.0);
    }

    fn mul(&mut self, mul: &Scalar) {
        self.0.mul_assign(mul.0)
    }
}

impl Point for G2 {
    type Error = HashToCurveError;

    fn map(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        let hasher = MapToCurveBasedHasher::<
            ZG2,
            DefaultFieldHasher<sha2::Sha256>,
            WBMap<bls381::g2::Config>,
        >::new(MAP_DOMAIN)?;

        let hash = hasher.hash(data)?;
        *self = Self(hash.into());
        Ok(())
    }
}

impl fmt::Display for G2 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{{:?}}}", self.0)
    }
}

/// GT is the multiplicative subgroup of the extension field; it is exposed
/// through the additive `Element` interface by mapping `add` to field
/// multiplication and `one` to the multiplicative identity.
impl Element for GT {
    type RHS = Scalar;

    fn new() -> Self {
        Self(One::one())
    }
    fn one() -> Self {
        Self(One::one())
    }
    fn add(&mut self, s2: &Self) {
        self.0.mul_assign(s2.0);
    }
    fn mul(&mut self, mul: &Scalar) {
        let scalar = mul.0.into_bigint();
        let mut res = Self::one();
        let mut temp = self.clone();
        for b in ark_ff::BitIteratorLE::without_trailing_zeros(scalar) {
            if b {
                res.0.mul_assign(temp.0);
            }
            temp.0.square_in_place();
        }
        *self = res.clone();
    }
    fn rand<R: RngCore>(rng: &mut R) -> Self {
        Self(bls381::Fq12::rand(rng))
    }
}

impl PrimeOrder for GT {
    fn in_correct_subgroup(&self) -> bool {
        self.0
            .pow(<bls381::Bls12_381 as Pairing>::ScalarField::characteristic())
            .is_one()
    }
}

impl fmt::Display for GT {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{{:?}}}", self.0)
    }
}

pub type G1Curve = group::G1Curve<PairingCurve>;
pub type G2Curve = group::G2Curve<PairingCurve>;

#[derive(Clone, Debug)]
pub struct PairingCurve;

impl PC for PairingCurve {
    type Scalar = Scalar;
    type G1 = G1;
    type G2 = G2;
    type GT = GT;

    fn pair(a: &Self::G1, b: &Self::G2) -> Self::GT {
        GT(<bls381::Bls12_381 as Pairing>::pairing(a.0, b.0).0)
    }
}

/// Parses a canonical, compressed G1 encoding, rejecting malformed or
/// off-curve points. Used at message-deserialization boundaries where the
/// spec requires `MalformedPoint` on invalid encodings.
pub fn g1_from_canonical_bytes(bytes: &[u8]) -> Result<G1, MalformedPointError> {
    let affine = <ZG1 as CurveGroup>::Affine::deserialize_compressed(bytes)
        .map_err(|_| MalformedPointError)?;
    Ok(G1(affine.into()))
}

/// Parses a canonical, compressed G2 encoding, rejecting malformed or
/// off-curve points.
pub fn g2_from_canonical_bytes(bytes: &[u8]) -> Result<G2, MalformedPointError> {
    let affine = <ZG2 as CurveGroup>::Affine::deserialize_compressed(bytes)
        .map_err(|_| MalformedPointError)?;
    Ok(G2(affine.into()))
}

// Serde implementations (ideally these live upstream in arkworks).

fn deserialize_field<'de, D, C>(deserializer: D) -> Result<C, D::Error>
where
    D: Deserializer<'de>,
    C: Field,
{
    struct FieldVisitor<C>(PhantomData<C>);

    impl<'de, C> Visitor<'de> for FieldVisitor<C>
    where
        C: Field,
    {
        type Value = C;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a valid group element")
        }

        fn visit_seq<S>(self, mut seq: S) -> Result<C, S::Error>
        where
            S: SeqAccess<'de>,
        {
            let len = C::zero().serialized_size(Compress::Yes);
            let bytes: Vec<u8> = (0..len)
                .map(|_| {
                    seq.next_element()?
                        .ok_or_else(|| DeserializeError::custom("could not read bytes"))
                })
                .collect::<Result<Vec<_>, _>>()?;

            let res =
                C::deserialize_compressed(&mut &bytes[..]).map_err(DeserializeError::custom)?;
            Ok(res)
        }
    }

    let visitor = FieldVisitor(PhantomData);
    deserializer.deserialize_tuple(C::zero().serialized_size(Compress::Yes), visitor)
}

fn serialize_field<S, C>(c: &C, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    C: Field,
{
    let len = c.serialized_size(Compress::Yes);
    let mut bytes = Vec::with_capacity(len);
    c.serialize_compressed(&mut bytes)
        .map_err(SerializationError::custom)?;

    let mut tup = s.serialize_tuple(len)?;
    for byte in &bytes {
        tup.serialize_element(byte)?;
    }
    tup.end()
}

fn deserialize_group<'de, D, C>(deserializer: D) -> Result<C, D::Error>
where
    D: Deserializer<'de>,
    C: CurveGroup,
    C::Affine: CanonicalDeserialize + CanonicalSerialize,
{
    struct GroupVisitor<C>(PhantomData<C>);

    impl<'de, C> Visitor<'de> for GroupVisitor<C>
    where
        C: CurveGroup,
    {
        type Value = C;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a valid group element")
        }

        fn visit_seq<S>(self, mut seq: S) -> Result<C, S::Error>
        where
            S: SeqAccess<'de>,
        {
            let len = C::Affine::zero().serialized_size(Compress::Yes);
            let bytes: Vec<u8> = (0..len)
                .map(|_| {
                    seq.next_element()?
                        .ok_or_else(|| DeserializeError::custom("could not read bytes"))
                })
                .collect::<Result<Vec<_>, _>>()?;

            let affine = C::Affine::deserialize_compressed(&mut &bytes[..])
                .map_err(DeserializeError::custom)?;
            Ok(affine.into())
        }
    }

    let visitor = GroupVisitor(PhantomData);
    deserializer.deserialize_tuple(C::Affine::zero().serialized_size(Compress::Yes), visitor)
}

fn serialize_group<S, C>(c: &C, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    C: CurveGroup,
    C::Affine: CanonicalSerialize,
{
    let affine = c.into_affine();
    let len = affine.serialized_size(Compress::Yes);
    let mut bytes = Vec::with_capacity(len);
    affine
        .serialize_compressed(&mut bytes)
        .map_err(SerializationError::custom)?;

    let mut tup = s.serialize_tuple(len)?;
    for byte in &bytes {
        tup.serialize_element(byte)?;
    }
    tup.end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::Point as _;
    use serde::{de::DeserializeOwned, Serialize};
    use static_assertions::assert_impl_all;

    assert_impl_all!(G1: Serialize, DeserializeOwned, Clone);
    assert_impl_all!(G2: Serialize, DeserializeOwned, Clone);
    assert_impl_all!(GT: Serialize, DeserializeOwned, Clone);
    assert_impl_all!(Scalar: Serialize, DeserializeOwned, Clone);

    #[test]
    fn serialize_group_roundtrip() {
        roundtrip::<G1>();
        roundtrip::<G2>();
    }

    fn roundtrip<E: Element>() {
        let rng = &mut rand::thread_rng();
        let sig = E::rand(rng);
        let ser = bincode::serialize(&sig).unwrap();
        let de: E = bincode::deserialize(&ser).unwrap();
        assert_eq!(de, sig);
    }

    #[test]
    fn canonical_bytes_roundtrip() {
        let rng = &mut rand::thread_rng();
        let p = G1::rand(rng);
        let mut affine_bytes = Vec::new();
        use ark_ec::CurveGroup as _;
        p.0.into_affine()
            .serialize_compressed(&mut affine_bytes)
            .unwrap();
        let parsed = g1_from_canonical_bytes(&affine_bytes).unwrap();
        assert_eq!(parsed, p);
    }

    #[test]
    fn malformed_bytes_rejected() {
        let garbage = vec![0xffu8; 48];
        assert!(g1_from_canonical_bytes(&garbage).is_err());
    }

    #[test]
    fn pairing_bilinearity() {
        use crate::group::PairingCurve as _;
        let rng = &mut rand::thread_rng();
        let mut a = Scalar::rand(rng);
        let b = Scalar::rand(rng);

        let mut g1 = G1::one();
        g1.mul(&a);
        let g2 = G2::one();

        let lhs = PairingCurve::pair(&g1, &g2);

        let mut g1b = G1::one();
        a.mul(&b);
        g1b.mul(&a);
        let rhs = PairingCurve::pair(&g1b, &g2);

        // e(a*g1, g2)^b == e(a*b*g1, g2)
        let mut lhs_pow_b = lhs.clone();
        lhs_pow_b.mul(&b);
        assert_eq!(lhs_pow_b, rhs);
    }

    #[test]
    fn gt_exp() {
        let rng = &mut rand::thread_rng();
        let base = GT::rand(rng);

        let mut sc = Scalar::one();
        sc.add(&Scalar::one());
        sc.add(&Scalar::one());

        let mut exp = base.clone();
        exp.mul(&sc);

        let mut res = base.clone();
        res.add(&base);
        res.add(&base);

        assert_eq!(exp, res);
    }

    #[test]
    fn point_negation() {
        let rng = &mut rand::thread_rng();
        let p = G1::rand(rng);
        let mut sum = p.clone();
        sum.add(&p.negated());
        assert_eq!(sum, G1::new());
    }
}
