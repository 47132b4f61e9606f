//! Traits for operating on groups and elliptic curves.
//!
//! Mirrors the group abstraction of a typical pairing library: `Element` is
//! the additive-notation interface shared by scalars and points, `Scalar`
//! and `Point` refine it, and `PairingCurve` ties two source groups and a
//! target group together through a bilinear pairing.

use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::marker::PhantomData;

/// Element represents an element of a group with the additive notation
/// which is also equipped with a multiplication transformation.
///
/// Two implementations are used: `Scalar`, which forms a ring so RHS is the
/// same type, and `Point`, which can be multiplied by a scalar of its prime
/// field. The target group GT of a pairing is also represented through this
/// trait even though its natural group operation is multiplicative: `add`
/// there is implemented as field multiplication and `one` as the
/// multiplicative identity, so a pairing check can be expressed uniformly as
/// an accumulation via `add` compared against `GT::one()`.
pub trait Element:
    Clone + Display + Debug + Eq + Serialize + for<'a> Deserialize<'a> + PartialEq + Send + Sync
{
    /// The right-hand-side argument for multiplication.
    type RHS;

    /// Returns the zero element of the group.
    fn new() -> Self;

    /// Returns the one element of the group.
    fn one() -> Self;

    /// Adds the RHS element to the LHS element in place.
    fn add(&mut self, s2: &Self);

    /// Multiplies the LHS element by the RHS element in place.
    fn mul(&mut self, mul: &Self::RHS);

    /// Samples a random element using the provided RNG.
    fn rand<R: RngCore>(rng: &mut R) -> Self;

    /// Returns the zero element of the group.
    fn zero() -> Self {
        Self::new()
    }
}

/// Checks inclusion in the prime-order subgroup, for curves whose underlying
/// representation does not already enforce this.
pub trait PrimeOrder: Element {
    fn in_correct_subgroup(&self) -> bool;
}

/// A scalar can be multiplied by only a scalar, no other elements.
pub trait Scalar: Element {
    fn set_int(&mut self, i: u64);
    fn inverse(&self) -> Option<Self>;
    fn negate(&mut self);
    fn sub(&mut self, other: &Self);
    fn from_random_bytes(bytes: &[u8]) -> Option<Self>;
    fn serialized_size(&self) -> usize;
}

/// Basic point functionality that can be multiplied by a scalar.
pub trait Point: Element {
    /// Error which may occur while mapping bytes to a group element.
    type Error: Debug;

    /// Maps the provided data to a group element (hash-to-curve).
    fn map(&mut self, data: &[u8]) -> Result<(), <Self as Point>::Error>;

    /// Returns the negation of this point, i.e. `-1 * self`.
    fn negated(&self) -> Self {
        let mut neg_one = Self::RHS::one();
        neg_one.negate();
        let mut out = self.clone();
        out.mul(&neg_one);
        out
    }
}

/// A group holds the scalar and point types related to it; it is similar to
/// the pairing-library "Engine" definition, just simpler.
pub trait Curve: Clone + Debug + Send + Sync {
    type Scalar: Scalar<RHS = Self::Scalar>;
    type Point: Point<RHS = Self::Scalar>;

    fn scalar() -> Self::Scalar {
        Self::Scalar::new()
    }

    fn point() -> Self::Point {
        Self::Point::one()
    }
}

/// A curve equipped with a bilinear pairing operation e: G1 x G2 -> GT.
pub trait PairingCurve: Debug {
    type Scalar: Scalar<RHS = Self::Scalar>;
    type G1: Point<RHS = Self::Scalar>;
    type G2: Point<RHS = Self::Scalar>;
    type GT: Element<RHS = Self::Scalar>;

    /// Performs a pairing operation between the two group elements.
    fn pair(a: &Self::G1, b: &Self::G2) -> Self::GT;

    /// Returns true iff the sum of pairings `Σ e(g1s[i], g2s[i])` equals the
    /// identity of GT, without ever revealing any discrete log. Used to
    /// verify shares and signatures against public commitments.
    fn pairing_check(g1s: &[Self::G1], g2s: &[Self::G2]) -> bool {
        assert_eq!(g1s.len(), g2s.len());
        let mut acc = Self::GT::one();
        for (a, b) in g1s.iter().zip(g2s.iter()) {
            acc.add(&Self::pair(a, b));
        }
        acc == Self::GT::one()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Helper which binds together a scalar and a point type to form a curve.
pub struct CurveFrom<S: Scalar, P: Point> {
    s: PhantomData<S>,
    p: PhantomData<P>,
}

impl<S, P> Curve for CurveFrom<S, P>
where
    S: Scalar<RHS = S>,
    P: Point<RHS = S>,
{
    type Scalar = S;
    type Point = P;
}

pub(super) type G1Curve<C> = CurveFrom<<C as PairingCurve>::Scalar, <C as PairingCurve>::G1>;
pub(super) type G2Curve<C> = CurveFrom<<C as PairingCurve>::Scalar, <C as PairingCurve>::G2>;
