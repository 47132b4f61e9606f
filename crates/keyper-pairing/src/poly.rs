//! Degree-t polynomials over a scalar field, and their commitment/evaluation
//! machinery: `random_polynomial`, Horner evaluation, Lagrange recovery and
//! polynomial commitments (§4.2).

use crate::group::{Curve, Element, Point, Scalar};
use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};
use thiserror::Error;

pub type PrivatePoly<C> = Poly<<C as Curve>::Scalar>;
pub type PublicPoly<C> = Poly<<C as Curve>::Point>;

pub type Idx = u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Eval<A> {
    pub value: A,
    pub index: Idx,
}

impl<A: fmt::Display> fmt::Display for Eval<A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{ idx: {}, value: {} }}", self.index, self.value)
    }
}

/// A polynomial using a scalar for the variable x and a generic element for
/// the coefficients. The coefficients must be able to multiply the type of
/// the variable, which is always a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poly<C>(Vec<C>);

impl<C> Poly<C> {
    /// Returns the degree of the polynomial.
    pub fn degree(&self) -> usize {
        self.0.len() - 1
    }

    /// Returns the number of coefficients (the threshold, i.e. degree + 1).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<C: Element> Poly<C> {
    /// Samples a random degree-`degree` polynomial, i.e. `degree + 1`
    /// independent uniform coefficients. In the context of secret sharing
    /// the threshold is `degree + 1`.
    pub fn new_from<R: RngCore>(degree: usize, rng: &mut R) -> Self {
        let coeffs: Vec<C> = (0..=degree).map(|_| C::rand(rng)).collect();
        Self::from(coeffs)
    }

    /// Returns the given coefficient. The index 0 is the free coefficient
    /// (the secret, for a private polynomial). Panics if out of range.
    pub fn get(&self, i: Idx) -> C {
        self.0[i as usize].clone()
    }

    pub fn set(&mut self, index: usize, value: C) {
        self.0[index] = value;
    }

    pub fn zero() -> Self {
        Self::from(vec![C::zero()])
    }

    fn is_zero(&self) -> bool {
        self.0.is_empty() || self.0.iter().all(|coeff| coeff == &C::zero())
    }

    /// Performs polynomial addition in place.
    pub fn add(&mut self, other: &Self) {
        if self.0.len() < other.0.len() {
            self.0.resize(other.0.len(), C::zero())
        }
        self.0.iter_mut().zip(&other.0).for_each(|(a, b)| a.add(b))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolyError {
    #[error("invalid recovery: only has {0}/{1} shares")]
    InvalidRecovery(usize, usize),
    #[error("could not invert scalar")]
    NoInverse,
}

impl<C> Poly<C>
where
    C: Element,
    C::RHS: Scalar<RHS = C::RHS>,
{
    /// Evaluates the polynomial at keyper index `i`, i.e. at x = i+1: the
    /// secret sharing scheme never evaluates at x=0, since that point is the
    /// secret itself.
    pub fn eval(&self, i: Idx) -> Eval<C> {
        let mut xi = C::RHS::new();
        xi.set_int((i + 1).into());

        let res = self.0.iter().rev().fold(C::zero(), |mut sum, coeff| {
            sum.mul(&xi);
            sum.add(coeff);
            sum
        });

        Eval {
            value: res,
            index: i,
        }
    }

    /// Given at least `t` evaluations, recovers the polynomial's constant
    /// term (its secret, or its public key for a committed polynomial).
    pub fn recover(t: usize, shares: Vec<Eval<C>>) -> Result<C, PolyError> {
        let xs = Self::share_map(t, shares)?;

        let mut acc = C::zero();
        for (i, xi) in &xs {
            let mut yi = xi.1.clone();
            let mut num = C::RHS::one();
            let mut den = C::RHS::one();

            for (j, xj) in &xs {
                if i == j {
                    continue;
                }
                num.mul(&xj.0);

                let mut tmp = xj.0.clone();
                tmp.sub(&xi.0);
                den.mul(&tmp);
            }

            let inv = den.inverse().ok_or(PolyError::NoInverse)?;
            num.mul(&inv);
            yi.mul(&num);
            acc.add(&yi);
        }

        Ok(acc)
    }

    /// Given at least `t` evaluations, recovers the entire polynomial.
    pub fn full_recover(t: usize, shares: Vec<Eval<C>>) -> Result<Self, PolyError> {
        let xs = Self::share_map(t, shares)?;

        let res = xs
            .iter()
            .map(|(i, share)| (share, Poly::<C::RHS>::lagrange_basis(*i, &xs)))
            .map(|(share, basis)| {
                let linear_coeffs = basis
                    .0
                    .into_iter()
                    .map(move |c| {
                        let mut s = share.1.clone();
                        s.mul(&c);
                        s
                    })
                    .collect::<Vec<_>>();

                Self::from(linear_coeffs)
            })
            .fold(Self::zero(), |mut acc, poly| {
                acc.add(&poly);
                acc
            });

        Ok(res)
    }

    fn share_map(
        t: usize,
        mut shares: Vec<Eval<C>>,
    ) -> Result<BTreeMap<Idx, (C::RHS, C)>, PolyError> {
        if shares.len() < t {
            return Err(PolyError::InvalidRecovery(shares.len(), t));
        }

        // the subset chosen matters when recovery happens for non-correlated
        // shares, so sort first for determinism.
        shares.sort_by(|a, b| a.index.cmp(&b.index));

        let xs = shares
            .into_iter()
            .take(t)
            .fold(BTreeMap::new(), |mut m, sh| {
                let mut xi = C::RHS::new();
                xi.set_int((sh.index + 1).into());
                m.insert(sh.index, (xi, sh.value));
                m
            });

        debug_assert_eq!(xs.len(), t);

        Ok(xs)
    }

    /// Returns the constant term of the polynomial, interpreted as the
    /// threshold public key for a committed polynomial.
    pub fn public_key(&self) -> &C {
        &self.0[0]
    }
}

impl<C: Element> From<Vec<C>> for Poly<C> {
    fn from(c: Vec<C>) -> Self {
        Self(c)
    }
}

impl<C: Element> From<Poly<C>> for Vec<C> {
    fn from(poly: Poly<C>) -> Self {
        poly.0
    }
}

impl<X: Scalar<RHS = X>> Poly<X> {
    /// Naive polynomial multiplication; fine for the small degrees used in
    /// secret sharing, not for general-purpose use.
    fn mul(&mut self, other: &Self) {
        if self.is_zero() || other.is_zero() {
            *self = Self::zero();
            return;
        }

        let d3 = self.degree() + other.degree();
        let mut coeffs = (0..=d3).map(|_| X::zero()).collect::<Vec<X>>();

        for (i, c1) in self.0.iter().enumerate() {
            for (j, c2) in other.0.iter().enumerate() {
                let mut tmp = X::one();
                tmp.mul(c1);
                tmp.mul(c2);
                coeffs[i + j].add(&tmp);
            }
        }

        self.0 = coeffs;
    }

    /// Returns the scalar polynomial f(x) = x - c.
    fn new_neg_constant(mut c: X) -> Poly<X> {
        c.negate();
        Poly::from(vec![c, X::one()])
    }

    /// Computes the Lagrange basis polynomial of index i over the given set
    /// of x-coordinates.
    fn lagrange_basis<E: Element<RHS = X>>(i: Idx, xs: &BTreeMap<Idx, (X, E)>) -> Poly<X> {
        let mut basis = Poly::<X>::from(vec![X::one()]);
        let mut acc = X::one();

        let xi = xs.get(&i).unwrap().clone().0;
        for (idx, sc) in xs.iter() {
            if *idx == i {
                continue;
            }

            let minus_sc = Poly::<X>::new_neg_constant(sc.0.clone());
            basis.mul(&minus_sc);

            let mut den = X::zero();
            den.add(&xi);
            den.sub(&sc.0);
            den = den.inverse().unwrap();

            acc.mul(&den);
        }

        basis.mul(&Poly::from(vec![acc]));
        basis
    }

    /// Commits the scalar polynomial to the group, multiplying each
    /// coefficient by the group's generator. This produces the public
    /// commitment vector Γ(P).
    pub fn commit<P: Point<RHS = X>>(&self) -> Poly<P> {
        let commits = self
            .0
            .iter()
            .map(|c| {
                let mut commitment = P::one();
                commitment.mul(c);
                commitment
            })
            .collect::<Vec<P>>();

        Poly::<P>::from(commits)
    }
}

impl<C: fmt::Display> fmt::Display for Poly<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = self
            .0
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}: {}", i, c))
            .collect::<Vec<String>>()
            .join(", ");
        write!(f, "[deg: {}, coeffs: [{}]]", self.degree(), s)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::curve::bls12381::{Scalar as Sc, G1};
    use rand::prelude::*;

    #[test]
    fn poly_degree() {
        let s = 5;
        let p = Poly::<Sc>::new_from(s, &mut thread_rng());
        assert_eq!(p.len(), s + 1);
        assert_eq!(p.degree(), s);
    }

    #[test]
    fn add_zero() {
        let p1 = Poly::<Sc>::new_from(3, &mut thread_rng());
        let p2 = Poly::<Sc>::zero();
        let mut res = p1.clone();
        res.add(&p2);
        assert_eq!(res, p1);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn addition(deg1 in 0..50usize, deg2 in 0..50usize) {
            let p1 = Poly::<Sc>::new_from(deg1, &mut thread_rng());
            let p2 = Poly::<Sc>::new_from(deg2, &mut thread_rng());
            let mut res = p1.clone();
            res.add(&p2);

            let larger = if p1.degree() > p2.degree() { &p1 } else { &p2 };
            assert_eq!(res.degree(), larger.degree());
        }

        #[test]
        fn eval_matches_commitment(degree in 0..30usize, idx in 0..30_u32) {
            let poly = Poly::<Sc>::new_from(degree, &mut thread_rng());
            let commitment = poly.commit::<G1>();

            // Γ(P).Pi(x) == P(x)·g1
            let mut expected = G1::one();
            expected.mul(&poly.eval(idx).value);

            assert_eq!(commitment.eval(idx).value, expected);
        }

        #[test]
        fn interpolation(degree in 0..30usize, num_evals in 1..40usize) {
            let poly = Poly::<Sc>::new_from(degree, &mut thread_rng());
            let expected = poly.get(0);

            let shares = (0..num_evals)
                .map(|i| poly.eval(i as Idx))
                .collect::<Vec<_>>();

            if num_evals > degree {
                let recovered = Poly::<Sc>::recover(num_evals, shares).unwrap();
                assert_eq!(expected, recovered);
            }
        }
    }

    #[test]
    fn interpolation_insufficient_shares() {
        let degree = 4;
        let threshold = degree + 1;
        let poly = Poly::<Sc>::new_from(degree, &mut thread_rng());

        let shares = (0..threshold - 1)
            .map(|i| poly.eval(i as Idx))
            .collect::<Vec<_>>();

        Poly::<Sc>::recover(threshold, shares.clone()).unwrap_err();
        Poly::<Sc>::full_recover(threshold, shares).unwrap_err();
    }

    #[test]
    fn commit_matches_manual() {
        let secret = Poly::<Sc>::new_from(5, &mut thread_rng());
        let coeffs: Vec<Sc> = secret.clone().into();
        let commitment = coeffs
            .iter()
            .map(|coeff| {
                let mut p = G1::one();
                p.mul(coeff);
                p
            })
            .collect::<Vec<_>>();
        let commitment = Poly::from(commitment);
        assert_eq!(commitment, secret.commit::<G1>());
    }
}
