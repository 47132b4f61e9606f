use thiserror::Error;

/// Raised when parsing a canonical point encoding that is malformed or
/// describes a point not on the curve.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("malformed point encoding")]
pub struct MalformedPointError;

/// Raised when a polynomial is combined with a commitment of the wrong
/// length.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("degree mismatch: polynomial has {0} coefficients, commitment has {1}")]
pub struct DegreeMismatchError(pub usize, pub usize);

/// Raised by the hybrid encryption scheme when the Fujisaki-Okamoto
/// consistency check fails on decryption.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("decryption failed: ciphertext is not consistent with the recovered sigma")]
pub struct DecryptionFailureError;
