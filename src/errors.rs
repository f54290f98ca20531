use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the ensemble and the filling-scheme partitioner.
///
/// Construction and configuration problems are raised immediately; nothing
/// is left half-initialized. Numerical problems inside a kernel dispatch are
/// never raised from the kernel itself, they are found afterwards by an
/// explicit validity check.
#[derive(Debug, Error)]
pub enum Error {
    /// A per-particle array does not fit the declared capacity.
    #[error("{field}: got {len} values for a capacity of {capacity}")]
    Shape {
        field: &'static str,
        len: usize,
        capacity: usize,
    },

    /// Invalid reference scalars, backend name, or filling pattern.
    #[error("configuration error: {0}")]
    Config(String),

    /// A field expected to stay finite contains NaN.
    #[error("non-finite value detected in {0}")]
    NumericalInvalid(&'static str),
}
