#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InsError {
    #[error("matrix is singular to working precision (det = {det:e})")]
    SingularMatrix { det: f64 },

    #[error("vector norm is too close to zero")]
    DegenerateVector,

    #[error("observation vectors are near-parallel (sin angle = {sin_angle:e})")]
    NearParallel { sin_angle: f64 },

    #[error("observation geometry is degenerate (singular values {0:?})")]
    DegenerateGeometry([f64; 3]),

    #[error("singular value decomposition did not converge")]
    SvdFailed,

    #[error("matrix is not orthonormal (max deviation {0:e})")]
    NotOrthonormal(f64),

    #[error("non-finite attitude component")]
    NonFinite,

    #[error("insufficient samples: required {required}, available {available}")]
    InsufficientSamples { required: usize, available: usize },

    #[error("sequence length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("unsupported multisample order {0}, must be 1 to 5")]
    UnsupportedOrder(usize),

    #[error("sample time is not strictly increasing")]
    NonMonotonicTime,

    #[error("invalid calendar time")]
    InvalidTime,
}

pub type Result<T> = std::result::Result<T, InsError>;
