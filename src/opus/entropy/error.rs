use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeCodingError {
    #[error("Empty frame")]
    EmptyFrame,

    #[error("Frame size {size} exceeds the {available} bytes provided")]
    SizeMismatch { size: usize, available: usize },

    #[error("Frame of {0} bytes is too large")]
    FrameTooLarge(usize),

    #[error("Raw bit region ending at {end} with {count} bytes is outside the frame")]
    InvalidRawRegion { end: usize, count: usize },

    #[error("Consumed {consumed} bits of a {budget} bit frame")]
    BudgetExceeded { consumed: u32, budget: u32 },

    #[error("Range coded data and raw bits overlap")]
    CursorsCrossed,
}

pub type Result<T> = std::result::Result<T, RangeCodingError>;
