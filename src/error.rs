#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Ambisonic order {0} is not supported, expected 1..=7")]
    UnsupportedOrder(usize),
    #[error("Sample rate is invalid: {0}")]
    InvalidSampleRate(f32),
    #[error("Partition length is invalid: {0}")]
    InvalidPartitionLen(usize),
    #[error("Filter {0} is missing from the filter store")]
    MissingFilter(filters::FilterKey),
    #[error("Filter {0} is not a valid wave payload")]
    InvalidFilter(filters::FilterKey, #[source] hound::Error),
    #[error("Filter {key} has {found} channels, expected {expected}")]
    FilterChannelMismatch {
        key: filters::FilterKey,
        expected: usize,
        found: usize,
    },
    #[error("Filter {key} is sampled at {found} Hz, expected {expected} Hz")]
    SampleRateMismatch {
        key: filters::FilterKey,
        expected: u32,
        found: u32,
    },
    #[error("Filter {0} is empty")]
    EmptyFilter(filters::FilterKey),
    #[error("Left and right filters differ in length: {0} vs {1}")]
    FilterLengthMismatch(usize, usize),
    #[error("Frame length ({0}) should be multiple of partition len ({1})")]
    InvalidFrameLen(usize, usize),
    #[error("The owls are not what they seem")]
    InternalProcessingError(#[from] realfft::FftError),
}
