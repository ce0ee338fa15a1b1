use thiserror::Error;

/// The error type for `vegann-burn` operations.
#[derive(Error, Debug)]
pub enum VegAnnError {
    /// An architecture identifier was given for which no decoder is built in.
    #[error("Unsupported architecture: {arch}")]
    UnsupportedArch {
        /// The name of the unsupported architecture.
        arch: String,
    },

    /// A model configuration whose parameters are logically inconsistent.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// Image and label map passed to the visualization helper disagree in size.
    #[error(
        "dimension mismatch between image and labels: image={image_width}x{image_height}, labels={label_width}x{label_height}"
    )]
    DimensionMismatch {
        image_width: u32,
        image_height: u32,
        label_width: u32,
        label_height: u32,
    },
}

/// A specialized `Result` type for `vegann-burn` operations.
pub type VegAnnResult<T> = Result<T, VegAnnError>;
