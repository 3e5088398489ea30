use thiserror::Error;

macro_rules! config_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Configuration($msg.to_string())
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Configuration(format!($fmt, $($arg)*))
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants follow the failure taxonomy of the host: some errors are fatal to a launch
/// attempt and surface to the caller, others are contained to their own unit of work and only
/// ever show up in the log.
///
/// # Error Categories
///
/// ## Launch-fatal Errors
/// - [`Error::Configuration`] - Runtime root missing, invalid preload order, bad config file
/// - [`Error::NotFound`] - One or more requested patch ids are not in the catalog
/// - [`Error::LaunchInProgress`] - Another launch already owns the process environment
/// - [`Error::Native`] - The native host layer failed (missing symbol, failed preload)
///
/// ## Contained Errors
/// - [`Error::InterceptionResolution`] - A single interception target could not be resolved;
///   logged and skipped, sibling interceptions still apply
/// - [`Error::ExtractionStep`] - A staging step failed; aborts the remaining pipeline
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::GoblinErr`] - ELF/PE parsing errors from the goblin crate
/// - [`Error::TomlErr`] - Configuration parsing errors
/// - [`Error::LibraryErr`] - Dynamic loader errors from libloading
///
/// A non-zero exit code of the foreign runtime is *not* an error. It is reported through
/// [`crate::host::LaunchOutcome`] together with a best-effort last-error message.
///
/// # Examples
///
/// ```rust,no_run
/// use dotlaunch::{Error, catalog::PatchCatalog};
///
/// let catalog = PatchCatalog::new();
/// catalog.register_builtin();
///
/// match catalog.lookup(&["symlink-noop", "missing"]) {
///     Ok(descriptors) => println!("resolved {} patches", descriptors.len()),
///     Err(Error::NotFound(ids)) => eprintln!("unknown patches: {}", ids.join(", ")),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The host configuration is unusable.
    ///
    /// Raised when the runtime root cannot be resolved, when the native preload order
    /// violates a library dependency, or when the configuration file is invalid. Fatal to
    /// the launch attempt, never retried.
    #[error("Configuration error - {0}")]
    Configuration(String),

    /// One or more requested patch ids are not registered.
    ///
    /// Patch resolution is all-or-nothing: the error lists every id that could not be
    /// resolved and no interception of the request is installed.
    #[error("Patch not found - {}", .0.join(", "))]
    NotFound(Vec<String>),

    /// A single interception target could not be located in its module.
    ///
    /// The engine logs this error and skips the interception. It never aborts the
    /// descriptor or the launch.
    ///
    /// # Fields
    ///
    /// * `target` - The `Type::Method(shape)` that was requested
    /// * `reason` - Why resolution failed
    #[error("Could not resolve interception target {target}: {reason}")]
    InterceptionResolution {
        /// The requested interception target
        target: String,
        /// Why resolution failed
        reason: String,
    },

    /// An extraction step reported failure.
    ///
    /// # Fields
    ///
    /// * `index` - Zero-based position of the step in its pipeline
    /// * `step` - The step's name
    /// * `message` - The underlying failure
    #[error("Extraction step {index} ('{step}') failed: {message}")]
    ExtractionStep {
        /// Zero-based position of the failing step
        index: usize,
        /// Name of the failing step
        step: String,
        /// Description of the underlying failure
        message: String,
    },

    /// A launch is already in flight in this process.
    ///
    /// The process environment is shared mutable state, so only one launch may own it.
    #[error("Another launch is already in progress")]
    LaunchInProgress,

    /// The native host layer failed.
    #[error("Native host error - {0}")]
    Native(String),

    /// Invoking a managed method through the runtime model failed.
    #[error("Invocation failed - {0}")]
    Invocation(String),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin crate while inspecting ELF or PE images.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// Error while parsing a TOML configuration.
    #[error("{0}")]
    TomlErr(#[from] toml::de::Error),

    /// Error from the dynamic loader.
    #[error("{0}")]
    LibraryErr(#[from] libloading::Error),

    /// Failed to lock target.
    #[error("Failed to lock target")]
    LockError,

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
