//! the same macros whether the crate is built with `log` or with `defmt`
#[cfg(feature = "log")]
pub use log::{debug, error, info, trace, warn};

#[cfg(not(feature = "log"))]
pub use defmt::{debug, error, info, trace, warn};
