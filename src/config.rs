//! Types for per-[`Queue`](crate::Queue) configuration of the runtime
//! parameters used by the reclamation scheme.
//!
//! The hazard table's slot capacity is not exposed here: it is a compile-time
//! constant ([`HAZARD_CAPACITY`](crate::HAZARD_CAPACITY)) shared by every
//! queue in the process, since the table itself is a single global resource.
//! The scan threshold, by contrast, is local to each participant and is
//! therefore safe to vary per queue.

include!(concat!(env!("OUT_DIR"), "/build_constants.rs"));

////////////////////////////////////////////////////////////////////////////////////////////////////
// Config
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Runtime configuration parameters for a [`Queue`](crate::Queue).
#[derive(Copy, Clone, Debug)]
pub struct Config {
    scan_threshold: u32,
}

/********** impl Default **************************************************************************/

impl Default for Config {
    #[inline]
    fn default() -> Self {
        ConfigBuilder::new().build()
    }
}

/********** impl inherent *************************************************************************/

impl Config {
    /// Creates a new [`Config`] with the given `scan_threshold`.
    ///
    /// # Panics
    ///
    /// This function panics if `scan_threshold` is 0.
    #[inline]
    pub fn with_scan_threshold(scan_threshold: u32) -> Self {
        assert!(scan_threshold > 0, "scan threshold must be greater than 0");
        Self { scan_threshold }
    }

    /// Returns the number of retirements a participant accumulates before
    /// attempting to reclaim unprotected records.
    #[inline]
    pub fn scan_threshold(&self) -> u32 {
        self.scan_threshold
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ConfigBuilder
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A builder type for gradually initializing a [`Config`].
///
/// This is mainly useful for keeping stability, in case the internal
/// structure of [`Config`] changes in the future, e.g. because further
/// parameters are added.
#[derive(Copy, Clone, Debug, Default)]
pub struct ConfigBuilder {
    scan_threshold: Option<u32>,
}

impl ConfigBuilder {
    /// Creates a new [`ConfigBuilder`] with default values.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scan threshold.
    #[inline]
    pub fn scan_threshold(mut self, scan_threshold: u32) -> Self {
        self.scan_threshold = Some(scan_threshold);
        self
    }

    /// Consumes the [`ConfigBuilder`] and returns an initialized [`Config`].
    ///
    /// Unspecified parameters are initialized with their default values.
    #[inline]
    pub fn build(self) -> Config {
        Config::with_scan_threshold(self.scan_threshold.unwrap_or(DEFAULT_SCAN_THRESHOLD))
    }
}
