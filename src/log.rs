//! Logging interface, contingent on the `defmt-03` or `log` features
//!
//! Only enable a backend when debugging, and when you're certain that your
//! logger isn't using the same USB device!

macro_rules! debug {
    ($($args:tt)*) => {{
        #[cfg(feature = "defmt-03")]
        ::defmt_03::debug!($($args)*);
        #[cfg(feature = "log")]
        ::log::debug!($($args)*);
        #[cfg(not(any(feature = "defmt-03", feature = "log")))]
        let _ = ::core::format_args!($($args)*);
    }};
}

macro_rules! warn {
    ($($args:tt)*) => {{
        #[cfg(feature = "defmt-03")]
        ::defmt_03::warn!($($args)*);
        #[cfg(feature = "log")]
        ::log::warn!($($args)*);
        #[cfg(not(any(feature = "defmt-03", feature = "log")))]
        let _ = ::core::format_args!($($args)*);
    }};
}

macro_rules! trace {
    ($($args:tt)*) => {{
        #[cfg(feature = "defmt-03")]
        ::defmt_03::trace!($($args)*);
        #[cfg(feature = "log")]
        ::log::trace!($($args)*);
        #[cfg(not(any(feature = "defmt-03", feature = "log")))]
        let _ = ::core::format_args!($($args)*);
    }};
}
