//! Render Hardware Interface.
//!
//! This crate is the API-independent layer the deferred renderer is written
//! against. It handles:
//! - Completion counters and fences
//! - Buffers, textures and resource states
//! - Descriptor heaps and linear descriptor allocation
//! - Command list recording
//! - Pipeline state and shader constant layouts
//! - Swap chains
//!
//! The [`software`] module implements the interface on the CPU. It executes
//! submissions asynchronously on a worker thread, which makes it usable as a
//! reference device in tests and headless tools.

/// Declares a copyable, non-owning id type for a device object.
macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw id.
            #[inline]
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw id.
            #[inline]
            pub const fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod software;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{RhiError, RhiResult};
