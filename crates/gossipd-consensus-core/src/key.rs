use bincode::{Decode, Encode};
use gossipd_util_array_type::{array_type_fixed_size_define, array_type_fixed_size_impl_serde};
use serde::Deserialize;

/// A totally ordered identifier with an infallible successor operation.
///
/// Epochs are expected to advance for the lifetime of a running federation;
/// overflow is treated as unreachable rather than modeled as a recoverable
/// error.
pub trait Successor: Sized {
    fn next(&self) -> Self;
}

array_type_fixed_size_define! {
    /// Reference `Key` implementation: a monotonically advancing epoch
    /// counter. Embedders with their own epoch representation (e.g. a block
    /// height that must also track a chain id) implement [`Successor`] for
    /// their own type instead.
    #[derive(Encode, Decode, Clone, Copy, Hash)]
    pub struct EpochKey(u64);
}
array_type_fixed_size_impl_serde!(EpochKey);

impl Successor for EpochKey {
    fn next(&self) -> Self {
        self.next_expect()
    }
}
