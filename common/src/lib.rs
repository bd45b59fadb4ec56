pub mod file_format;
pub mod log_setup;
pub mod parallel;
pub mod serde;
pub mod shared;
pub mod shared_fn;
pub mod test_utils;

pub use file_format::FileFormat;
pub use shared::Shared;
pub use shared_fn::SharedFn;
