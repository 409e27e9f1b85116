pub mod endpoint;
pub mod report;

pub use endpoint::*;
pub use report::*;
