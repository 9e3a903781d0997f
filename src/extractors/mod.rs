pub mod caller;
pub mod payload;

pub use caller::Caller;
pub use payload::{JsonBody, PathParams, QueryParams};
