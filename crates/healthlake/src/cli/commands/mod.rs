pub mod pipeline;
pub mod records;
pub mod window;

pub use pipeline::{stage, status, transform};
pub use records::personal_records;
pub use window::cutoff;
