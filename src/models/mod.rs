pub mod enums;
pub mod triage;
pub mod vital_sign;

pub use enums::*;
pub use triage::*;
pub use vital_sign::*;
