mod address;
mod hash;
mod identity;

pub use address::*;
pub use hash::*;
pub use identity::*;
