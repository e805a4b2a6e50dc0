mod opener;
mod session;

pub use opener::*;
pub use session::*;
