pub mod battle;
pub mod bet;
pub mod user;

pub use battle::*;
pub use bet::*;
pub use user::*;
