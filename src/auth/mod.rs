pub mod authentication;
pub mod capabilities;
pub mod gate;
pub mod identity;
pub mod permissions;
pub mod user;

pub use authentication::*;
pub use capabilities::*;
pub use gate::*;
pub use identity::*;
pub use permissions::*;
pub use user::*;
