pub mod community;
pub mod event;
pub mod post;

pub use community::*;
pub use event::*;
pub use post::*;
