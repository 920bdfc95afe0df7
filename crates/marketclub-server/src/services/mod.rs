pub mod authz;
pub mod community;
pub mod event;
pub mod post;
