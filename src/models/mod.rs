//! Content models split into one module per collection.
//!
//! Every collection has a typed record implementing [`Record`]; the remote
//! system fields live on [`Document`].

pub mod about;
pub mod common;
pub mod experience;
pub mod hero;
pub mod message;
pub mod project;
pub mod service;
pub mod skill;
pub mod social_link;
pub mod user;

pub use about::*;
pub use common::*;
pub use experience::*;
pub use hero::*;
pub use message::*;
pub use project::*;
pub use service::*;
pub use skill::*;
pub use social_link::*;
pub use user::*;
