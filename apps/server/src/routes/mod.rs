pub mod auth;
pub mod messages;
pub mod requests;
pub mod skills;
