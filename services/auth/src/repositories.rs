//! Data access for the auth service

pub mod user;

pub use user::UserRepository;
