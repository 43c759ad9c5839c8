pub mod admin;
pub mod auth;
pub mod collaborate;
pub mod files;
pub mod projects;
pub mod tasks;
pub mod users;
