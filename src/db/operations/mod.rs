pub mod artifacts;
pub mod billing;
pub mod chat;
pub mod classes;
pub mod content;
pub mod exercises;
pub mod homework;
pub mod profile;
pub mod proof;
pub mod topics;
pub mod user;
