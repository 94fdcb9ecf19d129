pub mod error;
pub mod fetcher;
pub mod google_auth;
pub mod moderation;
pub mod normalizer;
pub mod vision;
