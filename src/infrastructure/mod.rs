pub mod google_auth;
pub mod stores;
