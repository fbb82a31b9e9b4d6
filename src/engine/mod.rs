pub mod clock;
pub mod coordinator;
pub mod dispatcher;
pub mod expiry;
pub mod registry;
pub mod response;
pub mod tracking;
