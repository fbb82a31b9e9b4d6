pub mod assignment;
pub mod broadcast;
pub mod event;
pub mod notification;
pub mod principal;
pub mod trip;
