pub mod activity;
pub mod dashboard;
pub mod health;
pub mod watch;
