pub mod dialog;
pub mod event;
pub mod progress;
