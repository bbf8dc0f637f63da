//! Outbound ports - Interfaces that the application requires from collaborators

mod event_handler_port;

pub use event_handler_port::EventHandler;
