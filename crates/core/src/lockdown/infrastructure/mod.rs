pub mod event_bus;
pub mod headless_display;
