//! Dispatcher behavior tests.

mod lifecycle;
