// Library root: the terminal front end, exposed so integration tests can
// drive the view state and render into a test backend.

pub mod tui;
