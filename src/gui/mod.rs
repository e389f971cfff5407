//! Terminal screens shared by the binaries.

mod device_selector;
mod error;
mod run_until_keypress;

pub use device_selector::device_selector;
pub use error::GuiError;
pub use run_until_keypress::run_until_keypress;
