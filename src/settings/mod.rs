//! User-facing profiling settings.
//!
//! - [`store`]: the `[AIE_profile_settings]` key/value store and its loaders
//! - [`parser`]: the `;`/`:` mini-language used inside metric settings values

pub mod parser;
pub mod store;

pub use parser::{parse_settings, SettingFields};
pub use store::{ProfileSettings, StartType};
