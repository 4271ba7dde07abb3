//! Pet companion browser extension, minus the browser.
//!
//! Three cooperating processes share one store and one message bus:
//! - [`background::Background`] fetches pet data and broadcasts the outcome
//! - [`popup::PopupController`] edits the selection, playlist and visibility
//! - [`content::ContentScript`] draws the companion and cycles its orbit assets
//!
//! The browser itself is reduced to [`services::storage::SharedStore`],
//! [`bus`] channels and the [`orbit::Surface`] drawing target.

pub mod background;
pub mod bus;
pub mod config;
pub mod content;
pub mod defaults;
pub mod error;
pub mod orbit;
pub mod popup;
pub mod protocol;
pub mod services;
pub mod types;

pub use error::{CompanionError, FetchError, Result};
