//! Browser process and tab lifecycle.
//!
//! - [`launcher`] - starts a local headless browser and guarantees it is killed
//! - [`tabs`] - opens a tab on any endpoint and binds a protocol session to it
//!
//! Both sides are traits so the generator can be driven against a scripted
//! browser in tests.

mod launcher;
mod tabs;

pub use launcher::{BrowserProcess, ChromeLauncher, LaunchedChrome, Launcher, CHROME_PATH_ENV};
pub use tabs::{DevToolsConnector, Tab, TabConnector};
