//! Page objects for the control-plane web app
//!
//! Each page describes its controls as [`LocatorSet`](crate::locator::LocatorSet)s
//! and drives them through a shared [`BasePage`].

pub mod base;
pub mod connections;
pub mod destination;
pub mod login;
pub mod source;

use std::sync::Arc;

pub use base::{BasePage, PageSettings};
pub use connections::ConnectionsPage;
pub use destination::DestinationPage;
pub use login::{LoginPage, LoginState};
pub use source::SourcePage;

use crate::driver::PageDriver;

/// Every page object for one scenario, sharing a single browser page
pub struct Pages {
    pub login: LoginPage,
    pub connections: ConnectionsPage,
    pub source: SourcePage,
    pub destination: DestinationPage,
}

impl Pages {
    pub fn new(driver: Arc<dyn PageDriver>, settings: PageSettings) -> Self {
        let base = BasePage::new(driver, settings);
        Self {
            login: LoginPage::new(base.clone()),
            connections: ConnectionsPage::new(base.clone()),
            source: SourcePage::new(base.clone()),
            destination: DestinationPage::new(base),
        }
    }
}
