pub mod client;
pub mod credentials;
pub mod provisioner;

pub use client::HttpPanelClient;
pub use credentials::RandomCredentials;
pub use provisioner::AccountProvisioner;
