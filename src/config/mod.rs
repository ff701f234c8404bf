pub mod gateway;

pub use gateway::{DiscordConfig, GatewayConfig, PanelConfig};
