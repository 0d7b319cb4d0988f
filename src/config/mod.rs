pub mod loader;

pub use loader::{
    AccountsSection, ChartSection, Config, ConfigError, EqualizerSection, LoggingSection,
    MonitorSection, TaxSection, TradingSection, load_config,
};
