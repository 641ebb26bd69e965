// Configuration loading

pub mod settings;

pub use settings::{
    parse_flag, parse_list, ConfigError, ConnectionProfile, CostCenterSection, FileSettings,
    LookupSettings, MovementSettings, SellerSection, Settings, SourceMode, SourceSettings, SqlSettings,
    ValidationSettings, WorkbookSettings,
};
