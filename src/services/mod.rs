// ToxiGuard Core Services

pub mod capabilities;
pub mod config_store;
pub mod errors;
pub mod guard;
pub mod providers;

pub use capabilities::*;
pub use config_store::*;
pub use errors::*;
pub use providers::ProviderClient;

pub use guard::{
    decide,
    looks_like,
    plan_delivery,
    render_report,
    ConversationStore,
    KeywordFloor,
    ModerationSession,
    PolicyFloor,
    ZoneDecider,
};
