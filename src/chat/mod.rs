pub mod controller;
pub mod message;
pub mod mode;
pub mod state;
pub mod strategy;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{
    ChatController, ChatSettings, HistoryOutcome, SubmitOutcome, WebSearchOutcome,
    WebSearchRejection,
};
pub use mode::QueryMode;
pub use state::SubmitRejection;
