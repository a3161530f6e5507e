pub mod controller;
pub mod list;
pub mod model;
pub mod watch;

pub use controller::SessionController;
pub use list::{SessionList, SessionRow};
pub use model::{
    Acknowledgement, ConnectionDetails, ExhaustedUser, HistoryFilter, Page, Session, SessionStatus,
    TerminationReason,
};
pub use watch::{ListEvent, ListWatch, Observation, SessionTracker, SessionWatch, Watch, WatchEvent};
