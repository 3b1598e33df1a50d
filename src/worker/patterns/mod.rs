//! Higher-level job patterns built on top of [`crate::worker::client::WorkerClient`]
//! and [`crate::worker::server::WorkerServer`] (§4.9).

pub mod cron;
pub mod fanout;
pub mod fire_and_forget;

pub use cron::{run_cron, CronJob};
pub use fanout::{fanout, FanoutDispatcher, FanoutEvent, FanoutRegisterError, FanoutRegistry};
pub use fire_and_forget::fire_and_forget;
