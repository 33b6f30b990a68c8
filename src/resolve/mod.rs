pub mod cascade;
pub mod disambiguate;
pub mod stats;

pub use cascade::{Providers, Resolution, Resolver, WorkerState};
pub use disambiguate::{choose_candidate, disambiguate, WindowState};
pub use stats::{Outcome, ResolveStats, Strategy, StrategyTimings, Timing};
