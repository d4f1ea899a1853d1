//! Counter contract client: picks a live node or the in-process simulation
//! and exposes `get`/`increment`/`decrement` through one façade.

mod client;
mod config;
mod simulation;

pub use client::{ClientState, ContractClient, TxOutcome};
pub use config::{
    ClientConfig, DEFAULT_APP_NAME, DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_CALL_TIMEOUT, DEFAULT_ENDPOINTS,
    DEFAULT_INIT_TIMEOUT, DEFAULT_SETTLE_DELAY,
};
pub use simulation::{SimulatedState, SimulationFallback};
