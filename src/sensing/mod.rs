pub mod controller;
pub mod event;
pub mod loop_worker;
pub mod replay;

pub use controller::SensingController;
pub use event::SensorEvent;
pub use loop_worker::SensingStats;
pub use replay::replay_trace;
