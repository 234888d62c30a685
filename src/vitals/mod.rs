pub mod relay;

pub use relay::VitalsRelay;
