pub mod config;
pub mod device;
pub mod job;
pub mod plan;
pub mod user_settings;

pub use config::AppConfig;
pub use device::{DeviceEndpoint, RegisterDeviceRequest};
pub use job::Job;
pub use plan::{NewPlan, Plan, PlanUpdate};
pub use user_settings::{SetTimezoneRequest, SubscriptionLevel, UserSettings};
