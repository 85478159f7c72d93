//! Application layer: request validation, entity lifecycle and error
//! translation in front of the service store and the weather cache.

pub mod dto;
pub mod service_app;
pub mod validator;
pub mod weather_app;

pub use dto::{CreateServiceRequest, CurrentWeatherRequest, ForecastRequest, UpdateServiceRequest};
pub use service_app::ServiceApp;
pub use weather_app::WeatherApp;
