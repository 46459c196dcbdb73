//! A set of built-in tools that models can use.

mod add_numbers;
mod weather;

pub use add_numbers::AddNumbersTool;
pub use weather::GetCurrentWeatherTool;
