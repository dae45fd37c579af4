// weather://{city}: canned readings for a few cities, synthetic ones otherwise

use async_trait::async_trait;
use std::sync::Arc;
use waypost_core::{Arguments, Capability, CapabilityError, CapabilityHandler, RegistryError};

const KNOWN_CITIES: &[(&str, &str)] = &[
    ("New York", "72°F, Partly Cloudy"),
    ("London", "18°C, Rainy"),
    ("Tokyo", "25°C, Sunny"),
    ("Sydney", "22°C, Clear"),
];

const CONDITIONS: &[&str] = &["Sunny", "Cloudy", "Rainy", "Windy", "Snowy", "Clear"];

/// Synthetic temperatures are drawn from this inclusive range (°C)
pub const MIN_TEMPERATURE: u8 = 10;
pub const MAX_TEMPERATURE: u8 = 35;

pub struct WeatherResource;

impl WeatherResource {
    pub fn capability() -> Result<Capability, RegistryError> {
        Capability::resource(
            "weather://{city}",
            "get_weather",
            "Get current weather for a city.",
            Arc::new(WeatherResource),
        )
    }
}

#[async_trait]
impl CapabilityHandler for WeatherResource {
    async fn invoke(&self, arguments: Arguments) -> Result<String, CapabilityError> {
        let city = arguments
            .get("city")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CapabilityError::validation("city", "missing required argument"))?;

        if let Some((_, reading)) = KNOWN_CITIES.iter().find(|(name, _)| *name == city) {
            return Ok(format!("Current weather in {}: {}", city, reading));
        }

        let unavailable = |e: getrandom::Error| CapabilityError::handler(format!("random source unavailable: {}", e));
        let span = u32::from(MAX_TEMPERATURE - MIN_TEMPERATURE) + 1;
        let temperature = u32::from(MIN_TEMPERATURE) + random_below(span).map_err(unavailable)?;
        let condition = CONDITIONS[random_below(CONDITIONS.len() as u32).map_err(unavailable)? as usize];

        Ok(format!("Current weather in {}: {}°C, {}", city, temperature, condition))
    }
}

/// Uniform draw from `0..bound`; values past the last whole multiple of
/// `bound` are redrawn
fn random_below(bound: u32) -> Result<u32, getrandom::Error> {
    let limit = acceptance_limit(bound);
    loop {
        let mut bytes = [0u8; 4];
        getrandom::fill(&mut bytes)?;
        let value = u32::from_ne_bytes(bytes);
        if value < limit {
            return Ok(value % bound);
        }
    }
}

fn acceptance_limit(bound: u32) -> u32 {
    u32::MAX - u32::MAX % bound
}
