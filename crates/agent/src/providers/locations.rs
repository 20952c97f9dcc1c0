//! Offline place-name lookup backed by the extractor's city table.

use async_trait::async_trait;
use flightdesk_core::domain::slots::LocationCode;
use flightdesk_core::search::{LocationResolver, SearchError};

use crate::conversation::city_code;

#[derive(Clone, Copy, Debug, Default)]
pub struct CityTableResolver;

#[async_trait]
impl LocationResolver for CityTableResolver {
    fn name(&self) -> &'static str {
        "city_table"
    }

    async fn resolve(&self, place: &str) -> Result<Option<LocationCode>, SearchError> {
        let name = place.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_lowercase();
        Ok(city_code(&name).and_then(|code| LocationCode::parse(code).ok()))
    }
}
