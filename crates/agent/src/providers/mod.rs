//! Concrete search and booking collaborators.

pub mod amadeus;
pub mod booking;
pub mod locations;
pub mod simulated;

use std::sync::Arc;

use anyhow::{Context, Result};
use flightdesk_core::booking::BookingProvider;
use flightdesk_core::config::{AppConfig, BookingProviderKind, SearchProviderKind};
use flightdesk_core::search::{FlightSearchProvider, LocationResolver};

pub use amadeus::AmadeusFlightSearch;
pub use booking::SimulatedBooking;
pub use locations::CityTableResolver;
pub use simulated::SimulatedFlightSearch;

/// Flight search plus the place-name lookup that goes with it. Amadeus serves both
/// from one client so they share an access token.
pub struct SearchStack {
    pub search: Arc<dyn FlightSearchProvider>,
    pub locations: Arc<dyn LocationResolver>,
}

pub fn search_stack_from_config(config: &AppConfig) -> Result<SearchStack> {
    match config.search.provider {
        SearchProviderKind::Simulated => Ok(SearchStack {
            search: Arc::new(SimulatedFlightSearch::new(config.search.max_offers)),
            locations: Arc::new(CityTableResolver),
        }),
        SearchProviderKind::Amadeus => {
            let provider = Arc::new(
                AmadeusFlightSearch::from_config(&config.amadeus, &config.search)
                    .context("failed to configure amadeus flight search")?,
            );
            Ok(SearchStack { search: provider.clone(), locations: provider })
        }
    }
}

pub fn booking_provider_from_config(config: &AppConfig) -> Arc<dyn BookingProvider> {
    match config.booking.provider {
        BookingProviderKind::Simulated => {
            Arc::new(SimulatedBooking::new(config.booking.link_base_url.clone()))
        }
    }
}
