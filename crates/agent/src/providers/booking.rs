use async_trait::async_trait;
use flightdesk_core::booking::{BookingError, BookingProvider};
use flightdesk_core::domain::booking::BookingConfirmation;
use flightdesk_core::domain::search::OfferRef;
use flightdesk_core::domain::session::SessionId;
use rand::Rng;
use tracing::info;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;

/// Issues airline-style record locators without contacting anyone.
#[derive(Clone, Debug, Default)]
pub struct SimulatedBooking {
    link_base_url: Option<String>,
}

impl SimulatedBooking {
    pub fn new(link_base_url: Option<String>) -> Self {
        Self { link_base_url }
    }
}

fn confirmation_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
        .collect()
}

#[async_trait]
impl BookingProvider for SimulatedBooking {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn book(
        &self,
        offer_ref: &OfferRef,
        session_id: &SessionId,
    ) -> Result<BookingConfirmation, BookingError> {
        let code = confirmation_code();
        let external_link = self
            .link_base_url
            .as_deref()
            .map(|base| format!("{}/bookings/{code}", base.trim_end_matches('/')));

        info!(
            event_name = "booking.simulated",
            session_id = %session_id,
            offer_ref = %offer_ref,
            "simulated booking issued"
        );
        Ok(BookingConfirmation { confirmation_token: code, external_link })
    }
}

#[cfg(test)]
mod tests {
    use flightdesk_core::booking::BookingProvider;
    use flightdesk_core::domain::search::OfferRef;
    use flightdesk_core::domain::session::SessionId;

    use super::{SimulatedBooking, CODE_LEN};

    fn offer_ref() -> OfferRef {
        OfferRef { result_set: "abcdef01".to_string(), position: 2 }
    }

    #[tokio::test]
    async fn issues_six_character_code() {
        let confirmation = SimulatedBooking::default()
            .book(&offer_ref(), &SessionId::new("s1"))
            .await
            .expect("booked");

        assert_eq!(confirmation.confirmation_token.len(), CODE_LEN);
        assert!(confirmation.confirmation_token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(confirmation.external_link.is_none());
    }

    #[tokio::test]
    async fn builds_link_when_configured() {
        let confirmation = SimulatedBooking::new(Some("https://trips.example.com/".to_string()))
            .book(&offer_ref(), &SessionId::new("s1"))
            .await
            .expect("booked");

        let expected = format!("https://trips.example.com/bookings/{}", confirmation.confirmation_token);
        assert_eq!(confirmation.external_link, Some(expected));
    }
}
