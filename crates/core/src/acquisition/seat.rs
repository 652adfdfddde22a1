//! Seat selection policy.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::site::SiteAdapter;

use super::{AcquisitionError, SeatSelection};

/// Pick a seat: preferred tags in order, then one generic attempt.
///
/// The first tag that clicks wins. Each attempt is bounded by
/// `call_timeout`, and an attempt that errors or times out counts as
/// "not clickable". `cancel` is checked before every attempt.
pub async fn select_seat(
    adapter: &dyn SiteAdapter,
    preferred: &[String],
    call_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<SeatSelection, AcquisitionError> {
    for tag in preferred {
        if cancel.is_cancelled() {
            return Err(AcquisitionError::Cancelled);
        }
        match tokio::time::timeout(call_timeout, adapter.select_seat(tag)).await {
            Ok(Ok(true)) => {
                info!("Selected preferred seat type {}", tag);
                return Ok(SeatSelection::preferred(tag.clone()));
            }
            Ok(Ok(false)) => debug!("Seat type {} not clickable", tag),
            Ok(Err(e)) => debug!("Seat type {} failed: {}", tag, e),
            Err(_) => debug!("Seat type {} timed out after {:?}", tag, call_timeout),
        }
    }

    if cancel.is_cancelled() {
        return Err(AcquisitionError::Cancelled);
    }
    match tokio::time::timeout(call_timeout, adapter.select_any_seat()).await {
        Ok(Ok(true)) => {
            info!("No preferred seat available, took any available seat");
            Ok(SeatSelection::fallback())
        }
        Ok(Ok(false)) => Err(no_seat(preferred)),
        Ok(Err(e)) => {
            debug!("Generic seat selection failed: {}", e);
            Err(no_seat(preferred))
        }
        Err(_) => Err(no_seat(preferred)),
    }
}

fn no_seat(preferred: &[String]) -> AcquisitionError {
    AcquisitionError::NoSeatSelectable {
        tried: preferred.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSiteAdapter;

    const TIMEOUT: Duration = Duration::from_millis(200);

    fn tags(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn test_first_preferred_wins() {
        let adapter = MockSiteAdapter::new();
        adapter.set_clickable_tags(&["VIP", "A"]).await;

        let selection = select_seat(&adapter, &tags(&["VIP", "A"]), TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(selection, SeatSelection::preferred("VIP"));
        assert_eq!(adapter.seat_attempts().await, vec!["VIP"]);
    }

    #[tokio::test]
    async fn test_falls_through_to_second_preference() {
        let adapter = MockSiteAdapter::new();
        adapter.set_clickable_tags(&["A"]).await;

        let selection = select_seat(&adapter, &tags(&["VIP", "A"]), TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(selection.tag, "A");
        assert!(selection.was_preferred);
        assert_eq!(adapter.seat_attempts().await, vec!["VIP", "A"]);
    }

    #[tokio::test]
    async fn test_generic_fallback_is_not_preferred() {
        let adapter = MockSiteAdapter::new();
        adapter.set_any_seat_available(true).await;

        let selection = select_seat(&adapter, &tags(&["VIP", "A"]), TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(selection, SeatSelection::fallback());
        assert_eq!(adapter.any_seat_attempts().await, 1);
    }

    #[tokio::test]
    async fn test_no_seat_selectable() {
        let adapter = MockSiteAdapter::new();

        let err = select_seat(&adapter, &tags(&["VIP"]), TIMEOUT, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AcquisitionError::NoSeatSelectable { ref tried } if tried == &["VIP"]));
    }

    #[tokio::test]
    async fn test_erroring_tag_is_skipped() {
        let adapter = MockSiteAdapter::new();
        adapter.set_failing_tags(&["VIP"]).await;
        adapter.set_clickable_tags(&["A"]).await;

        let selection = select_seat(&adapter, &tags(&["VIP", "A"]), TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(selection.tag, "A");
    }

    #[tokio::test]
    async fn test_empty_preferences_go_straight_to_generic() {
        let adapter = MockSiteAdapter::new();
        adapter.set_any_seat_available(true).await;

        let selection = select_seat(&adapter, &[], TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!selection.was_preferred);
        assert!(adapter.seat_attempts().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_any_click() {
        let adapter = MockSiteAdapter::new();
        adapter.set_clickable_tags(&["VIP"]).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = select_seat(&adapter, &tags(&["VIP"]), TIMEOUT, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::Cancelled));
        assert!(adapter.seat_attempts().await.is_empty());
    }
}
