//! Bounded, channel-fed streams of listing results.

use tokio::sync::mpsc;

use crate::{Result, Segments};

/// Capacity of the hand-off queue between a listing producer and its
/// consumer.
pub const LISTING_CAPACITY: usize = 64;

/// A stream of relative segments produced by `iterdir` or `glob`.
///
/// Errors travel in-band and surface where consumption reaches them.
/// Dropping the listing closes the channel, which tells the producer to
/// stop.
pub struct Listing {
    rx: mpsc::Receiver<Result<Segments>>,
}

impl Listing {
    /// Create a producer/consumer pair with the given queue bound.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Result<Segments>>, Listing) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Listing { rx })
    }

    /// A listing over results that are already in memory.
    pub fn from_results(items: Vec<Result<Segments>>) -> Listing {
        let (tx, listing) = Self::channel(items.len());
        for item in items {
            // Capacity equals the item count, so this cannot fill up
            let _ = tx.try_send(item);
        }
        listing
    }

    /// Stream a blocking iterator from a worker thread.
    ///
    /// `produce` runs on tokio's blocking pool and pushes each item through
    /// a queue bounded by [`LISTING_CAPACITY`], so a slow consumer holds the
    /// worker back instead of letting results pile up. A failure to start
    /// the iteration is delivered as the first item.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_blocking<F, I>(produce: F) -> Listing
    where
        F: FnOnce() -> Result<I> + Send + 'static,
        I: Iterator<Item = Result<Segments>>,
    {
        let (tx, listing) = Self::channel(LISTING_CAPACITY);
        tokio::task::spawn_blocking(move || {
            let iter = match produce() {
                Ok(iter) => iter,
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    return;
                }
            };
            for item in iter {
                if tx.blocking_send(item).is_err() {
                    tracing::debug!("listing consumer went away; stopping producer");
                    break;
                }
            }
        });
        listing
    }

    /// Next item, or `None` once the producer is done.
    pub async fn next(&mut self) -> Option<Result<Segments>> {
        self.rx.recv().await
    }

    /// Drain everything that is left, failing on the first error.
    pub async fn collect(mut self) -> Result<Vec<Segments>> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await {
            out.push(item?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{segments, Error};

    #[tokio::test]
    async fn from_results_yields_in_order() {
        let listing = Listing::from_results(vec![Ok(segments!("a")), Ok(segments!("b"))]);
        let items = listing.collect().await.unwrap();
        assert_eq!(items, vec![segments!("a"), segments!("b")]);
    }

    #[tokio::test]
    async fn empty_listing() {
        let listing = Listing::from_results(Vec::new());
        assert!(listing.collect().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blocking_errors_surface_in_band() {
        let mut listing = Listing::from_blocking(|| {
            Ok(vec![
                Ok(segments!("one")),
                Err(Error::not_found("two")),
                Ok(segments!("three")),
            ]
            .into_iter())
        });
        assert_eq!(listing.next().await.unwrap().unwrap(), segments!("one"));
        assert!(listing.next().await.unwrap().unwrap_err().is_not_found());
        assert_eq!(listing.next().await.unwrap().unwrap(), segments!("three"));
        assert!(listing.next().await.is_none());
    }

    #[tokio::test]
    async fn start_failure_is_first_item() {
        let listing = Listing::from_blocking(|| -> Result<std::vec::IntoIter<Result<Segments>>> {
            Err(Error::not_found("missing"))
        });
        assert!(listing.collect().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn producer_is_bounded_and_stops_when_dropped() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let produced = Arc::new(AtomicUsize::new(0));
        let counter = produced.clone();
        let mut listing = Listing::from_blocking(move || {
            Ok((0..10_000).map(move |i| {
                counter.fetch_add(1, Ordering::SeqCst);
                Segments::parse_str(&format!("f{}", i))
            }))
        });

        assert!(listing.next().await.unwrap().is_ok());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        // One taken, at most a full queue plus the item blocked in send
        assert!(produced.load(Ordering::SeqCst) <= LISTING_CAPACITY + 2);

        drop(listing);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(produced.load(Ordering::SeqCst) < 10_000);
    }
}
