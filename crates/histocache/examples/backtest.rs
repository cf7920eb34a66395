// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Backtest Example
//!
//! Replays a day of prices through a cache clipped to a simulated clock, so
//! the strategy can never peek past "now". Range loads and frontier moves are
//! printed by the tracing subscriber.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use histocache::{GapCache, HistoricalReader, Key, KeyBoundAdjuster, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const MINUTE_MS: i64 = 60_000;

/// A price feed with one quote every five minutes.
struct PriceFeed {
    quotes: Vec<(Key, f64)>,
}

impl PriceFeed {
    fn new() -> Self {
        let quotes = (0..288_i32)
            .map(|i| (Key::from_millis(i64::from(i) * 5 * MINUTE_MS), 100.0 + f64::from(i % 17) * 0.25))
            .collect();
        Self { quotes }
    }
}

impl HistoricalReader<(Key, f64)> for PriceFeed {
    fn extract_key(&self, _hint: Key, quote: &(Key, f64)) -> Key {
        quote.0
    }

    fn read_all_values_ascending_from(&self, key: Key) -> Result<Vec<(Key, f64)>> {
        // A real feed would page; two hours per call is enough to show continuation loads.
        Ok(self.quotes.iter().filter(|quote| quote.0 >= key).take(24).copied().collect())
    }

    fn read_latest_value_for(&self, key: Key) -> Result<Option<(Key, f64)>> {
        let before = self.quotes.iter().rev().find(|quote| quote.0 <= key);
        Ok(before.or_else(|| self.quotes.first()).copied())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry().with(tracing_subscriber::fmt::layer()).init();

    // The simulated clock the backtest advances.
    let now = Arc::new(AtomicI64::new(0));
    let clock = Arc::clone(&now);
    let adjuster = Arc::new(KeyBoundAdjuster::from_fn(move |_ctx| {
        Ok(Some(Key::from_millis(clock.load(Ordering::Relaxed))))
    }));

    let prices = GapCache::builder(PriceFeed::new())
        .name("prices")
        .initial_maximum_size(512)
        .memory()
        .adjuster(Arc::clone(&adjuster))
        .build();

    let mut position = 0.0_f64;
    for minute in (0..24 * 60).step_by(7) {
        now.store(i64::from(minute) * MINUTE_MS, Ordering::Relaxed);

        // Asking for the close of the day still only sees prices up to "now".
        let visible = prices.query().get_value(Key::from_millis(24 * 60 * MINUTE_MS))?;
        if let Some((_, price)) = visible {
            position += if price > 102.0 { -1.0 } else { 1.0 };
        }
    }

    // After the run, look ahead freely to evaluate the strategy.
    let next_hour: Vec<f64> = prices
        .query()
        .with_future()
        .get_next_values(Key::from_millis(12 * 60 * MINUTE_MS), 12)?
        .map(|quote| quote.map(|(_, price)| price))
        .collect::<Result<_>>()?;

    println!("final position: {position}");
    println!("noon to one: {next_hour:?}");
    println!("frontier: {:?}", adjuster.cached_highest_allowed_key());
    Ok(())
}
