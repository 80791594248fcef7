//! Synthetic market feed for paper trading
//!
//! Produces a batch of raw observations per scan for one venue. Model
//! probabilities are the market price plus noise, so some observations carry
//! an edge and most do not.

use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::{RawObservation, Side, Venue};
use crate::ports::{MarketDataError, MarketDataPort};

#[derive(Debug)]
pub struct SyntheticMarket {
    venue: Venue,
    name: String,
    per_scan: usize,
    rng: Mutex<StdRng>,
    scan_seq: Mutex<u64>,
}

impl SyntheticMarket {
    pub fn new(venue: Venue, per_scan: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            venue,
            name: format!("synthetic-{}", venue),
            per_scan,
            rng: Mutex::new(rng),
            scan_seq: Mutex::new(0),
        }
    }

    fn prediction_market(rng: &mut StdRng, id: String) -> RawObservation {
        let yes_price: f64 = rng.gen_range(0.05..0.95);
        let model = (yes_price + rng.gen_range(-0.10..0.12)).clamp(0.02, 0.98);
        let side = if model >= yes_price { Side::Long } else { Side::Short };
        let spread = rng.gen_range(0.0..0.02);

        let mut obs = RawObservation::prediction_market(&id, yes_price, rng.gen_range(500.0..50_000.0))
            .with_side(side)
            .with_model_probability(model)
            .with_trend(rng.gen_range(-0.35..0.35))
            .with_time_sensitivity(rng.gen_range(0.0..1.0));
        // Some markets only publish a book
        if rng.gen_bool(0.3) {
            obs.price = None;
            obs = obs.with_order_book(
                (yes_price - spread / 2.0).max(0.01),
                (yes_price + spread / 2.0).min(0.99),
            );
        }
        obs
    }

    fn dex_token(rng: &mut StdRng, id: String) -> RawObservation {
        let price = 10f64.powf(rng.gen_range(-4.0..1.0));
        let fair = price * (1.0 + rng.gen_range(-0.20..0.60));
        let side = if fair >= price { Side::Long } else { Side::Short };

        RawObservation::dex_token(&id, price, fair, rng.gen_range(1_000.0..500_000.0))
            .with_side(side)
            .with_model_probability(rng.gen_range(0.30..0.70))
            .with_trend(rng.gen_range(-0.40..0.40))
            .with_time_sensitivity(rng.gen_range(0.0..0.5))
    }
}

#[async_trait]
impl MarketDataPort for SyntheticMarket {
    fn venue(&self) -> Venue {
        self.venue
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(&self) -> Result<Vec<RawObservation>, MarketDataError> {
        let scan = {
            let mut seq = self
                .scan_seq
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *seq += 1;
            *seq
        };
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let observations = (0..self.per_scan)
            .map(|i| {
                let id = match self.venue {
                    Venue::PredictionMarket => format!("pm-{}-{}", scan, i),
                    Venue::DexToken => format!("dex-{}-{}", scan, i),
                };
                match self.venue {
                    Venue::PredictionMarket => Self::prediction_market(&mut rng, id),
                    Venue::DexToken => Self::dex_token(&mut rng, id),
                }
            })
            .collect();

        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::normalize;

    #[tokio::test]
    async fn test_scan_produces_batch() {
        let market = SyntheticMarket::new(Venue::PredictionMarket, 12, Some(5));
        let batch = market.scan().await.unwrap();
        assert_eq!(batch.len(), 12);
        assert!(batch.iter().all(|o| o.venue == Venue::PredictionMarket));
        assert!(batch[0].asset_id.starts_with("pm-1-"));

        let next = market.scan().await.unwrap();
        assert!(next[0].asset_id.starts_with("pm-2-"));
    }

    #[tokio::test]
    async fn test_seeded_scans_repeat() {
        let a = SyntheticMarket::new(Venue::DexToken, 5, Some(11));
        let b = SyntheticMarket::new(Venue::DexToken, 5, Some(11));
        let (x, y) = (a.scan().await.unwrap(), b.scan().await.unwrap());
        let prices = |v: &[RawObservation]| v.iter().map(|o| o.price).collect::<Vec<_>>();
        assert_eq!(prices(&x), prices(&y));
    }

    #[tokio::test]
    async fn test_observations_normalize() {
        for venue in [Venue::PredictionMarket, Venue::DexToken] {
            let market = SyntheticMarket::new(venue, 50, Some(21));
            let batch = market.scan().await.unwrap();
            let ok = batch.iter().filter(|o| normalize(o).is_ok()).count();
            assert!(ok > 25, "{} of 50 {} observations normalized", ok, venue);
        }
    }
}
